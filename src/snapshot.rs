//! Tree listing and content projection of a working copy.
//!
//! Both projections come out of the same pruned walk, so a directory that the
//! [`IgnoreFilter`] excludes is absent from the listing *and* the content map.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::path::Component;
use std::path::Path;

use serde::Serialize;
use serde::Serializer;
use tracing::warn;
use walkdir::DirEntry;
use walkdir::WalkDir;

use crate::ignore::IgnoreFilter;

/// Default cap on the size of a single file whose contents are included.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 256 * 1024;

/// Indentation per directory level in the tree listing.
const INDENT: &str = "    ";

/// Snapshot of a working copy sent to the generator.
#[derive(Debug, Clone, Serialize)]
pub struct RepoSnapshot {
    pub tree_text: String,
    pub content: ContentMap,
}

pub type ContentMap = BTreeMap<String, ContentNode>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ContentNode {
    Directory(ContentMap),
    File(FileContent),
}

/// What the snapshot holds for a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Text(String),
    /// Withheld because of its extension.
    Binary,
    /// Withheld because it is larger than the configured limit.
    Oversized(u64),
    /// A symlink; never followed.
    Symlink,
    /// Reading failed; the message of the underlying error.
    Unreadable(String),
}

impl fmt::Display for FileContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Binary => f.write_str("<binary file omitted>"),
            Self::Oversized(len) => write!(f, "<file omitted: {len} bytes>"),
            Self::Symlink => f.write_str("<symlink omitted>"),
            Self::Unreadable(err) => write!(f, "<Error reading file: {err}>"),
        }
    }
}

impl Serialize for FileContent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(text) => serializer.serialize_str(text),
            other => serializer.collect_str(other),
        }
    }
}

impl RepoSnapshot {
    /// The content map as pretty JSON, the form the generator receives.
    pub fn content_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.content)
    }
}

/// Builds [`RepoSnapshot`]s for a working copy root.
pub struct RepoSnapshotBuilder<'a> {
    filter: &'a IgnoreFilter,
    max_file_bytes: u64,
}

impl<'a> RepoSnapshotBuilder<'a> {
    pub fn new(filter: &'a IgnoreFilter) -> Self {
        Self {
            filter,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }

    pub fn with_max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    pub fn build(&self, root: &Path) -> RepoSnapshot {
        RepoSnapshot {
            tree_text: self.build_tree_text(root),
            content: self.build_content_map(root),
        }
    }

    /// Depth-first indented listing; directories end with `/`.
    pub fn build_tree_text(&self, root: &Path) -> String {
        let root_name = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        let mut out = format!("{root_name}/\n");

        for entry in self.walk(root) {
            let name = entry.file_name().to_string_lossy();
            let indent = INDENT.repeat(entry.depth());
            let suffix = if entry.file_type().is_dir() { "/" } else { "" };
            let _ = writeln!(out, "{indent}{name}{suffix}");
        }
        out
    }

    /// Nested mapping from entry name to directory map or file content.
    pub fn build_content_map(&self, root: &Path) -> ContentMap {
        let mut map = ContentMap::new();
        for entry in self.walk(root) {
            let Ok(rel) = entry.path().strip_prefix(root) else {
                continue;
            };
            let node = if entry.file_type().is_dir() {
                ContentNode::Directory(ContentMap::new())
            } else {
                ContentNode::File(self.read_file(&entry))
            };
            insert_node(&mut map, rel, node);
        }
        map
    }

    fn walk(&self, root: &Path) -> impl Iterator<Item = DirEntry> {
        let filter = self.filter;
        WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !filter.should_exclude(&entry.file_name().to_string_lossy()))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!("Skipping unreadable entry: {err}");
                    None
                }
            })
    }

    fn read_file(&self, entry: &DirEntry) -> FileContent {
        if entry.path_is_symlink() {
            return FileContent::Symlink;
        }
        if self.filter.is_asset(&entry.file_name().to_string_lossy()) {
            return FileContent::Binary;
        }
        match entry.metadata() {
            Ok(meta) if meta.len() > self.max_file_bytes => {
                return FileContent::Oversized(meta.len());
            }
            Ok(_) => {}
            Err(err) => return FileContent::Unreadable(err.to_string()),
        }
        match std::fs::read_to_string(entry.path()) {
            Ok(text) => FileContent::Text(text),
            Err(err) => {
                warn!("Could not read {}: {err}", entry.path().display());
                FileContent::Unreadable(err.to_string())
            }
        }
    }
}

/// Insert `node` at `rel`, creating intermediate directory maps.
fn insert_node(map: &mut ContentMap, rel: &Path, node: ContentNode) {
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    let Some((last, parents)) = parts.split_last() else {
        return;
    };

    let mut current = map;
    for part in parents {
        let entry = current
            .entry(part.clone())
            .or_insert_with(|| ContentNode::Directory(ContentMap::new()));
        current = match entry {
            ContentNode::Directory(children) => children,
            ContentNode::File(_) => return,
        };
    }
    current.insert(last.clone(), node);
}
