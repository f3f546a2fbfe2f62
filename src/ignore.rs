use std::collections::BTreeSet;
use std::path::Component;
use std::path::Path;

/// Decides which entries of a working copy are left out of snapshots and
/// refused as edit targets.
///
/// Ignore entries are matched against a single path component: either the
/// exact name (`.git`, `package-lock.json`) or, for entries of the form
/// `*.ext`, the extension. Asset extensions are a separate list: such files
/// still show up in the tree listing but their contents are never sent to the
/// generator.
#[derive(Debug, Clone, Default)]
pub struct IgnoreFilter {
    names: BTreeSet<String>,
    extensions: BTreeSet<String>,
    asset_extensions: BTreeSet<String>,
}

impl IgnoreFilter {
    pub fn new<I, A>(ignore: I, asset_extensions: A) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        A: IntoIterator,
        A::Item: AsRef<str>,
    {
        let mut names = BTreeSet::new();
        let mut extensions = BTreeSet::new();
        for entry in ignore {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            match entry.strip_prefix("*.") {
                Some(ext) => extensions.insert(ext.to_ascii_lowercase()),
                None => names.insert(entry.to_string()),
            };
        }

        let asset_extensions = asset_extensions
            .into_iter()
            .map(|ext| normalize_extension(ext.as_ref()))
            .filter(|ext| !ext.is_empty())
            .collect();

        Self {
            names,
            extensions,
            asset_extensions,
        }
    }

    /// Whether an entry with this name (file or directory) is excluded.
    pub fn should_exclude(&self, name: &str) -> bool {
        if self.names.contains(name) {
            return true;
        }
        extension_of(name).is_some_and(|ext| self.extensions.contains(&ext))
    }

    /// Whether any component of a relative path is excluded.
    pub fn excludes_path(&self, path: &Path) -> bool {
        path.components().any(|c| match c {
            Component::Normal(part) => self.should_exclude(&part.to_string_lossy()),
            _ => false,
        })
    }

    /// Whether a file's contents are withheld from the snapshot by extension.
    pub fn is_asset(&self, name: &str) -> bool {
        extension_of(name).is_some_and(|ext| self.asset_extensions.contains(&ext))
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Lowercased extension of a file name; dotfiles like `.env` have none.
fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
