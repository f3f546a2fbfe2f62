//! Turning generator output into a validated list of whole-file edits.
//!
//! The generator is asked for a JSON array of
//! `{"filename": .., "path": .., "content": ..}` objects, but its answer is
//! untrusted: it is often wrapped in a markdown fence and code samples inside
//! `content` tend to carry backslashes that are not legal JSON escapes.

use std::borrow::Cow;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::errors::ChangeSetParseError;

static FENCED_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)\r?\n?[ \t]*```").unwrap()
});

/// Characters that may follow a backslash in a JSON string, besides `u`.
const JSON_ESCAPES: &[char] = &['"', '\\', '/', 'b', 'f', 'n', 'r', 't'];

/// A whole-file replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEdit {
    /// Path relative to the working copy root, `/`-separated.
    pub path: String,
    pub content: String,
}

/// Edits in generator order. Duplicated paths are kept; the later write wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub edits: Vec<FileEdit>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileEdit> {
        self.edits.iter()
    }
}

/// How to treat array elements that do not match the expected shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseMode {
    /// One bad element rejects the whole batch.
    #[default]
    Strict,
    /// Bad elements are dropped with a warning.
    BestEffort,
}

impl FromStr for ParseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "strict" => Ok(Self::Strict),
            "best_effort" => Ok(Self::BestEffort),
            other => Err(format!("expected 'strict' or 'best_effort', got '{other}'")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEdit {
    filename: String,
    path: String,
    content: String,
}

pub struct ChangeSetParser {
    mode: ParseMode,
}

impl ChangeSetParser {
    pub fn new(mode: ParseMode) -> Self {
        Self { mode }
    }

    pub fn parse(&self, raw: &str) -> Result<ChangeSet, ChangeSetParseError> {
        let unfenced = strip_code_fences(raw);
        let repaired = repair_escapes(unfenced);

        let elements: Vec<serde_json::Value> = serde_json::from_str(&repaired)
            .map_err(|e| ChangeSetParseError::new(e.to_string(), &repaired))?;

        let mut edits = Vec::with_capacity(elements.len());
        for (index, element) in elements.into_iter().enumerate() {
            match to_file_edit(element) {
                Ok(edit) => edits.push(edit),
                Err(message) => match self.mode {
                    ParseMode::Strict => {
                        return Err(ChangeSetParseError::new(
                            format!("element {index}: {message}"),
                            &repaired,
                        ));
                    }
                    ParseMode::BestEffort => {
                        warn!("Dropping change set element {index}: {message}");
                    }
                },
            }
        }

        Ok(ChangeSet { edits })
    }
}

fn to_file_edit(element: serde_json::Value) -> Result<FileEdit, String> {
    let raw: RawEdit = serde_json::from_value(element).map_err(|e| e.to_string())?;
    let filename = raw.filename.trim();
    if filename.is_empty() {
        return Err("empty filename".to_string());
    }
    Ok(FileEdit {
        path: join_path(&raw.path, filename),
        content: raw.content,
    })
}

/// Join the directory and file name reported by the generator into one
/// `/`-separated relative path. Validation against the working copy happens
/// when the edit is applied.
fn join_path(dir: &str, filename: &str) -> String {
    let dir = dir.trim().replace('\\', "/");
    let dir = dir.trim_end_matches('/');
    let dir = dir.strip_prefix("./").unwrap_or(dir);
    let filename = filename.replace('\\', "/");
    if dir.is_empty() || dir == "." {
        filename
    } else {
        format!("{dir}/{filename}")
    }
}

/// Removes a leading/trailing markdown fence. Text that is neither fenced nor
/// a bare array is searched for the first fenced block; failing that it is
/// returned trimmed.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        // Drop the info string (`json`, `JSON`, ...) on the opening line.
        let body = rest.split_once('\n').map_or(rest, |(_, body)| body).trim_end();
        return body.strip_suffix("```").unwrap_or(body).trim();
    }
    if trimmed.starts_with('[') {
        return trimmed;
    }
    match FENCED_BLOCK_RE.captures(trimmed).and_then(|caps| caps.get(1)) {
        Some(body) => body.as_str().trim(),
        None => trimmed,
    }
}

/// Whether `rest`, the text after a backslash, continues a legal escape.
/// `\u` needs four hex digits.
fn starts_legal_escape(rest: &str) -> bool {
    match rest.chars().next() {
        Some('u') => {
            let digits = rest.as_bytes().get(1..5);
            digits.is_some_and(|d| d.iter().all(u8::is_ascii_hexdigit))
        }
        Some(next) => JSON_ESCAPES.contains(&next),
        None => false,
    }
}

/// Doubles every backslash that does not start a legal JSON escape.
///
/// `\d` becomes `\\d` while `\n`, `\"` and `\\` are left as they are, so text
/// that is already valid JSON comes back unchanged.
pub fn repair_escapes(text: &str) -> Cow<'_, str> {
    if !text.contains('\\') {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 16);
    let mut changed = false;
    let mut chars = text.char_indices();
    while let Some((i, c)) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        if starts_legal_escape(&text[i + 1..]) {
            out.push('\\');
            // Escaped backslashes must not start another escape
            if let Some((_, next)) = chars.next() {
                out.push(next);
            }
        } else {
            out.push_str("\\\\");
            changed = true;
        }
    }

    if changed {
        Cow::Owned(out)
    } else {
        Cow::Borrowed(text)
    }
}
