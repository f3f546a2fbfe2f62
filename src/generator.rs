#![allow(async_fn_in_trait)]

use anyhow::Result;

use crate::issue::Issue;
use crate::snapshot::RepoSnapshot;

/// Default system context sent ahead of the repository snapshot.
pub const DEFAULT_SYSTEM_CONTEXT: &str = "\
You are an experienced software engineer. You receive an issue (title and \
body), the file tree of a repository and the contents of its files. Propose \
the file changes that resolve the issue.

Answer with a JSON array and nothing else. Each element describes one file \
to create or overwrite and has exactly these string keys:
- \"filename\": the file name, e.g. \"example.py\"
- \"path\": the directory relative to the repository root, e.g. \"src/utils\" \
(empty for the root)
- \"content\": the complete new content of the file

Example:
[{\"filename\": \"example.py\", \"path\": \"src/utils\", \"content\": \"print('hello')\\n\"}]

Only reference paths consistent with the provided file tree. Answer [] when \
no change is needed.";

/// Everything the generator gets to see for one issue.
pub struct GenerationRequest<'a> {
    pub system_context: &'a str,
    pub issue: &'a Issue,
    pub snapshot: &'a RepoSnapshot,
}

/// A service that proposes file changes for an issue.
///
/// The returned text *should* be the JSON array described in
/// [`DEFAULT_SYSTEM_CONTEXT`], but callers treat it as untrusted.
pub trait ChangeGenerator {
    async fn propose_changes(&self, request: &GenerationRequest<'_>) -> Result<String>;
}

/// A chat message as sent to chat-completion style APIs.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// Conversation for one generation request: system context, tree, contents,
/// output reminder, then the issue as the user turn.
pub fn build_messages(request: &GenerationRequest<'_>) -> Result<Vec<ChatMessage>> {
    let content_json = request.snapshot.content_json()?;
    Ok(vec![
        ChatMessage::system(request.system_context),
        ChatMessage::system(format!("Here is the file tree:\n{}", request.snapshot.tree_text)),
        ChatMessage::system(format!("Here are the file contents:\n{content_json}")),
        ChatMessage::system("Respond only with the JSON array described above."),
        ChatMessage::user(format!(
            "Issue title: {}\nIssue body:\n{}",
            request.issue.title, request.issue.body
        )),
    ])
}
