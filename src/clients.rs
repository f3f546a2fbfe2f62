//! Integration layers for the external systems `autobranch` talks to.
//!
//! - [`git`]: git CLI operations on the working copy (branching, committing, pushing)
//! - [`http_curl`]: curl-based HTTP client shared by the REST integrations
//! - [`github`]: GitHub issues and clone URL
//! - [`devops`]: Azure DevOps work items and clone URL
//! - [`openai`]: Azure OpenAI chat deployment used as the change generator
//!
//! Git sits behind the [`git::GitOps`] trait so the core can be tested with a
//! mock; the HTTP clients are only exercised through their response parsing.

pub mod devops;
pub mod git;
pub mod github;
pub mod http_curl;
pub mod openai;
