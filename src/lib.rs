pub mod apply;
pub mod branch;
pub mod changeset;
pub mod clients;
pub mod commands;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod generator;
pub mod ignore;
pub mod issue;
pub mod ledger;
pub mod logging;
pub mod pipeline;
pub mod publish;
pub mod remote;
pub mod snapshot;

mod app;

pub use app::App;
pub use config::Config;
pub use errors::PipelineError;
pub use issue::Issue;
pub use pipeline::IssueOutcome;
pub use pipeline::Pipeline;

// Disable colors for all tests to get clean output
#[cfg(test)]
#[ctor::ctor]
fn init_tests() {
    colored::control::set_override(false);
}
