//! Subcommands of the `autobranch` binary, one `App::cmd_*` method each.
//!
//! - [`poll`]: process every open issue not in the ledger, once or on an interval
//! - [`handle`]: process a single issue given on the command line
//! - [`issues`]: list open issues
//! - [`snapshot`]: print what the generator would be shown

pub mod handle;
pub mod issues;
pub mod poll;
pub mod snapshot;
