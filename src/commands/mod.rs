//! Command modules for the pinstream CLI
//!
//! - `watch` - follow a live pin map from the API and the push daemon
//! - `registry` - inspect and prune the connection registry
//!
//! Handlers take their `Args` struct from `cli.rs` plus a shared
//! [`CommandContext`] and return the text to print.

pub mod registry;
pub mod watch;

pub use registry::{run_connections, run_prune};
pub use watch::run_watch;

use crate::cli::OutputFormat;

/// Shared context passed to all command handlers
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    pub format: OutputFormat,
    pub verbose: bool,
}

impl CommandContext {
    pub fn from_cli(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }
}
