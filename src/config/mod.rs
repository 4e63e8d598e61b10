//! Runtime configuration
//!
//! Plain-data settings for the two process roles, built from the CLI in
//! `main` and checked by [`validator`] before a run starts.

pub mod cli;
pub mod validator;

use std::time::Duration;

/// The integration request driving one coordinator run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationParameters {
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub step: f64,
}

/// Coordinator role settings.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Port the listener binds on (0 picks an ephemeral port).
    pub port: u16,
    pub parameters: IntegrationParameters,
    /// How long to wait for results after dispatch. Zero waits forever.
    pub collect_timeout: Duration,
}

/// Worker role settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Coordinator address as `host:port`.
    pub server_addr: String,
    pub method: cli::MethodKind,
    /// Compute thread override; `None` uses the detected core count.
    pub threads: Option<u32>,
}
