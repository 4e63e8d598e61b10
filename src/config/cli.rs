//! CLI argument parsing using clap

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use crate::quadrature::{IntegrationMethod, SimpsonsRule, TrapezoidalRule};

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Coordinator mode - accept workers, partition the range, aggregate
    Coordinator,
    /// Worker mode - connect to a coordinator and compute one share
    Worker,
}

/// Integration method selection (worker mode)
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MethodKind {
    /// Composite trapezoidal rule
    Trapezoidal,
    /// Composite Simpson's rule
    Simpson,
}

impl MethodKind {
    /// Instantiates the selected method.
    pub fn build(self) -> Arc<dyn IntegrationMethod + Send + Sync> {
        match self {
            MethodKind::Trapezoidal => Arc::new(TrapezoidalRule),
            MethodKind::Simpson => Arc::new(SimpsonsRule),
        }
    }
}

/// lintegral - distributed integration of 1/ln(x)
#[derive(Parser, Debug)]
#[command(name = "lintegral")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode: coordinator or worker
    #[arg(long, value_enum)]
    pub mode: ExecutionMode,

    /// Coordinator address to connect to (worker mode only)
    #[arg(value_name = "HOST")]
    pub host: Option<String>,

    /// TCP port: listen port in coordinator mode, connect port in worker mode
    #[arg(short = 'p', long, default_value = "5555")]
    pub port: u16,

    /// Lower integration limit (coordinator mode; prompted for when omitted)
    #[arg(long)]
    pub lower: Option<f64>,

    /// Upper integration limit (coordinator mode; prompted for when omitted)
    #[arg(long)]
    pub upper: Option<f64>,

    /// Integration step (coordinator mode; prompted for when omitted)
    #[arg(long)]
    pub step: Option<f64>,

    /// Integration method to run (worker mode)
    #[arg(long, value_enum, default_value = "trapezoidal")]
    pub method: MethodKind,

    /// Number of compute threads; defaults to the detected logical core count
    #[arg(short = 't', long)]
    pub threads: Option<u32>,

    /// Seconds to wait for all results after dispatch (0 = no limit)
    #[arg(long, default_value = "300")]
    pub collect_timeout: u64,
}

impl Cli {
    /// Checks mode-dependent argument combinations.
    pub fn validate(&self) -> Result<()> {
        match self.mode {
            ExecutionMode::Worker => {
                if self.host.is_none() {
                    anyhow::bail!("worker mode requires the coordinator HOST argument");
                }
                if self.threads == Some(0) {
                    anyhow::bail!("--threads must be at least 1");
                }
            }
            ExecutionMode::Coordinator => {
                if self.host.is_some() {
                    anyhow::bail!("coordinator mode does not take a HOST argument");
                }
            }
        }
        Ok(())
    }
}
