//! Configuration validation
//!
//! The coordinator refuses to start a run with parameters the quadrature
//! layer would reject anyway: partitioning a bad range would only ship the
//! failure to every worker.

use anyhow::{Context, Result};

use super::{CoordinatorConfig, IntegrationParameters};
use crate::quadrature;

/// Validates an integration request against the quadrature preconditions.
pub fn validate_parameters(params: &IntegrationParameters) -> Result<()> {
    quadrature::validate_bounds(params.lower_limit, params.upper_limit, params.step)
        .context("invalid integration request")
}

/// Validates a full coordinator configuration.
pub fn validate_coordinator_config(config: &CoordinatorConfig) -> Result<()> {
    validate_parameters(&config.parameters)
}
