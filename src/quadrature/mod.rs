//! Numerical quadrature of f(x) = 1/ln(x)
//!
//! This module provides the integration methods used by worker nodes. Every
//! method implements the same contract: validate the requested interval, then
//! approximate the definite integral of 1/ln(x) over it.
//!
//! The integrand has a singularity at x = 1 (where ln(x) = 0) and is
//! undefined for x <= 0, so a valid interval must lie entirely inside
//! (0, 1) or entirely inside (1, +inf), with both endpoints further than
//! [`SINGULARITY_TOLERANCE`] away from 1.

pub mod simpson;
pub mod trapezoidal;

pub use simpson::SimpsonsRule;
pub use trapezoidal::TrapezoidalRule;

use thiserror::Error;

/// Distance from x = 1 inside which the integrand is treated as undefined.
pub const SINGULARITY_TOLERANCE: f64 = 1e-10;

/// Errors raised by the quadrature layer.
#[derive(Debug, Error)]
pub enum QuadratureError {
    /// The requested interval or step violates a method precondition.
    #[error("invalid integration parameters: {0}")]
    InvalidParameters(String),

    /// The integrand was evaluated at a point where it is undefined.
    #[error("integrand undefined at x = {x}: {reason}")]
    Domain { x: f64, reason: &'static str },
}

/// A numerical integration method for 1/ln(x).
///
/// Implementations are stateless and shared across worker threads, so the
/// trait requires `Send + Sync`.
pub trait IntegrationMethod: Send + Sync {
    /// Computes the definite integral of 1/ln(x) over `[lower, upper]`.
    ///
    /// `step` controls the subdivision granularity. Methods may adjust the
    /// effective step internally (Simpson's rule rounds the interval count
    /// up to an even number); the caller-supplied value is a hint, not a
    /// contract for the exact node placement.
    fn integrate(&self, lower: f64, upper: f64, step: f64) -> Result<f64, QuadratureError>;

    /// Human-readable method name, used in logs only.
    fn name(&self) -> &'static str;
}

/// Evaluates the integrand 1/ln(x).
pub fn integrand(x: f64) -> Result<f64, QuadratureError> {
    if x <= 0.0 {
        return Err(QuadratureError::Domain {
            x,
            reason: "logarithm undefined for x <= 0",
        });
    }

    let ln_x = x.ln();
    if ln_x.abs() < SINGULARITY_TOLERANCE {
        return Err(QuadratureError::Domain {
            x,
            reason: "point lies on the singularity at x = 1",
        });
    }

    Ok(1.0 / ln_x)
}

/// Validates an integration request. Every method applies this identical
/// policy before touching the integrand.
pub fn validate_bounds(lower: f64, upper: f64, step: f64) -> Result<(), QuadratureError> {
    if !lower.is_finite() || !upper.is_finite() || !step.is_finite() {
        return Err(QuadratureError::InvalidParameters(
            "bounds and step must be finite".to_string(),
        ));
    }

    if lower <= 0.0 {
        return Err(QuadratureError::InvalidParameters(format!(
            "lower limit must be positive, got {lower}"
        )));
    }

    if lower >= upper {
        return Err(QuadratureError::InvalidParameters(format!(
            "lower limit {lower} must be less than upper limit {upper}"
        )));
    }

    if step <= 0.0 {
        return Err(QuadratureError::InvalidParameters(format!(
            "step must be positive, got {step}"
        )));
    }

    if step >= upper - lower {
        return Err(QuadratureError::InvalidParameters(format!(
            "step {step} must be smaller than the interval length {}",
            upper - lower
        )));
    }

    // The interval must lie entirely on one side of the singularity at
    // x = 1, with both endpoints clear of its tolerance band.
    if (lower - 1.0).abs() < SINGULARITY_TOLERANCE || (upper - 1.0).abs() < SINGULARITY_TOLERANCE {
        return Err(QuadratureError::InvalidParameters(format!(
            "interval [{lower}, {upper}] touches the singularity at x = 1"
        )));
    }

    if lower < 1.0 && upper > 1.0 {
        return Err(QuadratureError::InvalidParameters(format!(
            "interval [{lower}, {upper}] straddles the singularity at x = 1"
        )));
    }

    Ok(())
}
