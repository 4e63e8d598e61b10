//! Simpson's rule

use super::{integrand, validate_bounds, IntegrationMethod, QuadratureError};

/// Composite Simpson's rule.
///
/// The interval count is derived from the requested step and rounded up to
/// the nearest even number, so the effective step may be slightly smaller
/// than requested. Error decreases as O(step^4).
pub struct SimpsonsRule;

impl IntegrationMethod for SimpsonsRule {
    fn integrate(&self, lower: f64, upper: f64, step: f64) -> Result<f64, QuadratureError> {
        validate_bounds(lower, upper, step)?;

        let mut n = ((upper - lower) / step).ceil() as u64;
        // Simpson's rule needs an even number of intervals.
        if n % 2 == 1 {
            n += 1;
        }

        let h = (upper - lower) / n as f64;

        let mut sum = integrand(lower)? + integrand(upper)?;

        for i in 1..n {
            let x = lower + i as f64 * h;
            let weight = if i % 2 == 0 { 2.0 } else { 4.0 };
            sum += weight * integrand(x)?;
        }

        Ok(sum * h / 3.0)
    }

    fn name(&self) -> &'static str {
        "Simpson's rule"
    }
}
