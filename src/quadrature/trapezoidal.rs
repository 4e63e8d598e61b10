//! Trapezoidal rule

use super::{integrand, validate_bounds, IntegrationMethod, QuadratureError};

/// Composite trapezoidal rule.
///
/// Walks the interval in `step` increments, clamping the final segment to the
/// upper limit, and sums the trapezoid areas. Error decreases as O(step^2).
pub struct TrapezoidalRule;

impl IntegrationMethod for TrapezoidalRule {
    fn integrate(&self, lower: f64, upper: f64, step: f64) -> Result<f64, QuadratureError> {
        validate_bounds(lower, upper, step)?;

        let mut sum = 0.0;
        let mut x = lower;
        let mut f_prev = integrand(x)?;

        while x < upper {
            // Clamp the last segment so the walk ends exactly at the limit.
            let x_next = if x + step > upper { upper } else { x + step };
            let f_next = integrand(x_next)?;

            sum += (f_prev + f_next) * (x_next - x) / 2.0;

            x = x_next;
            f_prev = f_next;
        }

        Ok(sum)
    }

    fn name(&self) -> &'static str {
        "Trapezoidal rule"
    }
}
