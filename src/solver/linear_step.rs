//! One-dimensional search of the dispersion along the descent direction.
//!
//! Trial hypocenters along the unit step direction are evaluated through
//! the linearized residual estimates (no re-identification); the search
//! extends while the dispersion decreases and brackets-and-bisects a
//! minimum otherwise.

use crate::error::{LocatorError, Result};
use crate::geo;
use crate::models::wresidual::WeightedResidual;
use crate::solver::estimator::{self, Basis};

/// Outcome of one trial or of the whole search.
#[derive(Debug, Clone, Copy)]
pub struct StepResult {
    /// Accepted step length in kilometers
    pub step_length: f64,
    /// Median of the trial residuals: the origin-time correction
    pub median: f64,
    pub dispersion: f64,
}

/// Evaluate one trial step length: project every residual to the trial
/// position, take out the trial median, and measure the dispersion.
fn evaluate(rows: &mut [WeightedResidual], direction: &[f64; 3], step_length: f64) -> StepResult {
    let trial = [
        step_length * direction[0],
        step_length * direction[1],
        step_length * direction[2],
    ];
    for row in rows.iter_mut() {
        row.update_estimate(&trial);
    }
    let median = estimator::compute_median(rows, Basis::Estimate);
    estimator::de_median_estimates(rows, median);
    let dispersion = estimator::dispersion(rows, Basis::Estimate);
    StepResult {
        step_length,
        median,
        dispersion,
    }
}

/// Find the step length minimizing the dispersion along `direction`.
///
/// Starts from `initial_step`, doubles while the dispersion decreases
/// (clamped to `max_step`), and bisects a bracketed minimum down to
/// `convergence_limit`. When even tiny steps fail to descend, the last
/// tiny trial is returned so the caller can detect convergence on this
/// axis (dispersion not improved, step below the limit).
pub fn step_length(
    rows: &mut [WeightedResidual],
    direction: &[f64; 3],
    initial_step: f64,
    convergence_limit: f64,
    max_step: f64,
) -> Result<StepResult> {
    let base = evaluate(rows, direction, 0.0);

    let mut step = initial_step.min(max_step).max(convergence_limit);
    let mut trial = evaluate(rows, direction, step);

    if trial.dispersion >= base.dispersion {
        // Walk back towards zero until something descends.
        loop {
            step /= 2.0;
            trial = evaluate(rows, direction, step);
            if trial.dispersion < base.dispersion {
                break;
            }
            if step < convergence_limit {
                // Nothing descends on this axis; hand back the tiny
                // uphill trial so the caller can detect convergence.
                return Ok(trial);
            }
        }
        let upper = evaluate(rows, direction, 2.0 * step);
        return bisect(rows, direction, base, trial, upper, convergence_limit);
    }

    // Extend while we keep descending.
    let mut previous = base;
    let mut best = trial;
    loop {
        if best.step_length >= max_step {
            return Ok(best);
        }
        let next = evaluate(rows, direction, (2.0 * best.step_length).min(max_step));
        if next.dispersion >= best.dispersion {
            return bisect(rows, direction, previous, best, next, convergence_limit);
        }
        previous = best;
        best = next;
    }
}

/// Shrink a three-point bracket (low, middle, high) with the middle
/// dispersion smallest until its width reaches the convergence limit.
fn bisect(
    rows: &mut [WeightedResidual],
    direction: &[f64; 3],
    mut low: StepResult,
    mut middle: StepResult,
    mut high: StepResult,
    convergence_limit: f64,
) -> Result<StepResult> {
    let mut iterations = 0;
    while high.step_length - low.step_length > convergence_limit {
        iterations += 1;
        if iterations > geo::MAX_BISECT {
            return Err(LocatorError::BisectionFailed);
        }

        if middle.step_length - low.step_length >= high.step_length - middle.step_length {
            let probe = evaluate(
                rows,
                direction,
                0.5 * (low.step_length + middle.step_length),
            );
            if probe.dispersion < middle.dispersion {
                high = middle;
                middle = probe;
            } else {
                low = probe;
            }
        } else {
            let probe = evaluate(
                rows,
                direction,
                0.5 * (middle.step_length + high.step_length),
            );
            if probe.dispersion < middle.dispersion {
                low = middle;
                middle = probe;
            } else {
                high = probe;
            }
        }
    }
    // Leave the estimates at the accepted trial.
    let accepted = evaluate(rows, direction, middle.step_length);
    Ok(accepted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::wresidual::ResidualSource;
    use approx::assert_relative_eq;

    /// Rows whose residuals are exactly explained by a source mislocation
    /// of `truth` kilometers: the dispersion minimum sits at |truth|.
    fn rows_toward(truth: [f64; 3]) -> (Vec<WeightedResidual>, [f64; 3], f64) {
        let designs: [[f64; 3]; 6] = [
            [0.08, 0.01, 0.01],
            [-0.05, 0.06, 0.02],
            [0.02, -0.07, 0.015],
            [0.06, 0.05, 0.0],
            [-0.04, -0.03, 0.01],
            [0.01, 0.08, 0.02],
        ];
        let rows: Vec<WeightedResidual> = designs
            .iter()
            .enumerate()
            .map(|(j, d)| {
                let residual = d[0] * truth[0] + d[1] * truth[1] + d[2] * truth[2];
                WeightedResidual::new(ResidualSource::Phase(j), residual, 1.0, *d)
            })
            .collect();
        let norm = (truth.iter().map(|t| t * t).sum::<f64>()).sqrt();
        let direction = [truth[0] / norm, truth[1] / norm, truth[2] / norm];
        (rows, direction, norm)
    }

    #[test]
    fn finds_the_minimum_by_bracketing() {
        let (mut rows, direction, distance) = rows_toward([30.0, -20.0, 10.0]);
        let result = step_length(&mut rows, &direction, 10.0, 0.5, 200.0).unwrap();
        assert_relative_eq!(result.step_length, distance, epsilon = 1.0);
        let far_off = evaluate(&mut rows, &direction, 0.0).dispersion;
        assert!(result.dispersion < 0.1 * far_off);
    }

    #[test]
    fn monotone_descent_returns_the_cap() {
        let (mut rows, direction, _) = rows_toward([300.0, 0.0, 0.0]);
        let result = step_length(&mut rows, &direction, 20.0, 0.5, 100.0).unwrap();
        assert_relative_eq!(result.step_length, 100.0);
    }

    #[test]
    fn ascent_everywhere_returns_a_tiny_step() {
        let (mut rows, direction, _) = rows_toward([30.0, 0.0, 0.0]);
        // Walk away from the minimum: flip the direction.
        let wrong = [-direction[0], -direction[1], -direction[2]];
        let base = evaluate(&mut rows, &wrong, 0.0).dispersion;
        let result = step_length(&mut rows, &wrong, 10.0, 0.5, 100.0).unwrap();
        assert!(result.step_length < 0.5);
        assert!(result.dispersion >= base);
    }

    #[test]
    fn trial_median_recovers_a_time_shift() {
        let (mut rows, direction, _) = rows_toward([30.0, -20.0, 10.0]);
        for row in rows.iter_mut() {
            row.residual += 4.0;
        }
        let result = step_length(&mut rows, &direction, 10.0, 0.5, 200.0).unwrap();
        assert_relative_eq!(result.median, 4.0, epsilon = 0.1);
    }
}
