//! Rank-sum estimation over the weighted residual vector.
//!
//! The robust (L1-like) machinery of the locator: weighted medians for
//! the origin-time correction, a Wilcoxon-score dispersion in place of a
//! least-squares penalty, and the direction of steepest descent of that
//! dispersion.

use crate::models::wresidual::WeightedResidual;

/// Which value of a weighted residual an operation works on: the real
/// residual or the linearized trial estimate maintained by the step
/// search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Basis {
    Residual,
    Estimate,
}

fn value_of(row: &WeightedResidual, basis: Basis) -> f64 {
    match basis {
        Basis::Residual => row.residual,
        Basis::Estimate => row.estimate,
    }
}

/// Weighted median of the phase residuals, used as the origin-time
/// correction. The cumulative weight function is interpolated linearly
/// between adjacent residuals; the depth prior does not participate.
pub fn compute_median(rows: &[WeightedResidual], basis: Basis) -> f64 {
    let mut samples: Vec<(f64, f64)> = rows
        .iter()
        .filter(|row| !row.is_depth_prior())
        .map(|row| (value_of(row, basis), row.weight.max(0.0)))
        .collect();
    if samples.is_empty() {
        return 0.0;
    }
    samples.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let total: f64 = samples.iter().map(|s| s.1).sum();
    if total <= 0.0 {
        return samples[samples.len() / 2].0;
    }

    // Positions of each sample on the cumulative weight axis.
    let mut cumulative = 0.0;
    let positions: Vec<f64> = samples
        .iter()
        .map(|s| {
            let p = (cumulative + s.1 / 2.0) / total;
            cumulative += s.1;
            p
        })
        .collect();

    if 0.5 <= positions[0] {
        return samples[0].0;
    }
    if 0.5 >= positions[positions.len() - 1] {
        return samples[samples.len() - 1].0;
    }
    for j in 1..positions.len() {
        if 0.5 <= positions[j] {
            let frac = (0.5 - positions[j - 1]) / (positions[j] - positions[j - 1]);
            return samples[j - 1].0 + frac * (samples[j].0 - samples[j - 1].0);
        }
    }
    samples[samples.len() - 1].0
}

/// Remove the median from the phase residuals (the depth residual is not
/// a time and keeps its value).
pub fn de_median_residuals(rows: &mut [WeightedResidual], median: f64) {
    for row in rows.iter_mut() {
        if !row.is_depth_prior() {
            row.residual -= median;
        }
    }
}

/// Remove the trial median from the phase residual estimates.
pub fn de_median_estimates(rows: &mut [WeightedResidual], median: f64) {
    for row in rows.iter_mut() {
        if !row.is_depth_prior() {
            row.estimate -= median;
        }
    }
}

/// Remove the weighted column medians from the design matrix, so the
/// steepest-descent direction is insensitive to the origin-time trade-off.
pub fn de_median_design(rows: &mut [WeightedResidual]) {
    for column in 0..3 {
        let mut samples: Vec<(f64, f64)> = rows
            .iter()
            .map(|row| (row.design[column], row.weight.max(0.0)))
            .collect();
        if samples.is_empty() {
            continue;
        }
        samples.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        let total: f64 = samples.iter().map(|s| s.1).sum();
        if total <= 0.0 {
            continue;
        }
        let mut cumulative = 0.0;
        let mut median = samples[samples.len() - 1].0;
        let mut previous: Option<(f64, f64)> = None;
        for &(value, weight) in &samples {
            let position = (cumulative + weight / 2.0) / total;
            if position >= 0.5 {
                median = match previous {
                    Some((prev_value, prev_position)) => {
                        let frac = (0.5 - prev_position) / (position - prev_position);
                        prev_value + frac * (value - prev_value)
                    }
                    None => value,
                };
                break;
            }
            previous = Some((value, position));
            cumulative += weight;
        }
        for row in rows.iter_mut() {
            row.design[column] -= median;
        }
    }
}

/// Wilcoxon score for the sample at `position` of `n` sorted values:
/// odd-symmetric, increasing, zero-mean.
fn score(position: f64, n: usize) -> f64 {
    12.0_f64.sqrt() * ((position + 0.5) / n as f64 - 0.5)
}

/// Rank-sum dispersion of the weighted residuals: the sum of the sorted
/// weighted residuals against the Wilcoxon scores. Nonnegative, and zero
/// exactly when every weighted residual is zero.
pub fn dispersion(rows: &[WeightedResidual], basis: Basis) -> f64 {
    let mut weighted: Vec<f64> = rows
        .iter()
        .map(|row| row.weight * value_of(row, basis))
        .collect();
    if weighted.is_empty() {
        return 0.0;
    }
    weighted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = weighted.len();
    weighted
        .iter()
        .enumerate()
        .map(|(j, &wr)| score(j as f64, n) * wr)
        .sum()
}

/// Direction of steepest descent of the dispersion with respect to a
/// local Cartesian step, as a unit `dof`-vector (the depth component is
/// zero for 2 degrees of freedom).
///
/// Equal residuals get averaged ranks so the direction is independent of
/// sort order among ties.
pub fn steepest_descent(rows: &[WeightedResidual], degrees_of_freedom: usize) -> [f64; 3] {
    let n = rows.len();
    if n == 0 {
        return [0.0; 3];
    }

    let weighted: Vec<f64> = rows.iter().map(|row| row.weight * row.residual).collect();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        weighted[a]
            .partial_cmp(&weighted[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Scores by sorted position, ties averaged.
    let mut scores = vec![0.0; n];
    let mut j = 0;
    while j < n {
        let mut k = j;
        while k + 1 < n && weighted[order[k + 1]] == weighted[order[j]] {
            k += 1;
        }
        let mean_position = (j + k) as f64 / 2.0;
        let tied_score = score(mean_position, n);
        for &index in &order[j..=k] {
            scores[index] = tied_score;
        }
        j = k + 1;
    }

    let mut direction = [0.0; 3];
    for (row, &row_score) in rows.iter().zip(scores.iter()) {
        for column in 0..degrees_of_freedom.min(3) {
            direction[column] += row_score * row.weight * row.design[column];
        }
    }

    let norm = direction.iter().map(|d| d * d).sum::<f64>().sqrt();
    if norm > 0.0 {
        for component in &mut direction {
            *component /= norm;
        }
    }
    direction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::wresidual::ResidualSource;
    use approx::assert_relative_eq;

    fn rows_from(residuals: &[f64], weights: &[f64]) -> Vec<WeightedResidual> {
        residuals
            .iter()
            .zip(weights.iter())
            .enumerate()
            .map(|(j, (&r, &w))| {
                WeightedResidual::new(ResidualSource::Phase(j), r, w, [0.1 * j as f64, 0.2, 0.0])
            })
            .collect()
    }

    #[test]
    fn median_is_translation_equivariant() {
        let residuals = [3.0, -1.0, 0.5, 2.0, 8.0];
        let weights = [1.0, 0.5, 2.0, 1.0, 0.2];
        let rows = rows_from(&residuals, &weights);
        let median = compute_median(&rows, Basis::Residual);

        let shifted: Vec<f64> = residuals.iter().map(|r| r + 4.5).collect();
        let rows_shifted = rows_from(&shifted, &weights);
        let median_shifted = compute_median(&rows_shifted, Basis::Residual);

        assert_relative_eq!(median_shifted, median + 4.5, epsilon = 1e-12);
    }

    #[test]
    fn median_ignores_the_depth_prior() {
        let mut rows = rows_from(&[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0]);
        rows.push(WeightedResidual::depth_prior(400.0, 10.0));
        assert_relative_eq!(compute_median(&rows, Basis::Residual), 1.0);
    }

    #[test]
    fn dispersion_is_nonnegative_and_zero_at_zero() {
        let rows = rows_from(&[0.0, 0.0, 0.0], &[1.0, 2.0, 0.5]);
        assert_eq!(dispersion(&rows, Basis::Residual), 0.0);

        let rows = rows_from(&[1.5, -2.0, 0.3, 4.0], &[1.0, 1.0, 2.0, 0.5]);
        assert!(dispersion(&rows, Basis::Residual) > 0.0);

        // Any residual pattern keeps the dispersion nonnegative.
        let rows = rows_from(&[-5.0, -2.0, -0.1], &[1.0, 1.0, 1.0]);
        assert!(dispersion(&rows, Basis::Residual) >= 0.0);
    }

    #[test]
    fn de_median_centers_the_residuals() {
        let mut rows = rows_from(&[3.0, -1.0, 0.5, 2.0], &[1.0; 4]);
        let median = compute_median(&rows, Basis::Residual);
        de_median_residuals(&mut rows, median);
        let recentered = compute_median(&rows, Basis::Residual);
        assert_relative_eq!(recentered, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn steepest_descent_is_unit_length() {
        let mut rows = rows_from(&[1.5, -2.0, 0.3, 4.0, -0.7], &[1.0, 1.0, 2.0, 0.5, 1.5]);
        for (j, row) in rows.iter_mut().enumerate() {
            row.design = [0.3 * j as f64 - 0.5, 0.1 * j as f64, -0.05];
        }
        let direction = steepest_descent(&rows, 3);
        let norm: f64 = direction.iter().map(|d| d * d).sum::<f64>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn two_degrees_of_freedom_have_no_depth_component() {
        let mut rows = rows_from(&[1.5, -2.0, 0.3], &[1.0, 1.0, 2.0]);
        for row in rows.iter_mut() {
            row.design = [0.3, 0.1, -0.5];
        }
        let direction = steepest_descent(&rows, 2);
        assert_eq!(direction[2], 0.0);
        let norm: f64 = direction.iter().map(|d| d * d).sum::<f64>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn tied_residuals_share_averaged_ranks() {
        // Two rows with identical weighted residuals but opposite design
        // rows cancel in the direction when their ranks are averaged.
        let mut rows = rows_from(&[1.0, 1.0, -2.0], &[1.0, 1.0, 1.0]);
        rows[0].design = [1.0, 0.0, 0.0];
        rows[1].design = [-1.0, 0.0, 0.0];
        rows[2].design = [0.0, 1.0, 0.0];
        let direction = steepest_descent(&rows, 2);
        assert_relative_eq!(direction[0], 0.0, epsilon = 1e-12);
    }
}
