//! Formal error statistics: standard errors, the error ellipsoid, and
//! data importances.

use nalgebra::{DMatrix, SymmetricEigen};
use tracing::debug;

use crate::geo;
use crate::models::event::{EllipseAxis, Event};
use crate::models::wresidual::ResidualSource;
use crate::status::LocStatus;

/// Compute the error statistics from the final design/weight system.
///
/// The normal matrix of the effective residual system is inverted on the
/// degrees-of-freedom subspace; its eigenstructure, scaled by the 90%
/// F-distribution factor, gives the error ellipsoid. Failures are
/// reported through the returned status with the statistics zeroed.
pub fn compute_errors(event: &mut Event) -> LocStatus {
    let rows: Vec<_> = if event.use_decorrelation {
        event.residuals_projected.clone()
    } else {
        event.residuals_raw.clone()
    };

    let degrees_of_freedom = event.hypocenter.degrees_of_freedom;
    let num_rows = rows.len();
    if num_rows <= degrees_of_freedom {
        event.zero_stats(true);
        event.zero_weights();
        return LocStatus::SingularMatrix;
    }

    // Residual standard error of the weighted system.
    let weighted_sum: f64 = rows.iter().map(|row| (row.weight * row.residual).powi(2)).sum();
    let weight_sum: f64 = rows
        .iter()
        .filter(|row| !row.is_depth_prior())
        .map(|row| row.weight.powi(2))
        .sum();
    let variance = weighted_sum / (num_rows - degrees_of_freedom) as f64;
    event.se_residual = variance.sqrt();
    event.se_time = if weight_sum > 0.0 {
        (variance / weight_sum).sqrt()
    } else {
        0.0
    };

    // Normal equations on the degrees-of-freedom subspace.
    let mut normal: DMatrix<f64> = DMatrix::zeros(degrees_of_freedom, degrees_of_freedom);
    for row in &rows {
        let w2 = row.weight * row.weight;
        for j in 0..degrees_of_freedom {
            for k in 0..degrees_of_freedom {
                normal[(j, k)] += w2 * row.design[j] * row.design[k];
            }
        }
    }

    let eigen = SymmetricEigen::new(normal.clone());
    if eigen.eigenvalues.iter().any(|&value| value <= 1e-12) {
        debug!("normal matrix is singular");
        event.zero_stats(true);
        event.zero_weights();
        return LocStatus::SingularMatrix;
    }

    // Covariance on the same subspace.
    let inverse_values = DMatrix::from_diagonal(&eigen.eigenvalues.map(|value| 1.0 / value));
    let covariance: DMatrix<f64> =
        &eigen.eigenvectors * inverse_values * eigen.eigenvectors.transpose();

    if (0..degrees_of_freedom).any(|j| covariance[(j, j)] <= 0.0) {
        event.zero_stats(true);
        event.zero_weights();
        return LocStatus::EllipsoidFailed;
    }

    event.se_latitude = covariance[(0, 0)].sqrt();
    event.se_longitude = covariance[(1, 1)].sqrt();
    event.se_depth = if degrees_of_freedom > 2 {
        covariance[(2, 2)].sqrt()
    } else {
        event.hypocenter.bayes.map(|b| b.spread / 3.0).unwrap_or(0.0)
    };

    // Error ellipsoid: covariance eigenstructure scaled to 90%
    // confidence.
    let f_factor = geo::f_90(degrees_of_freedom, num_rows - degrees_of_freedom);
    let cov_eigen = SymmetricEigen::new(covariance.clone());
    let mut axes: Vec<EllipseAxis> = Vec::with_capacity(3);
    for j in 0..degrees_of_freedom {
        let eigenvalue = cov_eigen.eigenvalues[j];
        if eigenvalue <= 0.0 {
            event.zero_stats(true);
            event.zero_weights();
            return LocStatus::EllipsoidFailed;
        }
        let vector = cov_eigen.eigenvectors.column(j);
        let south = vector[0];
        let east = vector[1];
        let down = if degrees_of_freedom > 2 { vector[2] } else { 0.0 };

        let mut azimuth = east.atan2(-south).to_degrees();
        if azimuth < 0.0 {
            azimuth += 360.0;
        }
        let plunge = down.atan2(south.hypot(east)).to_degrees();

        axes.push(EllipseAxis {
            semi_len: (f_factor * eigenvalue).sqrt(),
            azimuth,
            plunge,
        });
    }
    axes.sort_by(|a, b| b.semi_len.partial_cmp(&a.semi_len).unwrap_or(std::cmp::Ordering::Equal));
    let mut ellipsoid = [EllipseAxis::default(); 3];
    for (slot, axis) in ellipsoid.iter_mut().zip(axes.iter()) {
        *slot = *axis;
    }
    event.ellipsoid = ellipsoid;

    // Averaged horizontal radius from the epicentral sub-ellipse.
    let horizontal = covariance.view((0, 0), (2, 2)).into_owned();
    let horizontal_eigen = SymmetricEigen::new(horizontal);
    let f_horizontal = geo::f_90(2, num_rows - 2);
    let a = horizontal_eigen.eigenvalues[0].max(0.0);
    let b = horizontal_eigen.eigenvalues[1].max(0.0);
    event.error_avg_h = (f_horizontal * (a * b).sqrt()).sqrt();

    event.summarize_errors();

    // Data importances: the leverage of each observation on the
    // solution.
    let mut importance_total = 0.0;
    for row in &rows {
        let mut leverage = 0.0;
        for j in 0..degrees_of_freedom {
            for k in 0..degrees_of_freedom {
                leverage += row.design[j] * covariance[(j, k)] * row.design[k];
            }
        }
        leverage *= row.weight * row.weight;
        importance_total += leverage;
        if let ResidualSource::Phase(index) = row.source {
            if !event.use_decorrelation {
                event.picks[index].importance = leverage;
            }
        }
        if row.is_depth_prior() {
            event.bayes_importance = leverage.clamp(0.0, 1.0);
        }
    }
    if degrees_of_freedom == 2 {
        // A held depth is entirely prior-determined.
        event.bayes_importance = 1.0;
    }
    debug!(importance_total, "error statistics complete");

    LocStatus::Success
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::hypocenter::Hypocenter;
    use crate::models::wresidual::WeightedResidual;
    use approx::assert_relative_eq;

    fn event_with_design(rows: Vec<WeightedResidual>, degrees_of_freedom: usize) -> Event {
        let mut event = Event::new("synthetic", Hypocenter::new(0.0, 0.0, 0.0, 10.0));
        event.hypocenter.degrees_of_freedom = degrees_of_freedom;
        event.hypocenter.update_bayes(10.0, 9.0);
        event.residuals_raw = rows;
        event
    }

    fn well_conditioned_rows() -> Vec<WeightedResidual> {
        let designs: [[f64; 3]; 8] = [
            [0.08, 0.01, 0.02],
            [-0.05, 0.06, 0.03],
            [0.02, -0.07, 0.01],
            [0.06, 0.05, 0.02],
            [-0.04, -0.03, 0.04],
            [0.01, 0.08, 0.01],
            [-0.07, 0.02, 0.03],
            [0.03, -0.05, 0.02],
        ];
        let mut rows: Vec<WeightedResidual> = designs
            .iter()
            .enumerate()
            .map(|(j, d)| {
                WeightedResidual::new(ResidualSource::Phase(j), 0.3 * (j as f64 - 3.5), 1.0, *d)
            })
            .collect();
        rows.push(WeightedResidual::depth_prior(0.0, 1.0 / 3.0));
        rows
    }

    #[test]
    fn well_conditioned_system_yields_an_ellipsoid() {
        let rows = well_conditioned_rows();
        let mut event = event_with_design(rows, 3);
        // Real picks back the importance assignment.
        for j in 0..8 {
            event.picks.push(crate::models::pick::Pick::new(
                format!("{j}"),
                std::sync::Arc::new(crate::models::station::Station::new(
                    crate::models::station::StationId::new(format!("S{j}"), "XX", ""),
                    1.0,
                    1.0,
                    0.0,
                )),
                "BHZ",
                "US-NEIC",
                "auto",
                crate::models::pick::AuthorType::LocalAutomatic,
                0.0,
                0.5,
                1.0,
                true,
                "P",
                "",
            ));
        }

        let status = compute_errors(&mut event);
        assert_eq!(status, LocStatus::Success);
        assert!(event.ellipsoid[0].semi_len >= event.ellipsoid[1].semi_len);
        assert!(event.ellipsoid[1].semi_len >= event.ellipsoid[2].semi_len);
        assert!(event.se_latitude > 0.0);
        assert!(event.se_depth > 0.0);
        assert!(event.error_avg_h > 0.0);
        assert!((0.0..=1.0).contains(&event.bayes_importance));
        assert!(event.picks.iter().all(|p| p.importance >= 0.0));
    }

    #[test]
    fn degenerate_design_is_singular() {
        // Every design row identical: the normal matrix has rank one.
        let mut rows: Vec<WeightedResidual> = (0..5)
            .map(|j| WeightedResidual::new(ResidualSource::Phase(j), 0.1, 1.0, [0.05, 0.05, 0.01]))
            .collect();
        rows.push(WeightedResidual::depth_prior(0.0, 0.0));
        let mut event = event_with_design(rows, 3);

        let status = compute_errors(&mut event);
        assert_eq!(status, LocStatus::SingularMatrix);
        assert_eq!(event.se_latitude, 0.0);
        assert_eq!(event.ellipsoid[0].semi_len, 0.0);
    }

    #[test]
    fn dominant_prior_has_high_depth_importance() {
        // A tight prior against weak pick depth sensitivity.
        let designs: [[f64; 3]; 6] = [
            [0.08, 0.01, 0.001],
            [-0.05, 0.06, 0.001],
            [0.02, -0.07, 0.002],
            [0.06, 0.05, 0.001],
            [-0.04, -0.03, 0.002],
            [0.01, 0.08, 0.001],
        ];
        let mut rows: Vec<WeightedResidual> = designs
            .iter()
            .enumerate()
            .map(|(j, d)| WeightedResidual::new(ResidualSource::Phase(j), 0.1, 1.0, *d))
            .collect();
        // Spread 3 km gives the virtual pick weight 1.
        rows.push(WeightedResidual::depth_prior(0.0, 1.0));
        let mut event = event_with_design(rows, 3);
        event.use_decorrelation = true;
        event.residuals_projected = event.residuals_raw.clone();

        let status = compute_errors(&mut event);
        assert_eq!(status, LocStatus::Success);
        assert!(event.bayes_importance > 0.5);
    }

    #[test]
    fn held_depth_uses_the_prior_spread() {
        let rows = well_conditioned_rows();
        let mut event = event_with_design(rows, 2);
        let status = compute_errors(&mut event);
        assert_eq!(status, LocStatus::Success);
        assert_relative_eq!(event.se_depth, 3.0);
        assert_relative_eq!(event.bayes_importance, 1.0);
    }
}
