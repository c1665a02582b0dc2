//! Decorrelation of the weighted residuals.
//!
//! Nearby stations see correlated residuals (shared path effects), which
//! biases the rank-sum estimator. The decorrelator estimates a residual
//! covariance from the station geometry, eigendecomposes it, and projects
//! the weighted residuals onto the leading eigenvectors. The projected
//! vector feeds the same estimator operations as the raw one.

use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::geo;
use crate::models::event::Event;
use crate::models::wresidual::{ResidualSource, WeightedResidual};

/// Correlation length of the station-geometry covariance in degrees.
const CORRELATION_LENGTH: f64 = 10.0;

/// Uncorrelated noise added on the covariance diagonal.
const NOISE_VARIANCE: f64 = 0.25;

/// The decorrelator: covariance estimate and projection of the raw
/// residual vector. One instance per engine.
pub struct Decorrelator {
    coverage: f64,
    eigenvalues: Vec<f64>,
    /// Retained eigenvectors as columns, `num_rows x retained`
    eigenvectors: DMatrix<f64>,
    num_rows: usize,
}

impl Decorrelator {
    pub fn new() -> Self {
        Self::with_coverage(geo::COVARIANCE_COVERAGE)
    }

    /// Override the eigenvalue coverage fraction (1.0 retains the full
    /// basis).
    pub fn with_coverage(coverage: f64) -> Self {
        Self {
            coverage,
            eigenvalues: Vec::new(),
            eigenvectors: DMatrix::zeros(0, 0),
            num_rows: 0,
        }
    }

    /// Number of projected components currently retained.
    pub fn retained(&self) -> usize {
        self.eigenvalues.len()
    }

    /// Estimate the covariance of the saved raw residuals and keep the
    /// leading eigenvectors covering [`Self::coverage`] of the trace.
    pub fn decorrelate(&mut self, event: &Event) {
        let phase_rows: Vec<&WeightedResidual> = event
            .residuals_original
            .iter()
            .filter(|row| !row.is_depth_prior())
            .collect();
        let n = phase_rows.len();
        self.num_rows = n;
        if n == 0 {
            self.eigenvalues.clear();
            self.eigenvectors = DMatrix::zeros(0, 0);
            return;
        }

        let mut covariance = DMatrix::zeros(n, n);
        for j in 0..n {
            for k in j..n {
                let value = if j == k {
                    1.0 + NOISE_VARIANCE
                } else {
                    correlation(event, phase_rows[j], phase_rows[k])
                };
                covariance[(j, k)] = value;
                covariance[(k, j)] = value;
            }
        }

        let eigen = SymmetricEigen::new(covariance);
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            eigen.eigenvalues[b]
                .partial_cmp(&eigen.eigenvalues[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let total: f64 = eigen.eigenvalues.iter().filter(|&&v| v > 0.0).sum();
        let target = self.coverage * total;
        let mut kept: Vec<usize> = Vec::new();
        let mut accumulated = 0.0;
        for &index in &order {
            let value = eigen.eigenvalues[index];
            if value <= 1e-12 {
                break;
            }
            kept.push(index);
            accumulated += value;
            if accumulated >= target {
                break;
            }
        }

        self.eigenvalues = kept.iter().map(|&i| eigen.eigenvalues[i]).collect();
        let mut vectors = DMatrix::zeros(n, kept.len());
        for (column, &index) in kept.iter().enumerate() {
            vectors.set_column(column, &eigen.eigenvectors.column(index));
        }
        self.eigenvectors = vectors;
    }

    /// Produce the projected weighted-residual vector from the saved raw
    /// one. Component j carries residual uⱼᵀ(w∘r)/√λⱼ with weight √λⱼ,
    /// so full-rank projection preserves the weighted residual energy.
    /// The depth prior is re-appended unchanged as the final entry.
    pub fn project(&mut self, event: &mut Event) {
        let phase_rows: Vec<WeightedResidual> = event
            .residuals_original
            .iter()
            .filter(|row| !row.is_depth_prior())
            .cloned()
            .collect();
        if phase_rows.len() != self.num_rows {
            self.decorrelate(event);
        }
        let n = self.num_rows;

        let weighted_residuals =
            DVector::from_iterator(n, phase_rows.iter().map(|row| row.weight * row.residual));
        let weighted_design: Vec<DVector<f64>> = (0..3)
            .map(|column| {
                DVector::from_iterator(
                    n,
                    phase_rows.iter().map(|row| row.weight * row.design[column]),
                )
            })
            .collect();

        event.residuals_projected.clear();
        for (j, &eigenvalue) in self.eigenvalues.iter().enumerate() {
            let basis = self.eigenvectors.column(j);
            let scale = eigenvalue.sqrt();
            let residual = basis.dot(&weighted_residuals) / scale;
            let design = [
                basis.dot(&weighted_design[0]) / scale,
                basis.dot(&weighted_design[1]) / scale,
                basis.dot(&weighted_design[2]) / scale,
            ];
            event.residuals_projected.push(WeightedResidual::new(
                ResidualSource::Phase(j),
                residual,
                scale,
                design,
            ));
        }

        event.projected_phases_used = event.residuals_projected.len();
        if let Some(prior) = event
            .residuals_original
            .iter()
            .find(|row| row.is_depth_prior())
        {
            event.residuals_projected.push(prior.clone());
        }
    }
}

impl Default for Decorrelator {
    fn default() -> Self {
        Self::new()
    }
}

/// Correlation between two residuals: Gaussian in the station separation
/// for arrivals of the same type, zero across P/S types.
fn correlation(event: &Event, a: &WeightedResidual, b: &WeightedResidual) -> f64 {
    let (ResidualSource::Phase(i), ResidualSource::Phase(j)) = (a.source, b.source) else {
        return 0.0;
    };
    let pick_a = &event.picks[i];
    let pick_b = &event.picks[j];

    if geo::is_p_type(pick_a.best_code()) != geo::is_p_type(pick_b.best_code()) {
        return 0.0;
    }
    let (separation, _) = geo::delta_azimuth(pick_a.station.trig(), pick_b.station.trig());
    (-(separation / CORRELATION_LENGTH).powi(2)).exp()
}
