//! The location engine: rank-sum estimation, decorrelation, phase
//! identification, the step controller, and the staged location loop.

pub mod decorrelator;
pub mod ellipsoid;
pub mod estimator;
pub mod initial_id;
pub mod linear_step;
pub mod locator;
pub mod phase_id;
pub mod stepper;

pub use locator::Locator;
pub use stepper::Stepper;

/// Figure-of-merit and convergence controls for one stage of the outer
/// location loop.
#[derive(Debug, Clone, Copy)]
pub struct StageConfig {
    /// Weight for phases matching neither the current identification nor
    /// its group; higher makes changing to an "other" phase easier
    pub other_weight: f64,
    /// Weight for an exact match with the current identification; higher
    /// makes changing it harder
    pub sticky_weight: f64,
    /// Run the full re-identification (false: keep identifications)
    pub reidentify: bool,
    /// Refresh the residual weights from the phase spreads
    pub reweight: bool,
    /// Convergence limit on the step length in kilometers
    pub convergence_limit: f64,
    /// Cap on a single step length in kilometers
    pub max_step_length: f64,
    pub max_iterations: usize,
}

/// The stage table: stage 0 refines the origin time with aggressive
/// re-identification, the middle stages tighten with identifications
/// increasingly frozen, and the final stage polishes for the error
/// statistics.
pub const STAGES: [StageConfig; 4] = [
    StageConfig {
        other_weight: 0.1,
        sticky_weight: 1.0,
        reidentify: true,
        reweight: true,
        convergence_limit: 1.0,
        max_step_length: 200.0,
        max_iterations: 15,
    },
    StageConfig {
        other_weight: 0.05,
        sticky_weight: 2.0,
        reidentify: true,
        reweight: true,
        convergence_limit: 0.5,
        max_step_length: 100.0,
        max_iterations: 20,
    },
    StageConfig {
        other_weight: 0.01,
        sticky_weight: 5.0,
        reidentify: false,
        reweight: true,
        convergence_limit: 0.1,
        max_step_length: 50.0,
        max_iterations: 25,
    },
    StageConfig {
        other_weight: 0.01,
        sticky_weight: 10.0,
        reidentify: false,
        reweight: false,
        convergence_limit: 0.05,
        max_step_length: 20.0,
        max_iterations: 30,
    },
];

/// Relative dispersion change treated as stagnation by the outer loop.
pub const DISPERSION_TOLERANCE: f64 = 1e-4;
