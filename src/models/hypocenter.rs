//! Hypocenter state and its iteration bookkeeping.

use crate::geo::{self, TrigCache};
use crate::models::audit::HypoAudit;

/// Bayesian depth prior attached to a hypocenter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthPrior {
    /// Prior depth in kilometers
    pub depth: f64,
    /// Spread in kilometers, treated as a 90th percentile
    pub spread: f64,
}

impl DepthPrior {
    /// Weight of the virtual depth observation.
    pub fn weight(&self) -> f64 {
        3.0 / self.spread
    }
}

/// All the data for one hypocenter, including the geometry caches and the
/// iteration state of the rank-sum-estimator steps.
#[derive(Debug, Clone)]
pub struct Hypocenter {
    /// Origin time in seconds since the epoch
    pub origin_time: f64,
    /// Geographic latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Depth in kilometers, clamped to the legal range
    pub depth: f64,
    /// Bayesian depth prior, if any
    pub bayes: Option<DepthPrior>,
    /// Degrees of freedom: 2 with a held depth, 3 otherwise
    pub degrees_of_freedom: usize,
    /// Geocentric colatitude in degrees
    pub colatitude: f64,
    trig: TrigCache,
    // Iteration state
    pub step_length: f64,
    /// Horizontal (tangential) component of the last step in km
    pub del_h: f64,
    /// Vertical component of the last step in km
    pub del_z: f64,
    pub damping_count: usize,
    /// Linear estimate of the origin-time shift in seconds
    pub time_shift: f64,
    /// Reference rank-sum-estimator dispersion
    pub dispersion: f64,
    /// Least-squares-equivalent RMS of the dispersion
    pub rms: f64,
    /// Local Cartesian unit step direction (colatitude, longitude, depth)
    pub step_direction: [f64; 3],
}

impl Hypocenter {
    /// Initialize a hypocenter with enough information to start a
    /// location pass.
    pub fn new(origin_time: f64, latitude: f64, longitude: f64, depth: f64) -> Self {
        let depth = depth.clamp(geo::DEPTH_MIN, geo::DEPTH_MAX);
        let colatitude = geo::geocentric_colatitude(latitude);
        Self {
            origin_time,
            latitude,
            longitude,
            depth,
            bayes: None,
            degrees_of_freedom: 3,
            colatitude,
            trig: TrigCache::new(colatitude, longitude),
            step_length: 0.0,
            del_h: 0.0,
            del_z: 0.0,
            damping_count: 0,
            time_shift: 0.0,
            dispersion: 0.0,
            rms: 0.0,
            step_direction: [0.0; 3],
        }
    }

    pub fn trig(&self) -> &TrigCache {
        &self.trig
    }

    /// Residual of the Bayesian depth virtual observation in kilometers.
    pub fn depth_residual(&self) -> f64 {
        self.bayes.map(|b| b.depth - self.depth).unwrap_or(0.0)
    }

    /// Weight of the Bayesian depth virtual observation.
    pub fn depth_weight(&self) -> f64 {
        self.bayes.map(|b| b.weight()).unwrap_or(0.0)
    }

    /// Set an analyst-requested Bayesian depth. This also forces the
    /// starting depth to the prior.
    pub fn add_analyst_bayes(&mut self, depth: f64, spread: f64) {
        let depth = depth.clamp(geo::DEPTH_MIN, geo::DEPTH_MAX);
        self.bayes = Some(DepthPrior { depth, spread });
        self.update(self.origin_time, self.latitude, self.longitude, depth);
    }

    /// Update the Bayesian depth from the zone statistics (when it was
    /// not set by an analyst).
    pub fn update_bayes(&mut self, depth: f64, spread: f64) {
        self.bayes = Some(DepthPrior { depth, spread });
    }

    /// Set the number of degrees of freedom to be determined.
    pub fn set_degrees_of_freedom(&mut self, held_depth: bool) {
        self.degrees_of_freedom = if held_depth { 2 } else { 3 };
    }

    /// Update the hypocentral parameters and recompute the trig caches.
    pub fn update(&mut self, origin_time: f64, latitude: f64, longitude: f64, depth: f64) {
        self.origin_time = origin_time;
        self.latitude = latitude;
        self.longitude = longitude;
        self.depth = depth.clamp(geo::DEPTH_MIN, geo::DEPTH_MAX);
        self.colatitude = geo::geocentric_colatitude(latitude);
        self.trig = TrigCache::new(self.colatitude, self.longitude);
    }

    /// Move the hypocenter along the stored unit direction by the
    /// linearized optimal step and shift the origin time.
    pub fn step(&mut self, step_length: f64, time_shift: f64) {
        self.step_length = step_length;
        self.origin_time += time_shift;

        self.del_h = ((step_length * self.step_direction[0]).powi(2)
            + (step_length * self.step_direction[1]).powi(2))
        .sqrt();

        self.colatitude += step_length * self.step_direction[0] / geo::DEG2KM;
        self.longitude +=
            step_length * self.step_direction[1] / (geo::DEG2KM * self.trig.sin_colat);

        // Wrap over the poles.
        if self.colatitude < 0.0 {
            self.colatitude = -self.colatitude;
            self.longitude += 180.0;
        } else if self.colatitude > 180.0 {
            self.colatitude = 360.0 - self.colatitude;
            self.longitude += 180.0;
        }
        // Normalize the longitude to (-180, 180].
        if self.longitude <= -180.0 {
            self.longitude += 360.0;
        } else if self.longitude > 180.0 {
            self.longitude -= 360.0;
        }

        if self.degrees_of_freedom > 2 {
            let new_depth = (self.depth + step_length * self.step_direction[2])
                .clamp(geo::DEPTH_MIN, geo::DEPTH_MAX);
            self.del_z = new_depth - self.depth;
            self.depth = new_depth;
        }

        self.latitude = geo::geographic_latitude(self.colatitude);
        self.trig = TrigCache::new(self.colatitude, self.longitude);
    }

    /// Shift only the origin time.
    pub fn shift_origin(&mut self, time_shift: f64) {
        self.origin_time += time_shift;
    }

    /// Restore the four primary coordinates from an audit record (used
    /// for step-length damping).
    pub fn reset_to(&mut self, audit: &HypoAudit) {
        self.update(audit.origin_time, audit.latitude, audit.longitude, audit.depth);
    }

    /// True when two solutions agree within the iteration tolerances.
    pub fn matches(&self, audit: &HypoAudit) -> bool {
        (self.origin_time - audit.origin_time).abs() < 0.01
            && (self.latitude - audit.latitude).abs() < 1e-4
            && (self.longitude - audit.longitude).abs() < 1e-4
            && (self.depth - audit.depth).abs() < 0.01
    }
}

impl std::fmt::Display for Hypocenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:14.3} {:8.4} {:9.4} {:6.2}",
            self.origin_time, self.latitude, self.longitude, self.depth
        )
    }
}
