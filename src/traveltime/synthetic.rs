//! A built-in synthetic travel-time model.
//!
//! A layered-crust-over-mantle approximation with analytic travel times
//! and derivatives. It is not a substitute for real tables, but it gives
//! the locator a self-consistent collaborator when no model files are
//! installed, and it drives the integration tests.

use crate::geo;
use crate::traveltime::phases;
use crate::traveltime::{TravelTimeModel, TtArrival};

/// Straight-ray body-wave time through a medium of velocity `v` km/s.
fn body_wave(delta: f64, depth: f64, velocity: f64) -> (f64, f64, f64) {
    let range = delta * geo::DEG2KM;
    let slant = range.hypot(depth).max(1e-6);
    let tt = slant / velocity;
    let dtdd = range / (slant * velocity) * geo::DEG2KM;
    let dtdz = depth / (slant * velocity);
    (tt, dtdd, dtdz)
}

/// Head-wave time with an intercept: t = range/v + intercept + depth/v.
fn head_wave(delta: f64, depth: f64, velocity: f64, intercept: f64) -> (f64, f64, f64) {
    let range = delta * geo::DEG2KM;
    let tt = range / velocity + intercept + depth / velocity;
    (tt, geo::DEG2KM / velocity, 1.0 / velocity)
}

struct PhaseSpec {
    code: &'static str,
    spread: f64,
    observability: f64,
    /// Distance range (degrees) where the phase is routinely observed
    observed: (f64, f64),
    /// Distance range (degrees) where a time exists at all
    exists: (f64, f64),
}

const PHASES: [PhaseSpec; 6] = [
    PhaseSpec { code: "P", spread: 1.0, observability: 1000.0, observed: (0.0, 100.0), exists: (0.0, 118.0) },
    PhaseSpec { code: "Pg", spread: 1.5, observability: 50.0, observed: (0.0, 8.0), exists: (0.0, 10.0) },
    PhaseSpec { code: "Pn", spread: 1.5, observability: 80.0, observed: (1.5, 18.0), exists: (1.0, 25.0) },
    PhaseSpec { code: "S", spread: 2.5, observability: 350.0, observed: (0.0, 85.0), exists: (0.0, 100.0) },
    PhaseSpec { code: "Sn", spread: 2.5, observability: 40.0, observed: (1.5, 16.0), exists: (1.0, 22.0) },
    PhaseSpec { code: "Lg", spread: 3.5, observability: 25.0, observed: (1.0, 20.0), exists: (0.5, 25.0) },
];

/// The synthetic model.
pub struct SyntheticModel {
    name: String,
}

impl SyntheticModel {
    pub fn new() -> Self {
        Self {
            name: "synthetic".to_string(),
        }
    }

    fn times(code: &str, delta: f64, depth: f64) -> (f64, f64, f64) {
        match code {
            "P" => body_wave(delta, depth, 7.9),
            "Pg" => body_wave(delta, depth, 6.0),
            "Pn" => head_wave(delta, depth, 8.04, 8.0),
            "S" => body_wave(delta, depth, 4.4),
            "Sn" => head_wave(delta, depth, 4.6, 12.0),
            // Surface-guided: no depth dependence.
            _ => {
                let (tt, dtdd, _) = head_wave(delta, 0.0, 3.5, 1.0);
                (tt, dtdd, 0.0)
            }
        }
    }
}

impl Default for SyntheticModel {
    fn default() -> Self {
        Self::new()
    }
}

impl TravelTimeModel for SyntheticModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn depth_range(&self) -> (f64, f64) {
        (0.0, geo::DEPTH_MAX)
    }

    fn arrivals(&self, depth: f64, delta: f64, elevation: f64, is_tectonic: bool) -> Vec<TtArrival> {
        // A station above sea level sees the wavefront a touch later.
        let elevation_delay = elevation / 5.8;

        let mut arrivals = Vec::new();
        for spec in &PHASES {
            if delta < spec.exists.0 || delta > spec.exists.1 {
                continue;
            }
            // Crustal shear energy dies quickly outside stable regions.
            if spec.code == "Lg" && is_tectonic && delta > 12.0 {
                continue;
            }
            let (tt, dtdd, dtdz) = Self::times(spec.code, delta, depth);
            let group = phases::group_of(spec.code);
            arrivals.push(TtArrival {
                phase: spec.code.to_string(),
                tt: tt + elevation_delay,
                spread: spec.spread,
                observability: spec.observability,
                dtdd,
                dtdz,
                group,
                aux_group: phases::aux_group_of(group),
                is_regional: phases::is_regional(spec.code),
                is_dist_discriminated: delta < spec.observed.0 || delta > spec.observed.1,
            });
        }
        arrivals
    }
}
