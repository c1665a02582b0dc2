//! Table-driven travel-time model loaded from model files.
//!
//! Tables are rectangular (depth x distance) grids of travel times per
//! phase with per-distance spreads and observabilities; arrivals are
//! produced by bilinear interpolation and numerical derivatives. Parsed
//! models are kept in a process-wide read-mostly cache.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{LocatorError, Result};
use crate::traveltime::phases;
use crate::traveltime::{TravelTimeModel, TtArrival};

/// One phase's travel-time grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTable {
    pub code: String,
    /// Distance knots in degrees, ascending
    pub distances: Vec<f64>,
    /// Travel times in seconds, indexed `[depth][distance]`; `null`
    /// where the phase does not exist
    pub times: Vec<Vec<Option<f64>>>,
    /// Spread in seconds per distance knot
    pub spreads: Vec<f64>,
    /// Observability per distance knot
    pub observabilities: Vec<f64>,
    /// Distance range (degrees) where the phase is routinely observed
    pub observed_range: (f64, f64),
}

/// A serialized travel-time model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableModel {
    pub name: String,
    /// Depth knots in kilometers, ascending
    pub depths: Vec<f64>,
    pub phases: Vec<PhaseTable>,
    /// Elevation velocity for the station correction in km/s
    #[serde(default = "default_elevation_velocity")]
    pub elevation_velocity: f64,
}

fn default_elevation_velocity() -> f64 {
    5.8
}

/// Linear interpolation helpers over a sorted knot vector.
fn bracket(knots: &[f64], value: f64) -> Option<(usize, f64)> {
    if knots.len() < 2 || value < knots[0] || value > *knots.last().unwrap() {
        return None;
    }
    let j = match knots.binary_search_by(|k| k.partial_cmp(&value).unwrap()) {
        Ok(j) => j.min(knots.len() - 2),
        Err(j) => (j - 1).min(knots.len() - 2),
    };
    let frac = (value - knots[j]) / (knots[j + 1] - knots[j]);
    Some((j, frac))
}

fn lerp(a: f64, b: f64, frac: f64) -> f64 {
    a + frac * (b - a)
}

impl PhaseTable {
    /// Bilinear travel time, requiring all four surrounding grid values.
    fn time_at(&self, depths: &[f64], depth: f64, delta: f64) -> Option<f64> {
        let (iz, fz) = bracket(depths, depth)?;
        let (id, fd) = bracket(&self.distances, delta)?;
        let t00 = self.times.get(iz)?.get(id).copied()??;
        let t01 = self.times.get(iz)?.get(id + 1).copied()??;
        let t10 = self.times.get(iz + 1)?.get(id).copied()??;
        let t11 = self.times.get(iz + 1)?.get(id + 1).copied()??;
        Some(lerp(lerp(t00, t01, fd), lerp(t10, t11, fd), fz))
    }

    fn spread_at(&self, delta: f64) -> f64 {
        match bracket(&self.distances, delta) {
            Some((id, fd)) => lerp(self.spreads[id], self.spreads[id + 1], fd),
            None => self.spreads.last().copied().unwrap_or(2.0),
        }
    }

    fn observability_at(&self, delta: f64) -> f64 {
        match bracket(&self.distances, delta) {
            Some((id, fd)) => lerp(self.observabilities[id], self.observabilities[id + 1], fd),
            None => 0.0,
        }
    }
}

impl TableModel {
    /// Parse a model from its JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let model: TableModel = serde_json::from_str(text)?;
        if model.depths.len() < 2 {
            return Err(LocatorError::ModelData(format!(
                "model {} needs at least two depth knots",
                model.name
            )));
        }
        for phase in &model.phases {
            if phase.times.len() != model.depths.len() {
                return Err(LocatorError::ModelData(format!(
                    "phase {} rows do not match the depth knots",
                    phase.code
                )));
            }
            for row in &phase.times {
                if row.len() != phase.distances.len() {
                    return Err(LocatorError::ModelData(format!(
                        "phase {} columns do not match the distance knots",
                        phase.code
                    )));
                }
            }
        }
        Ok(model)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

impl TravelTimeModel for TableModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn depth_range(&self) -> (f64, f64) {
        (self.depths[0], *self.depths.last().unwrap())
    }

    fn arrivals(&self, depth: f64, delta: f64, elevation: f64, _is_tectonic: bool) -> Vec<TtArrival> {
        let elevation_delay = elevation / self.elevation_velocity;
        let mut arrivals = Vec::new();

        for phase in &self.phases {
            let Some(tt) = phase.time_at(&self.depths, depth, delta) else {
                continue;
            };
            // Numerical derivatives; one-sided at the grid edges.
            let dd = 0.05;
            let dtdd = match (
                phase.time_at(&self.depths, depth, delta + dd),
                phase.time_at(&self.depths, depth, delta - dd),
            ) {
                (Some(plus), Some(minus)) => (plus - minus) / (2.0 * dd),
                (Some(plus), None) => (plus - tt) / dd,
                (None, Some(minus)) => (tt - minus) / dd,
                (None, None) => 0.0,
            };
            let dz = 1.0;
            let dtdz = match (
                phase.time_at(&self.depths, depth + dz, delta),
                phase.time_at(&self.depths, depth - dz, delta),
            ) {
                (Some(plus), Some(minus)) => (plus - minus) / (2.0 * dz),
                (Some(plus), None) => (plus - tt) / dz,
                (None, Some(minus)) => (tt - minus) / dz,
                (None, None) => 0.0,
            };

            let group = phases::group_of(&phase.code);
            arrivals.push(TtArrival {
                phase: phase.code.clone(),
                tt: tt + elevation_delay,
                spread: phase.spread_at(delta),
                observability: phase.observability_at(delta),
                dtdd,
                dtdz,
                group,
                aux_group: phases::aux_group_of(group),
                is_regional: phases::is_regional(&phase.code),
                is_dist_discriminated: delta < phase.observed_range.0
                    || delta > phase.observed_range.1,
            });
        }
        arrivals
    }
}

/// Load a travel-time model by name, going through the process-wide
/// cache. The model file is `<model_path>/<earth_model>.ttmodel.json`;
/// when it is missing the built-in synthetic model is substituted so that
/// the locator still runs without installed tables.
pub fn load_model(model_path: &Path, earth_model: &str) -> Result<Arc<dyn TravelTimeModel>> {
    static CACHE: RwLock<Option<HashMap<String, Arc<dyn TravelTimeModel>>>> = RwLock::new(None);

    let file = model_path.join(format!("{earth_model}.ttmodel.json"));
    let key = file.display().to_string();

    {
        let cache = CACHE.read();
        if let Some(found) = cache.as_ref().and_then(|map| map.get(&key)) {
            return Ok(found.clone());
        }
    }

    let mut cache = CACHE.write();
    let map = cache.get_or_insert_with(HashMap::new);
    if let Some(found) = map.get(&key) {
        return Ok(found.clone());
    }

    let model: Arc<dyn TravelTimeModel> = if file.exists() {
        info!(file = %file.display(), "loading travel-time tables");
        Arc::new(TableModel::read(&file)?)
    } else {
        info!(model = earth_model, "no travel-time tables found, using the synthetic model");
        Arc::new(crate::traveltime::synthetic::SyntheticModel::new())
    };
    map.insert(key, model.clone());
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn test_model() -> TableModel {
        TableModel {
            name: "test".into(),
            depths: vec![0.0, 100.0],
            phases: vec![PhaseTable {
                code: "P".into(),
                distances: vec![0.0, 10.0, 20.0],
                times: vec![
                    vec![Some(0.0), Some(140.0), Some(280.0)],
                    vec![Some(14.0), Some(145.0), Some(283.0)],
                ],
                spreads: vec![1.0, 1.2, 1.6],
                observabilities: vec![100.0, 80.0, 60.0],
                observed_range: (0.0, 15.0),
            }],
            elevation_velocity: 5.8,
        }
    }

    #[test]
    fn bilinear_interpolation() {
        let model = test_model();
        let arrivals = model.arrivals(50.0, 5.0, 0.0, true);
        assert_eq!(arrivals.len(), 1);
        // Halfway in depth and distance of the corner values.
        let expected = ((0.0 + 140.0) / 2.0 + (14.0 + 145.0) / 2.0) / 2.0;
        assert_relative_eq!(arrivals[0].tt, expected, epsilon = 1e-9);
        assert!(arrivals[0].dtdd > 0.0);
    }

    #[test]
    fn outside_the_grid_yields_nothing() {
        let model = test_model();
        assert!(model.arrivals(50.0, 25.0, 0.0, true).is_empty());
    }

    #[test]
    fn distance_discrimination_flag() {
        let model = test_model();
        let near = model.arrivals(50.0, 5.0, 0.0, true);
        assert!(!near[0].is_dist_discriminated);
        let far = model.arrivals(50.0, 18.0, 0.0, true);
        assert!(far[0].is_dist_discriminated);
    }

    #[test]
    fn from_json_validates_grid_shape() {
        let bad = r#"{
            "name": "bad",
            "depths": [0.0, 100.0],
            "phases": [{
                "code": "P",
                "distances": [0.0, 10.0],
                "times": [[0.0, 140.0]],
                "spreads": [1.0, 1.2],
                "observabilities": [100.0, 80.0],
                "observed_range": [0.0, 15.0]
            }]
        }"#;
        assert!(TableModel::from_json(bad).is_err());
    }
}
