//! The travel-time service the location engine consumes.
//!
//! A [`TravelTimeModel`] turns (source depth, epicentral distance,
//! station elevation) into an ordered list of theoretical arrivals. The
//! engine talks to it through a per-engine [`Session`] that tracks the
//! source depth and tectonic flag and enforces the legal depth range.

pub mod phases;
pub mod synthetic;
pub mod tables;

use std::sync::Arc;

use crate::error::{LocatorError, Result};
use crate::geo;

/// One theoretical arrival at a station.
#[derive(Debug, Clone)]
pub struct TtArrival {
    pub phase: String,
    /// Travel time in seconds
    pub tt: f64,
    /// Statistical spread of the arrival in seconds
    pub spread: f64,
    /// Relative observation frequency of the phase at this distance
    pub observability: f64,
    /// dT/dDelta in seconds per degree
    pub dtdd: f64,
    /// dT/dDepth in seconds per kilometer
    pub dtdz: f64,
    pub group: &'static str,
    pub aux_group: Option<&'static str>,
    pub is_regional: bool,
    /// True when the phase should not be observable at this distance
    pub is_dist_discriminated: bool,
}

impl TtArrival {
    /// Half-width of the association window around the arrival. Wide
    /// enough to survive the mislocation of a starting hypocenter.
    pub fn window(&self) -> f64 {
        (3.0 * self.spread).max(5.0)
    }
}

/// A travel-time model: the external service the engine consumes.
///
/// Implementations must be reentrant; they are shared across engines
/// behind an `Arc`.
pub trait TravelTimeModel: Send + Sync {
    fn name(&self) -> &str;

    /// Legal source depth range in kilometers.
    fn depth_range(&self) -> (f64, f64);

    /// Theoretical arrivals for a source at `depth` seen at distance
    /// `delta` and station elevation `elevation`, ordered by travel time.
    fn arrivals(&self, depth: f64, delta: f64, elevation: f64, is_tectonic: bool) -> Vec<TtArrival>;
}

/// Per-engine travel-time session.
///
/// Holds the source depth and tectonic flag the arrivals are computed
/// for; [`Session::configure`] rebuilds the session when the depth moves
/// beyond [`geo::SESSION_DEPTH_TOLERANCE`] or the tectonic flag changes,
/// and rejects depths outside the model's tables.
pub struct Session {
    model: Arc<dyn TravelTimeModel>,
    depth: f64,
    is_tectonic: bool,
    configured: bool,
}

impl Session {
    pub fn new(model: Arc<dyn TravelTimeModel>) -> Self {
        Self {
            model,
            depth: f64::NAN,
            is_tectonic: true,
            configured: false,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// (Re)configure the session for a source depth and tectonic flag.
    pub fn configure(&mut self, depth: f64, is_tectonic: bool) -> Result<()> {
        let (min_depth, max_depth) = self.model.depth_range();
        if depth < min_depth || depth > max_depth {
            return Err(LocatorError::BadDepth(depth));
        }
        if !self.configured
            || (depth - self.depth).abs() > geo::SESSION_DEPTH_TOLERANCE
            || is_tectonic != self.is_tectonic
        {
            self.depth = depth;
            self.is_tectonic = is_tectonic;
            self.configured = true;
        }
        Ok(())
    }

    /// Theoretical arrivals at one station, ordered by travel time.
    pub fn arrivals(&self, delta: f64, elevation: f64) -> Vec<TtArrival> {
        debug_assert!(self.configured, "session used before configure");
        let mut arrivals = self
            .model
            .arrivals(self.depth, delta, elevation, self.is_tectonic);
        arrivals.sort_by(|a, b| a.tt.partial_cmp(&b.tt).unwrap_or(std::cmp::Ordering::Equal));
        arrivals
    }

    /// The depth the session is currently configured for.
    pub fn depth(&self) -> f64 {
        self.depth
    }

    /// Legal source depth range of the underlying model.
    pub fn depth_range(&self) -> (f64, f64) {
        self.model.depth_range()
    }
}
