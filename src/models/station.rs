//! Seismic stations and their identifiers.

use serde::{Deserialize, Serialize};

use crate::geo::{self, TrigCache};

/// Unique station identifier: station code, network, and location code.
///
/// The ordering (station, network, location) gives the deterministic
/// station iteration the engine relies on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StationId {
    pub station: String,
    pub network: String,
    pub location: String,
}

impl StationId {
    pub fn new(
        station: impl Into<String>,
        network: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            station: station.into(),
            network: network.into(),
            location: location.into(),
        }
    }
}

impl std::fmt::Display for StationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.station, self.network, self.location)
    }
}

/// One seismic station. Immutable after intake; the geocentric trig cache
/// is precomputed so distance/azimuth updates never redo trigonometry.
#[derive(Debug, Clone)]
pub struct Station {
    pub id: StationId,
    /// Geographic latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Elevation in kilometers
    pub elevation: f64,
    trig: TrigCache,
}

impl Station {
    pub fn new(id: StationId, latitude: f64, longitude: f64, elevation: f64) -> Self {
        let colatitude = geo::geocentric_colatitude(latitude);
        Self {
            id,
            latitude,
            longitude,
            elevation,
            trig: TrigCache::new(colatitude, longitude),
        }
    }

    pub fn trig(&self) -> &TrigCache {
        &self.trig
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn station_ids_order_by_station_then_network() {
        let a = StationId::new("AAK", "II", "00");
        let b = StationId::new("AAK", "IU", "00");
        let c = StationId::new("ANMO", "IU", "00");
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn station_precomputes_trig() {
        let station = Station::new(StationId::new("DUG", "US", ""), 40.195, -112.813, 1.477);
        let trig = station.trig();
        assert!((trig.sin_colat.powi(2) + trig.cos_colat.powi(2) - 1.0).abs() < 1e-15);
    }
}
