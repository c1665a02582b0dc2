//! JSON location request and result types, and their conversion to and
//! from the domain event.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{LocatorError, Result};
use crate::geo;
use crate::models::event::Event;
use crate::models::hypocenter::Hypocenter;
use crate::models::pick::{AuthorType, Pick};
use crate::models::station::{Station, StationId};

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    "ak135".to_string()
}

fn default_affinity() -> f64 {
    geo::NULL_AFFINITY
}

/// Station/channel geometry of one pick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub station: String,
    #[serde(default)]
    pub channel: String,
    pub network: String,
    #[serde(default)]
    pub location: String,
    /// Station latitude in degrees
    pub latitude: f64,
    /// Station longitude in degrees
    pub longitude: f64,
    /// Station elevation in kilometers
    #[serde(default)]
    pub elevation: f64,
}

/// Who contributed a pick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    #[serde(rename = "agencyID", default)]
    pub agency_id: String,
    #[serde(default)]
    pub author: String,
    /// One of ContributedAutomatic, LocalAutomatic, ContributedHuman,
    /// LocalHuman
    #[serde(rename = "type", default)]
    pub author_type: String,
}

/// One pick of the location request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputPick {
    #[serde(default)]
    pub id: String,
    pub site: Site,
    pub source: SourceInfo,
    /// Arrival time in epoch milliseconds
    pub time: i64,
    #[serde(default)]
    pub located_phase: String,
    #[serde(default)]
    pub associated_phase: String,
    #[serde(rename = "use", default = "default_true")]
    pub use_flag: bool,
    #[serde(default)]
    pub quality: f64,
    #[serde(default = "default_affinity")]
    pub affinity: f64,
}

/// A location request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRequest {
    /// Starting origin time in epoch milliseconds
    pub source_origin_time: i64,
    pub source_latitude: f64,
    pub source_longitude: f64,
    /// Starting depth in kilometers
    pub source_depth: f64,
    #[serde(default)]
    pub is_location_new: bool,
    #[serde(default)]
    pub is_location_held: bool,
    #[serde(default)]
    pub is_depth_held: bool,
    #[serde(default)]
    pub is_bayesian_depth: bool,
    #[serde(default)]
    pub bayesian_depth: f64,
    #[serde(default)]
    pub bayesian_spread: f64,
    /// Accepted for compatibility; regional travel-time switching is not
    /// supported
    #[serde(rename = "useRSTT", default)]
    pub use_rstt: bool,
    /// Decorrelate the residuals (on unless the client says otherwise)
    #[serde(rename = "useSVD", default = "default_true")]
    pub use_svd: bool,
    #[serde(rename = "reassessInitialPhaseIDs", default = "default_true")]
    pub reassess_initial_phase_ids: bool,
    #[serde(default = "default_model")]
    pub earth_model: String,
    pub input_data: Vec<InputPick>,
}

impl LocationRequest {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|error| LocatorError::BadInput(format!("unparseable request: {error}")))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.source_latitude) {
            return Err(LocatorError::BadInput(format!(
                "source latitude {} out of range",
                self.source_latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.source_longitude) {
            return Err(LocatorError::BadInput(format!(
                "source longitude {} out of range",
                self.source_longitude
            )));
        }
        if self.input_data.is_empty() {
            return Err(LocatorError::BadInput("no picks in the request".into()));
        }
        for pick in &self.input_data {
            if pick.site.station.is_empty() {
                return Err(LocatorError::BadInput("pick without a station code".into()));
            }
            if !(-90.0..=90.0).contains(&pick.site.latitude)
                || !(-180.0..=180.0).contains(&pick.site.longitude)
            {
                return Err(LocatorError::BadInput(format!(
                    "station {} has illegal coordinates",
                    pick.site.station
                )));
            }
        }
        Ok(())
    }

    /// Unpack the request into a domain event ready for location.
    pub fn to_event(&self) -> Result<Event> {
        self.validate()?;

        let hypocenter = Hypocenter::new(
            geo::millis_to_seconds(self.source_origin_time),
            self.source_latitude,
            self.source_longitude,
            self.source_depth,
        );
        let mut event = Event::new(self.earth_model.clone(), hypocenter);
        event.is_location_held = self.is_location_held;
        event.is_depth_held = self.is_depth_held;
        event.is_depth_manual = self.is_bayesian_depth;
        event.use_decorrelation = self.use_svd;
        event.is_location_restarted = self.is_location_new;

        for pick in &self.input_data {
            let station = Arc::new(Station::new(
                StationId::new(
                    pick.site.station.clone(),
                    pick.site.network.clone(),
                    pick.site.location.clone(),
                ),
                pick.site.latitude,
                pick.site.longitude,
                pick.site.elevation,
            ));
            event.picks.push(Pick::new(
                pick.id.clone(),
                station,
                pick.site.channel.clone(),
                pick.source.agency_id.clone(),
                pick.source.author.clone(),
                AuthorType::parse(&pick.source.author_type),
                geo::millis_to_seconds(pick.time),
                pick.quality,
                pick.affinity,
                pick.use_flag,
                &pick.located_phase,
                &pick.associated_phase,
            ));
        }

        event.init(self.bayesian_depth, self.bayesian_spread);
        Ok(event)
    }
}

/// The located hypocenter of a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HypocenterOutput {
    /// Origin time in epoch milliseconds
    pub time: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub depth: f64,
}

/// One axis of the reported error ellipsoid.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EllipseAxisOutput {
    /// Semi-axis length in kilometers
    pub semi_major: f64,
    pub azimuth: f64,
    pub plunge: f64,
}

/// One pick of the location result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputPick {
    pub id: String,
    pub site: Site,
    pub source: SourceInfo,
    /// Arrival time in epoch milliseconds
    pub time: i64,
    /// Working phase identification
    pub located_phase: String,
    /// Phase claimed upstream
    pub associated_phase: String,
    pub residual: f64,
    /// Epicentral distance in degrees
    pub distance: f64,
    /// Azimuth from the source in degrees
    pub azimuth: f64,
    pub weight: f64,
    pub importance: f64,
    #[serde(rename = "use")]
    pub use_flag: bool,
    pub affinity: f64,
    pub quality: f64,
}

/// A location result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationResult {
    pub hypocenter: HypocenterOutput,
    pub num_stations_associated: usize,
    pub num_stations_used: usize,
    pub num_phases_associated: usize,
    pub num_phases_used: usize,
    pub azim_gap: f64,
    pub robust_gap: f64,
    pub min_distance: f64,
    /// Three-character quality flags: summary, epicenter, depth
    pub quality: String,
    pub time_error: f64,
    pub latitude_error: f64,
    pub longitude_error: f64,
    pub depth_error: f64,
    pub residual_error: f64,
    pub error_h: f64,
    pub error_z: f64,
    pub avg_h: f64,
    pub bayesian_depth: f64,
    pub bayesian_spread: f64,
    pub bayesian_depth_importance: f64,
    pub error_ellipse: [EllipseAxisOutput; 3],
    pub exit_code: String,
    pub output_data: Vec<OutputPick>,
}

impl LocationResult {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|error| LocatorError::BadInput(format!("unparseable result: {error}")))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// One-line CSV summary for batch bookkeeping.
    pub fn to_csv(&self) -> String {
        format!(
            "{},{:.4},{:.4},{:.2},{},{},{:.0},{:.0},{},{}",
            self.hypocenter.time,
            self.hypocenter.latitude,
            self.hypocenter.longitude,
            self.hypocenter.depth,
            self.num_stations_used,
            self.num_phases_used,
            self.azim_gap,
            self.min_distance,
            self.quality.trim(),
            self.exit_code
        )
    }

    /// Pack a located event into the result wire form. Pick groups are
    /// reported in (distance, time) order.
    pub fn from_event(event: &Event) -> Self {
        let mut output_data = Vec::with_capacity(event.picks.len());
        for group_index in event.groups_by_distance() {
            let group = &event.groups[group_index];
            for &pick_index in &group.pick_indices {
                let pick = &event.picks[pick_index];
                output_data.push(OutputPick {
                    id: pick.id.clone(),
                    site: Site {
                        station: pick.station.id.station.clone(),
                        channel: pick.channel.clone(),
                        network: pick.station.id.network.clone(),
                        location: pick.station.id.location.clone(),
                        latitude: pick.station.latitude,
                        longitude: pick.station.longitude,
                        elevation: pick.station.elevation,
                    },
                    source: SourceInfo {
                        agency_id: pick.agency.clone(),
                        author: pick.author.clone(),
                        author_type: pick.author_type.as_str().to_string(),
                    },
                    time: geo::seconds_to_millis(pick.arrival_time),
                    located_phase: pick.current_code.clone(),
                    associated_phase: pick.observed_code.clone(),
                    residual: pick.residual,
                    distance: group.delta,
                    azimuth: group.azimuth,
                    weight: pick.weight,
                    importance: pick.importance,
                    use_flag: pick.is_used,
                    affinity: pick.affinity,
                    quality: pick.quality,
                });
            }
        }

        let bayes = event.hypocenter.bayes;
        LocationResult {
            hypocenter: HypocenterOutput {
                time: geo::seconds_to_millis(event.hypocenter.origin_time),
                latitude: event.hypocenter.latitude,
                longitude: event.hypocenter.longitude,
                depth: event.hypocenter.depth,
            },
            num_stations_associated: event.stations_associated,
            num_stations_used: event.stations_used,
            num_phases_associated: event.phases_associated,
            num_phases_used: event.phases_used,
            azim_gap: event.azimuthal_gap,
            robust_gap: event.robust_gap,
            min_distance: event.min_distance,
            quality: event.quality.clone(),
            time_error: event.se_time,
            latitude_error: event.se_latitude,
            longitude_error: event.se_longitude,
            depth_error: event.se_depth,
            residual_error: event.se_residual,
            error_h: event.error_h,
            error_z: event.error_z,
            avg_h: event.error_avg_h,
            bayesian_depth: bayes.map(|b| b.depth).unwrap_or(0.0),
            bayesian_spread: bayes.map(|b| b.spread).unwrap_or(0.0),
            bayesian_depth_importance: event.bayes_importance,
            error_ellipse: [
                axis_output(&event.ellipsoid[0]),
                axis_output(&event.ellipsoid[1]),
                axis_output(&event.ellipsoid[2]),
            ],
            exit_code: event.exit_code.as_str().to_string(),
            output_data,
        }
    }
}

fn axis_output(axis: &crate::models::event::EllipseAxis) -> EllipseAxisOutput {
    EllipseAxisOutput {
        semi_major: axis.semi_len,
        azimuth: axis.azimuth,
        plunge: axis.plunge,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn sample_request_json() -> String {
        r#"{
            "sourceOriginTime": 1217617551880,
            "sourceLatitude": 50.2075,
            "sourceLongitude": -114.8603,
            "sourceDepth": 9.98,
            "isLocationNew": false,
            "isLocationHeld": false,
            "isDepthHeld": false,
            "isBayesianDepth": false,
            "useSVD": true,
            "earthModel": "ak135",
            "inputData": [
                {
                    "id": "12345",
                    "site": {
                        "station": "DUG",
                        "channel": "BHZ",
                        "network": "US",
                        "location": "00",
                        "latitude": 40.195,
                        "longitude": -112.8133,
                        "elevation": 1.477
                    },
                    "source": {
                        "agencyID": "US-NEIC",
                        "author": "auto",
                        "type": "LocalAutomatic"
                    },
                    "time": 1217617715000,
                    "locatedPhase": "P",
                    "associatedPhase": "P",
                    "use": true,
                    "quality": 0.5,
                    "affinity": 1.2
                }
            ]
        }"#
        .to_string()
    }

    #[test]
    fn request_round_trips_through_the_event() {
        let request = LocationRequest::from_json(&sample_request_json()).unwrap();
        assert_eq!(request.earth_model, "ak135");
        assert!(request.use_svd);

        let event = request.to_event().unwrap();
        assert_eq!(event.picks.len(), 1);
        assert_eq!(event.stations_associated, 1);
        assert!((event.hypocenter.origin_time - 1217617551.880).abs() < 1e-6);
        assert_eq!(event.picks[0].observed_code, "P");
        assert!((event.picks[0].affinity - 1.2).abs() < 1e-12);
    }

    #[test]
    fn bad_coordinates_are_rejected() {
        let mut request = LocationRequest::from_json(&sample_request_json()).unwrap();
        request.source_latitude = 120.0;
        assert!(matches!(
            request.to_event(),
            Err(LocatorError::BadInput(_))
        ));
    }

    #[test]
    fn missing_fields_default_sensibly() {
        let minimal = r#"{
            "sourceOriginTime": 0,
            "sourceLatitude": 10.0,
            "sourceLongitude": 20.0,
            "sourceDepth": 10.0,
            "inputData": [{
                "site": {"station": "AAA", "network": "XX", "latitude": 11.0, "longitude": 21.0},
                "source": {},
                "time": 60000
            }]
        }"#;
        let request = LocationRequest::from_json(minimal).unwrap();
        assert_eq!(request.earth_model, "ak135");
        assert!(request.use_svd);
        let event = request.to_event().unwrap();
        assert!(event.picks[0].is_used);
        assert_eq!(event.picks[0].affinity, geo::NULL_AFFINITY);
    }

    #[test]
    fn result_serializes_with_wire_names() {
        let request = LocationRequest::from_json(&sample_request_json()).unwrap();
        let event = request.to_event().unwrap();
        let result = LocationResult::from_event(&event);
        let json = result.to_json().unwrap();
        assert!(json.contains("\"numStationsAssociated\""));
        assert!(json.contains("\"errorEllipse\""));
        assert!(json.contains("\"semiMajor\""));
        assert!(json.contains("\"use\""));
    }
}
