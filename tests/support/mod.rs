//! Shared helpers for the integration tests: synthetic networks whose
//! picks are generated from the same travel-time model the locator uses.

use std::sync::Arc;

use hypolocator::geo;
use hypolocator::io::request::{InputPick, LocationRequest, Site, SourceInfo};
use hypolocator::refdata::{AuxData, Craton, Cratons, ZoneStats};
use hypolocator::traveltime::synthetic::SyntheticModel;
use hypolocator::traveltime::TravelTimeModel;

/// A ground-truth event for scenario construction.
pub struct TruthEvent {
    pub origin_time: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub depth: f64,
}

/// Reference data with one quadrilateral craton roughly covering the
/// North American interior and no zone statistics.
pub fn test_aux() -> Arc<AuxData> {
    let craton = Craton::new(
        "North America",
        vec![60.0, 59.9, 30.0, 30.1, 60.0],
        vec![-110.0, -85.0, -85.1, -110.0, -110.0],
    );
    Arc::new(AuxData::new(Cratons::new(vec![craton]), ZoneStats::empty()))
}

/// Build picks for the truth event as seen by `stations`, using exact
/// synthetic model times. Each station contributes a P pick; stations
/// with `with_s` also contribute an S pick.
pub fn synthetic_picks(
    truth: &TruthEvent,
    stations: &[(f64, f64)],
    with_s: bool,
) -> Vec<InputPick> {
    let model = SyntheticModel::new();
    let source_trig = geo::TrigCache::new(
        geo::geocentric_colatitude(truth.latitude),
        truth.longitude,
    );

    let mut picks = Vec::new();
    for (index, &(lat, lon)) in stations.iter().enumerate() {
        let station_trig = geo::TrigCache::new(geo::geocentric_colatitude(lat), lon);
        let (delta, _) = geo::delta_azimuth(&source_trig, &station_trig);
        let arrivals = model.arrivals(truth.depth, delta, 0.0, true);

        let mut push = |phase: &str| {
            if let Some(arrival) = arrivals.iter().find(|a| a.phase == phase) {
                picks.push(InputPick {
                    id: format!("{index}-{phase}"),
                    site: Site {
                        station: format!("S{index:02}"),
                        channel: "BHZ".to_string(),
                        network: "XX".to_string(),
                        location: "00".to_string(),
                        latitude: lat,
                        longitude: lon,
                        elevation: 0.0,
                    },
                    source: SourceInfo {
                        agency_id: "TEST".to_string(),
                        author: "generator".to_string(),
                        author_type: "LocalHuman".to_string(),
                    },
                    time: geo::seconds_to_millis(truth.origin_time + arrival.tt),
                    located_phase: phase.to_string(),
                    associated_phase: phase.to_string(),
                    use_flag: true,
                    quality: 0.5,
                    affinity: 1.0,
                });
            }
        };
        push("P");
        if with_s {
            push("S");
        }
    }
    picks
}

/// A ring of stations around the truth epicenter at 1-3 degrees.
pub fn surrounding_stations(latitude: f64, longitude: f64) -> Vec<(f64, f64)> {
    vec![
        (latitude + 1.2, longitude + 0.2),
        (latitude + 0.8, longitude + 1.5),
        (latitude - 0.3, longitude + 2.1),
        (latitude - 1.6, longitude + 0.9),
        (latitude - 2.0, longitude - 0.5),
        (latitude - 0.9, longitude - 1.8),
        (latitude + 0.4, longitude - 2.3),
        (latitude + 1.9, longitude - 1.0),
        (latitude + 2.6, longitude + 1.1),
        (latitude - 0.1, longitude + 3.0),
    ]
}

/// A request starting from a perturbed hypocenter.
pub fn request_from(
    truth: &TruthEvent,
    start_offset: (f64, f64, f64, f64),
    picks: Vec<InputPick>,
) -> LocationRequest {
    let (dt, dlat, dlon, ddepth) = start_offset;
    LocationRequest {
        source_origin_time: geo::seconds_to_millis(truth.origin_time + dt),
        source_latitude: truth.latitude + dlat,
        source_longitude: truth.longitude + dlon,
        source_depth: truth.depth + ddepth,
        is_location_new: false,
        is_location_held: false,
        is_depth_held: false,
        is_bayesian_depth: false,
        bayesian_depth: 0.0,
        bayesian_spread: 0.0,
        use_rstt: false,
        use_svd: false,
        reassess_initial_phase_ids: true,
        earth_model: "synthetic".to_string(),
        input_data: picks,
    }
}

/// Kilometers between two epicenters.
pub fn epicentral_distance_km(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let a = geo::TrigCache::new(geo::geocentric_colatitude(lat_a), lon_a);
    let b = geo::TrigCache::new(geo::geocentric_colatitude(lat_b), lon_b);
    let (delta, _) = geo::delta_azimuth(&a, &b);
    delta * geo::DEG2KM
}
