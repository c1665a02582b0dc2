//! End-to-end location scenarios against the synthetic travel-time
//! model. Picks are generated from the same model the engine consults,
//! so the true hypocenter is the global dispersion minimum.

mod support;

use std::sync::Arc;

use hypolocator::solver::Locator;
use hypolocator::traveltime::synthetic::SyntheticModel;

use support::{
    epicentral_distance_km, request_from, surrounding_stations, synthetic_picks, test_aux,
    TruthEvent,
};

fn test_locator() -> Locator {
    Locator::new(test_aux(), Arc::new(SyntheticModel::new()))
}

fn shallow_truth() -> TruthEvent {
    TruthEvent {
        origin_time: 1217617551.880,
        latitude: 40.0,
        longitude: -114.0,
        depth: 15.0,
    }
}

#[test]
fn known_event_converges_from_a_perturbed_start() {
    let truth = shallow_truth();
    let stations = surrounding_stations(truth.latitude, truth.longitude);
    let picks = synthetic_picks(&truth, &stations, true);
    // Start about 20 km and 20 km of depth off, 3 seconds late.
    let request = request_from(&truth, (3.0, 0.15, -0.1, 20.0), picks);

    let result = test_locator().locate(&request).unwrap();

    assert_eq!(result.exit_code, "SuccessfulLocation");
    let missed_by = epicentral_distance_km(
        result.hypocenter.latitude,
        result.hypocenter.longitude,
        truth.latitude,
        truth.longitude,
    );
    assert!(missed_by < 15.0, "epicenter missed by {missed_by:.1} km");
    assert!(
        (result.hypocenter.depth - truth.depth).abs() < 20.0,
        "depth {} vs {}",
        result.hypocenter.depth,
        truth.depth
    );
    let origin_seconds = result.hypocenter.time as f64 / 1000.0;
    assert!(
        (origin_seconds - truth.origin_time).abs() < 3.0,
        "origin off by {:.2} s",
        origin_seconds - truth.origin_time
    );
    assert!(result.azim_gap < 180.0);
    assert!(result.num_stations_used >= 8);
}

#[test]
fn decorrelated_location_also_converges() {
    let truth = shallow_truth();
    let stations = surrounding_stations(truth.latitude, truth.longitude);
    let picks = synthetic_picks(&truth, &stations, true);
    let mut request = request_from(&truth, (1.5, 0.15, 0.1, 10.0), picks);
    request.use_svd = true;

    let result = test_locator().locate(&request).unwrap();

    let missed_by = epicentral_distance_km(
        result.hypocenter.latitude,
        result.hypocenter.longitude,
        truth.latitude,
        truth.longitude,
    );
    assert!(missed_by < 40.0, "epicenter missed by {missed_by:.1} km");
    assert_ne!(result.exit_code, "InsufficientData");
    assert_ne!(result.exit_code, "LocationFailed");
}

#[test]
fn bayesian_depth_prior_holds_the_depth() {
    let truth = TruthEvent {
        depth: 10.0,
        ..shallow_truth()
    };
    let stations = surrounding_stations(truth.latitude, truth.longitude);
    let picks = synthetic_picks(&truth, &stations, true);
    // Start deep; the analyst prior pulls the depth back.
    let mut request = request_from(&truth, (0.0, 0.1, 0.1, 290.0), picks);
    request.is_bayesian_depth = true;
    request.bayesian_depth = 10.0;
    request.bayesian_spread = 3.0;

    let result = test_locator().locate(&request).unwrap();

    assert!(
        result.hypocenter.depth >= 7.0 && result.hypocenter.depth <= 13.0,
        "depth {}",
        result.hypocenter.depth
    );
    assert!(
        result.bayesian_depth_importance > 0.5,
        "importance {}",
        result.bayesian_depth_importance
    );
}

#[test]
fn two_stations_are_insufficient_data() {
    let truth = shallow_truth();
    let stations = vec![
        (truth.latitude + 1.2, truth.longitude + 0.2),
        (truth.latitude - 0.8, truth.longitude - 1.1),
    ];
    let picks = synthetic_picks(&truth, &stations, true);
    let request = request_from(&truth, (0.0, 0.0, 0.0, 0.0), picks);

    let result = test_locator().locate(&request).unwrap();

    assert_eq!(result.exit_code, "InsufficientData");
    // The hypocenter never moved beyond the depth clamp.
    assert_eq!(result.hypocenter.latitude, truth.latitude);
    assert_eq!(result.hypocenter.longitude, truth.longitude);
    assert_eq!(result.hypocenter.depth, truth.depth);
    assert_eq!(result.quality, "D  ");
}

#[test]
fn held_location_stays_bit_exact_with_errors_populated() {
    let truth = shallow_truth();
    let stations = surrounding_stations(truth.latitude, truth.longitude);
    let picks = synthetic_picks(&truth, &stations, true);
    // Perturb the start; held means the perturbed start IS the answer.
    let mut request = request_from(&truth, (0.0, 0.05, -0.05, 5.0), picks);
    request.is_location_held = true;

    let result = test_locator().locate(&request).unwrap();

    assert_eq!(result.hypocenter.latitude, truth.latitude + 0.05);
    assert_eq!(result.hypocenter.longitude, truth.longitude - 0.05);
    assert_eq!(result.hypocenter.depth, truth.depth + 5.0);
    assert_eq!(result.exit_code, "DidNotMove");
    assert!(
        result.error_ellipse[0].semi_major > 0.0,
        "ellipsoid should still be populated"
    );
    assert!(result.depth_error > 0.0);
}

#[test]
fn craton_and_tectonic_flags() {
    let locator = test_locator();

    let mut inside = TruthEvent {
        latitude: 45.0,
        longitude: -100.0,
        ..shallow_truth()
    };
    let stations = surrounding_stations(inside.latitude, inside.longitude);
    let picks = synthetic_picks(&inside, &stations, false);
    let request = request_from(&inside, (0.0, 0.0, 0.0, 0.0), picks);
    let mut event = request.to_event().unwrap();
    locator.run(&mut event, true).unwrap();
    assert!(!event.is_tectonic, "central North America is cratonic");

    inside.latitude = 35.0;
    inside.longitude = 140.0;
    let stations = surrounding_stations(inside.latitude, inside.longitude);
    let picks = synthetic_picks(&inside, &stations, false);
    let request = request_from(&inside, (0.0, 0.0, 0.0, 0.0), picks);
    let mut event = request.to_event().unwrap();
    locator.run(&mut event, true).unwrap();
    assert!(event.is_tectonic, "Japan is tectonic");
}

#[test]
fn output_picks_carry_geometry_and_identifications() {
    let truth = shallow_truth();
    let stations = surrounding_stations(truth.latitude, truth.longitude);
    let picks = synthetic_picks(&truth, &stations, true);
    let request = request_from(&truth, (0.0, 0.02, 0.02, 2.0), picks);

    let result = test_locator().locate(&request).unwrap();

    assert_eq!(result.output_data.len(), result.num_phases_associated);
    // Output groups are distance-ordered.
    let distances: Vec<f64> = result
        .output_data
        .iter()
        .map(|pick| pick.distance)
        .collect();
    let mut sorted = distances.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(distances, sorted);

    for pick in &result.output_data {
        assert!(pick.distance > 0.0);
        assert!((0.0..360.0).contains(&pick.azimuth));
        if pick.use_flag {
            assert!(!pick.located_phase.is_empty());
        }
    }
}
