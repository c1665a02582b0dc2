//! Geodetic helpers and the numeric constants of the location engine.
//!
//! Everything here is pure and reentrant: geographic/geocentric latitude
//! conversion on the reference ellipsoid, spherical distance/azimuth from
//! cached sines and cosines, and the empirical weighting functions used by
//! phase identification and the step controller.

/// Kilometers per degree of arc on the reference sphere.
pub const DEG2KM: f64 = 111.19;

/// Legal depth range for a hypocenter in kilometers.
pub const DEPTH_MIN: f64 = 1.0;
pub const DEPTH_MAX: f64 = 700.0;

/// Affinity assigned to picks without an analyst-set affinity.
pub const NULL_AFFINITY: f64 = 1.0;

/// Maximum residual (seconds) for keeping an existing identification.
pub const ASSOC_TOLERANCE: f64 = 60.0;

/// Default Bayesian depth spread in kilometers (free depth).
pub const DEFAULT_DEPTH_SE: f64 = 15.0;

/// Bayesian depth spread simulated for a held depth, in kilometers.
pub const HELD_DEPTH_SE: f64 = 3.0;

/// Hypocenter movement below these tolerances counts as "did not move".
pub const DELTA_TOLERANCE: f64 = 0.5;
pub const DEPTH_TOLERANCE: f64 = 1.0;

/// Dispersion ratio under which a failed damped step still counts as
/// nearly converged.
pub const ALMOST_CONVERGED: f64 = 1.1;

/// Step length (kilometers) below which a stalled solution is merely
/// unconverged rather than unstable.
pub const STEP_TOLERANCE: f64 = 0.5;

/// Fraction of the covariance trace retained by the decorrelator.
pub const COVARIANCE_COVERAGE: f64 = 0.95;

/// Depth change (kilometers) that forces a new travel-time session.
/// Tighter than the final-stage convergence limit so the tables never
/// lag the solution.
pub const SESSION_DEPTH_TOLERANCE: f64 = 0.05;

/// Observability multiplier for distance-discriminated phases.
pub const DOWN_WEIGHT: f64 = 0.5;

/// Observability multiplier when only the phase group matches.
pub const GROUP_WEIGHT: f64 = 0.5;

/// Extra penalty when a trusted pick disagrees on P versus S.
pub const TYPE_WEIGHT: f64 = 0.1;

/// Distance (degrees) counting a pick as local for the quality flags.
pub const LOCAL_DISTANCE: f64 = 1.0;

/// Distance (degrees) beyond which the first arrival in a group gets a
/// figure-of-merit advantage.
pub const FIRST_ARRIVAL_RANGE: f64 = 20.0;

/// Fraction of misidentified first arrivals that triggers the draconian
/// initial identification.
pub const BAD_P_RATIO: f64 = 0.1;

/// Iteration cap for the linear step bisection.
pub const MAX_BISECT: usize = 50;

/// (1 - f)^2 for the reference ellipsoid, linking geographic and
/// geocentric latitude.
const ELLIPSOID_FACTOR: f64 = 0.993_305_521;

/// Offset away from the poles and the date line where the polygon test
/// would degenerate.
pub const POLE_OFFSET: f64 = 1e-10;

/// Horizontal error limits (km) for quality codes A/B/C.
pub const H_QUALITY_LIMITS: [f64; 3] = [8.5, 16.0, 60.0];
/// Vertical error limits (km) for quality codes A/B/C.
pub const V_QUALITY_LIMITS: [f64; 3] = [16.0, 30.0, 75.0];
/// Phase-count limits supporting quality codes A/B.
pub const N_QUALITY_LIMITS: [usize; 2] = [6, 2];
/// Semi-major-axis limits (km) that degrade elongated solutions.
pub const A_QUALITY_LIMITS: [f64; 3] = [20.0, 30.0, 60.0];

/// Convert a geographic latitude in degrees to a geocentric colatitude in
/// degrees.
pub fn geocentric_colatitude(latitude: f64) -> f64 {
    90.0 - (ELLIPSOID_FACTOR * latitude.to_radians().tan()).atan().to_degrees()
}

/// Convert a geocentric colatitude in degrees back to a geographic
/// latitude in degrees. Exact inverse of [`geocentric_colatitude`].
pub fn geographic_latitude(colatitude: f64) -> f64 {
    ((90.0 - colatitude).to_radians().tan() / ELLIPSOID_FACTOR)
        .atan()
        .to_degrees()
}

/// Cached sines and cosines of a geocentric position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrigCache {
    pub sin_colat: f64,
    pub cos_colat: f64,
    pub sin_lon: f64,
    pub cos_lon: f64,
}

impl TrigCache {
    pub fn new(colatitude: f64, longitude: f64) -> Self {
        Self {
            sin_colat: colatitude.to_radians().sin(),
            cos_colat: colatitude.to_radians().cos(),
            sin_lon: longitude.to_radians().sin(),
            cos_lon: longitude.to_radians().cos(),
        }
    }
}

/// Epicentral distance and source-to-station azimuth in degrees.
///
/// Both positions are given through their geocentric trig caches so that
/// the hot loop never recomputes trigonometry for the source.
pub fn delta_azimuth(source: &TrigCache, station: &TrigCache) -> (f64, f64) {
    let cos_lon_diff = source.cos_lon * station.cos_lon + source.sin_lon * station.sin_lon;

    let cos_delta =
        source.cos_colat * station.cos_colat + source.sin_colat * station.sin_colat * cos_lon_diff;
    let east = station.sin_colat * (station.sin_lon * source.cos_lon - station.cos_lon * source.sin_lon);
    let north = source.sin_colat * station.cos_colat
        - source.cos_colat * station.sin_colat * cos_lon_diff;
    let sin_delta = east.hypot(north);

    let delta = sin_delta.atan2(cos_delta).to_degrees();
    let mut azimuth = east.atan2(north).to_degrees();
    if azimuth < 0.0 {
        azimuth += 360.0;
    }

    (delta, azimuth)
}

/// Cauchy probability density of a travel-time residual with the phase
/// spread as scale. Used as the statistical term of the figure-of-merit.
pub fn residual_probability(residual: f64, spread: f64) -> f64 {
    let scale = spread.max(1e-3);
    1.0 / (std::f64::consts::PI * scale * (1.0 + (residual / scale).powi(2)))
}

/// Figure-of-merit boost for theoretical phases close to the pick. Decays
/// monotonically from 2 at zero residual towards 1.
pub fn proximity_boost(residual: f64) -> f64 {
    const SCALE: f64 = 5.0;
    1.0 + 1.0 / (1.0 + (residual / SCALE).powi(2))
}

/// Figure-of-merit advantage of the first arrival in a pick group. Unity
/// out to [`FIRST_ARRIVAL_RANGE`], then grows slowly with distance.
pub fn distance_correction(delta: f64) -> f64 {
    if delta <= FIRST_ARRIVAL_RANGE {
        1.0
    } else {
        1.0 + (delta - FIRST_ARRIVAL_RANGE) / 120.0
    }
}

/// Step-length damping factor schedule. Early iterations damp hard, later
/// ones gently, which breaks the normal-step/damped-step limit cycle.
pub fn dampening_factor(iteration: usize) -> f64 {
    const SCHEDULE: [f64; 5] = [0.5, 0.6, 0.7, 0.8, 0.9];
    SCHEDULE[iteration.min(SCHEDULE.len() - 1)]
}

/// Arrival type of a phase code: true for P-type, false for S-type.
/// Surface waves and exotic codes follow their leading letter.
pub fn is_p_type(phase: &str) -> bool {
    !matches!(phase.chars().next(), Some('S') | Some('s') | Some('L'))
}

/// Ground-truth-within-5-km criterion of Bondar et al., used by the
/// summary quality flag.
pub fn is_gt5(local_phases_used: usize, min_distance: f64, azimuthal_gap: f64, robust_gap: f64) -> bool {
    local_phases_used >= 10 && min_distance <= 0.5 && azimuthal_gap <= 110.0 && robust_gap <= 160.0
}

/// 90th percentile of the F distribution with `m` and `n` degrees of
/// freedom, used to scale the error ellipsoid. Tabulated for the m = 2
/// and m = 3 cases the locator needs and interpolated linearly in 1/n.
pub fn f_90(m: usize, n: usize) -> f64 {
    const N_KNOTS: [f64; 12] = [2.0, 3.0, 4.0, 5.0, 6.0, 8.0, 10.0, 15.0, 20.0, 30.0, 60.0, 1e9];
    const F2: [f64; 12] = [9.00, 5.46, 4.32, 3.78, 3.46, 3.11, 2.92, 2.70, 2.59, 2.49, 2.39, 2.30];
    const F3: [f64; 12] = [9.16, 5.39, 4.19, 3.62, 3.29, 2.92, 2.73, 2.49, 2.38, 2.28, 2.18, 2.08];

    let table = if m <= 2 { &F2 } else { &F3 };
    let n = (n.max(2)) as f64;
    let inv = 1.0 / n;
    for k in 1..N_KNOTS.len() {
        if n <= N_KNOTS[k] {
            let inv0 = 1.0 / N_KNOTS[k - 1];
            let inv1 = 1.0 / N_KNOTS[k];
            let frac = (inv - inv0) / (inv1 - inv0);
            return table[k - 1] + frac * (table[k] - table[k - 1]);
        }
    }
    table[N_KNOTS.len() - 1]
}

/// Epoch milliseconds (wire format) to internal seconds since the epoch.
pub fn millis_to_seconds(millis: i64) -> f64 {
    millis as f64 / 1000.0
}

/// Internal seconds since the epoch to epoch milliseconds.
pub fn seconds_to_millis(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}

/// Format an internal origin time as `YYYY-MM-DD HH:MM:SS.mmm` UTC.
pub fn format_origin_time(seconds: f64) -> String {
    let secs = seconds.floor() as i64;
    let nanos = ((seconds - seconds.floor()) * 1e9) as u32;
    let dt = chrono::DateTime::from_timestamp(secs, nanos).unwrap_or(chrono::DateTime::UNIX_EPOCH);
    dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Parse a `YYYY-MM-DD HH:MM:SS.mmm` UTC timestamp to internal seconds.
pub fn parse_origin_time(text: &str) -> Option<f64> {
    let dt = chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f").ok()?;
    Some(dt.and_utc().timestamp() as f64 + dt.and_utc().timestamp_subsec_nanos() as f64 / 1e9)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn colatitude_round_trip() {
        for lat in [-89.9, -45.0, -10.0, 0.0, 23.4567, 45.0, 66.0, 89.9] {
            let colat = geocentric_colatitude(lat);
            assert_relative_eq!(geographic_latitude(colat), lat, epsilon = 1e-9);
        }
    }

    #[test]
    fn trig_cache_is_unitary() {
        let cache = TrigCache::new(geocentric_colatitude(50.2075), -114.8603);
        assert_relative_eq!(
            cache.sin_colat * cache.sin_colat + cache.cos_colat * cache.cos_colat,
            1.0,
            epsilon = 1e-15
        );
        assert_relative_eq!(
            cache.sin_lon * cache.sin_lon + cache.cos_lon * cache.cos_lon,
            1.0,
            epsilon = 1e-15
        );
    }

    #[test]
    fn delta_azimuth_cardinal_directions() {
        let source = TrigCache::new(geocentric_colatitude(0.0), 0.0);

        let north = TrigCache::new(geocentric_colatitude(10.0), 0.0);
        let (delta, azimuth) = delta_azimuth(&source, &north);
        assert!(delta > 9.0 && delta < 11.0);
        assert!(azimuth < 1.0 || azimuth > 359.0);

        let east = TrigCache::new(geocentric_colatitude(0.0), 10.0);
        let (delta, azimuth) = delta_azimuth(&source, &east);
        assert_relative_eq!(delta, 10.0, epsilon = 1e-6);
        assert_relative_eq!(azimuth, 90.0, epsilon = 1e-6);
    }

    #[test]
    fn delta_azimuth_is_nonnegative() {
        let source = TrigCache::new(geocentric_colatitude(50.0), -115.0);
        let station = TrigCache::new(geocentric_colatitude(48.5), -117.2);
        let (delta, azimuth) = delta_azimuth(&source, &station);
        assert!(delta > 0.0);
        assert!((0.0..360.0).contains(&azimuth));
    }

    #[test]
    fn residual_probability_peaks_at_zero() {
        let peak = residual_probability(0.0, 1.0);
        assert!(peak > residual_probability(0.5, 1.0));
        assert!(residual_probability(0.5, 1.0) > residual_probability(2.0, 1.0));
    }

    #[test]
    fn proximity_boost_monotone() {
        assert_relative_eq!(proximity_boost(0.0), 2.0);
        assert!(proximity_boost(1.0) > proximity_boost(10.0));
        assert!(proximity_boost(100.0) > 1.0);
    }

    #[test]
    fn dampening_factor_in_unit_interval() {
        for iter in 0..10 {
            let damp = dampening_factor(iter);
            assert!(damp > 0.0 && damp < 1.0);
        }
    }

    #[test]
    fn f_90_decreases_with_denominator_dof() {
        assert!(f_90(3, 4) > f_90(3, 10));
        assert!(f_90(3, 10) > f_90(3, 100));
        assert!(f_90(2, 10) > f_90(3, 10) - 1.0);
    }

    #[test]
    fn origin_time_format_round_trip() {
        let t = 1217617551.880;
        let text = format_origin_time(t);
        assert_eq!(text, "2008-08-01 19:05:51.880");
        let parsed = parse_origin_time(&text).unwrap();
        assert_relative_eq!(parsed, t, epsilon = 1e-3);
    }
}
