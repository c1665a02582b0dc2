//! The event aggregate: hypocenter, stations, picks, and run statistics.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::geo;
use crate::models::audit::HypoAudit;
use crate::models::group::PickGroup;
use crate::models::hypocenter::Hypocenter;
use crate::models::pick::Pick;
use crate::models::station::{Station, StationId};
use crate::models::wresidual::WeightedResidual;
use crate::status::LocStatus;

/// One axis of the error ellipsoid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EllipseAxis {
    /// Semi-axis length in kilometers
    pub semi_len: f64,
    /// Azimuth of the axis in degrees clockwise from north
    pub azimuth: f64,
    /// Plunge below the horizontal in degrees
    pub plunge: f64,
}

impl EllipseAxis {
    /// Horizontal (tangential) projection of the axis in kilometers.
    pub fn tangential_projection(&self) -> f64 {
        self.semi_len * self.plunge.to_radians().cos()
    }

    /// Vertical projection of the axis in kilometers.
    pub fn vertical_projection(&self) -> f64 {
        self.semi_len * self.plunge.to_radians().sin().abs()
    }
}

/// All the data for one seismic event being located.
///
/// The event owns the picks and groups; the solver kernels borrow it
/// mutably for the duration of a call, which keeps the mutual recursion of
/// phase identification and stepping re-entrancy-free.
#[derive(Debug, Clone)]
pub struct Event {
    pub earth_model: String,
    // Analyst commands
    pub is_location_held: bool,
    pub is_depth_held: bool,
    pub is_depth_manual: bool,
    pub use_decorrelation: bool,
    pub is_location_restarted: bool,
    /// Everything outside the cratons is considered tectonic
    pub is_tectonic: bool,

    pub hypocenter: Hypocenter,
    pub stations: BTreeMap<StationId, Arc<Station>>,
    /// Pick groups in deterministic station order
    pub groups: Vec<PickGroup>,
    pub picks: Vec<Pick>,
    pub audits: Vec<HypoAudit>,

    /// Weighted residuals in pick order, depth prior last
    pub residuals_raw: Vec<WeightedResidual>,
    /// Copy of the raw residuals in original order for the decorrelation
    /// projection
    pub residuals_original: Vec<WeightedResidual>,
    /// Projected residuals produced by the decorrelator
    pub residuals_projected: Vec<WeightedResidual>,

    pub has_phase_id_changed: bool,

    // Statistics
    pub stations_associated: usize,
    pub stations_used: usize,
    pub phases_associated: usize,
    pub phases_used: usize,
    pub local_phases_used: usize,
    pub projected_phases_used: usize,
    pub azimuthal_gap: f64,
    pub robust_gap: f64,
    pub min_distance: f64,
    pub quality: String,
    pub exit_code: LocStatus,
    pub se_time: f64,
    pub se_latitude: f64,
    pub se_longitude: f64,
    pub se_depth: f64,
    pub se_residual: f64,
    pub error_h: f64,
    pub error_z: f64,
    pub error_avg_h: f64,
    pub ellipsoid: [EllipseAxis; 3],
    pub bayes_importance: f64,
}

impl Event {
    pub fn new(earth_model: impl Into<String>, hypocenter: Hypocenter) -> Self {
        Self {
            earth_model: earth_model.into(),
            is_location_held: false,
            is_depth_held: false,
            is_depth_manual: false,
            use_decorrelation: false,
            is_location_restarted: false,
            is_tectonic: true,
            hypocenter,
            stations: BTreeMap::new(),
            groups: Vec::new(),
            picks: Vec::new(),
            audits: Vec::new(),
            residuals_raw: Vec::new(),
            residuals_original: Vec::new(),
            residuals_projected: Vec::new(),
            has_phase_id_changed: false,
            stations_associated: 0,
            stations_used: 0,
            phases_associated: 0,
            phases_used: 0,
            local_phases_used: 0,
            projected_phases_used: 0,
            azimuthal_gap: 360.0,
            robust_gap: 360.0,
            min_distance: 0.0,
            quality: String::new(),
            exit_code: LocStatus::UnknownStatus,
            se_time: 0.0,
            se_latitude: 0.0,
            se_longitude: 0.0,
            se_depth: 0.0,
            se_residual: 0.0,
            error_h: 0.0,
            error_z: 0.0,
            error_avg_h: 0.0,
            ellipsoid: [EllipseAxis::default(); 3],
            bayes_importance: 0.0,
        }
    }

    /// Finish intake: simulate Bayesian depths for held solutions, sort
    /// the picks into station groups, set the degrees of freedom, and
    /// compute the initial geometry. Must be called once per new event.
    ///
    /// A held location is still given a simulated depth prior so that the
    /// error statistics remain comparable with a free solution; a held
    /// depth gets the tight held spread.
    pub fn init(&mut self, bayes_depth: f64, bayes_spread: f64) {
        let mut bayes_depth = bayes_depth;
        let mut bayes_spread = bayes_spread;

        if self.is_location_held {
            self.is_depth_manual = true;
            bayes_depth = self.hypocenter.depth;
            bayes_spread = if self.is_depth_held {
                geo::HELD_DEPTH_SE
            } else {
                geo::DEFAULT_DEPTH_SE
            };
        } else if self.is_depth_held {
            self.is_depth_manual = true;
            bayes_depth = self.hypocenter.depth;
            bayes_spread = geo::HELD_DEPTH_SE;
        }

        if self.is_depth_manual {
            if bayes_spread > 0.0 {
                bayes_spread = bayes_spread.max(geo::HELD_DEPTH_SE);
                self.hypocenter.add_analyst_bayes(bayes_depth, bayes_spread);
            } else {
                // Trap a bad command.
                self.is_depth_manual = false;
            }
        }

        // Sort the picks by (station, arrival time) and fold them into
        // per-station groups.
        self.picks.sort_by(|a, b| {
            (&a.station.id, a.arrival_time)
                .partial_cmp(&(&b.station.id, b.arrival_time))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        self.groups.clear();
        self.stations.clear();
        let mut last_station: Option<StationId> = None;
        for (index, pick) in self.picks.iter().enumerate() {
            if last_station.as_ref() != Some(&pick.station.id) {
                last_station = Some(pick.station.id.clone());
                self.stations.insert(pick.station.id.clone(), pick.station.clone());
                self.groups.push(PickGroup::new(pick.station.clone(), index));
            } else if let Some(group) = self.groups.last_mut() {
                group.pick_indices.push(index);
            }
        }

        self.hypocenter.set_degrees_of_freedom(self.is_depth_held);
        self.has_phase_id_changed = false;
        self.bayes_importance = 0.0;

        self.update_geometry();
        self.compute_station_stats();
    }

    fn update_geometry(&mut self) {
        for group in &mut self.groups {
            group.update_geometry(&self.hypocenter);
        }
        for pick in &mut self.picks {
            pick.update_travel_time(self.hypocenter.origin_time);
        }
    }

    /// Update everything when the hypocenter is set to new coordinates.
    pub fn update_hypo(&mut self, origin_time: f64, latitude: f64, longitude: f64, depth: f64) {
        self.hypocenter.update(origin_time, latitude, longitude, depth);
        self.update_geometry();
    }

    /// Update everything after a linearized step.
    pub fn step_hypo(&mut self, step_length: f64, time_shift: f64) {
        self.hypocenter.step(step_length, time_shift);
        self.update_geometry();
    }

    /// A pure origin-time shift leaves distances and azimuths alone.
    pub fn shift_origin(&mut self, time_shift: f64) {
        self.hypocenter.shift_origin(time_shift);
        for pick in &mut self.picks {
            pick.update_travel_time(self.hypocenter.origin_time);
        }
    }

    /// Record a hypocenter audit. Audits double as fall-back hypocenters
    /// in case the solution gets worse.
    pub fn add_audit(&mut self, stage: usize, iteration: usize, status: LocStatus) {
        let used = if self.use_decorrelation {
            self.projected_phases_used
        } else {
            self.phases_used
        };
        self.audits
            .push(HypoAudit::new(&self.hypocenter, stage, iteration, used, status));
    }

    /// Keep a copy of the raw residual vector in original order for the
    /// decorrelation projection.
    pub fn save_weighted_residuals(&mut self) {
        if self.use_decorrelation {
            self.residuals_original = self.residuals_raw.clone();
        }
    }

    /// Clear the per-pick triage flags when triage needs to be repeated.
    pub fn reset_triage(&mut self) {
        for pick in &mut self.picks {
            pick.is_triage = false;
        }
    }

    /// Count stations and picks and find the closest used station.
    pub fn compute_station_stats(&mut self) {
        self.stations_associated = self.stations.len();
        self.stations_used = 0;
        self.phases_associated = 0;
        self.phases_used = 0;
        self.local_phases_used = 0;
        self.min_distance = f64::MAX;

        for group in &self.groups {
            self.phases_associated += group.num_picks();
            let used = group.picks_used(&self.picks);
            self.phases_used += used;
            if group.delta <= geo::LOCAL_DISTANCE {
                self.local_phases_used += used;
            }
            if used > 0 {
                self.stations_used += 1;
                self.min_distance = self.min_distance.min(group.delta);
            }
        }
        if self.stations_used == 0 {
            self.min_distance = 0.0;
        }
    }

    /// Compute the azimuthal gap and the robust (L-estimator) azimuthal
    /// gap in degrees. The robust gap treats the ends of the two largest
    /// gaps as a single station, which discounts a lone outlier.
    pub fn compute_azimuth_gaps(&mut self) {
        let mut azimuths: Vec<f64> = self
            .groups
            .iter()
            .filter(|g| g.picks_used(&self.picks) > 0)
            .map(|g| g.azimuth)
            .collect();

        if azimuths.is_empty() {
            self.azimuthal_gap = 360.0;
            self.robust_gap = 360.0;
            return;
        }
        azimuths.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let n = azimuths.len();
        let mut gap: f64 = 0.0;
        let mut last = azimuths[n - 1] - 360.0;
        for &azimuth in &azimuths {
            gap = gap.max(azimuth - last);
            last = azimuth;
        }
        self.azimuthal_gap = gap;

        if n == 1 {
            self.robust_gap = 360.0;
        } else {
            // Skip one station: the largest gap when each azimuth in turn
            // is bridged over.
            let mut robust = azimuths[0] - (azimuths[n - 2] - 360.0);
            let mut last = azimuths[n - 1] - 360.0;
            for j in 1..n {
                robust = robust.max(azimuths[j] - last);
                last = azimuths[j - 1];
            }
            self.robust_gap = robust;
        }
    }

    /// Set the traditional three-character quality flags: summary,
    /// epicenter, and depth.
    pub fn set_quality_flags(&mut self, status: LocStatus) {
        if status == LocStatus::InsufficientData {
            self.quality = "D  ".to_string();
            return;
        }

        let mut summary = if geo::is_gt5(
            self.local_phases_used,
            self.min_distance,
            self.azimuthal_gap,
            self.robust_gap,
        ) {
            'G'
        } else {
            let mut summary = if self.error_avg_h <= geo::H_QUALITY_LIMITS[0]
                && self.se_depth <= geo::V_QUALITY_LIMITS[0]
                && self.phases_used > geo::N_QUALITY_LIMITS[0]
            {
                'A'
            } else if self.error_avg_h <= geo::H_QUALITY_LIMITS[1]
                && self.se_depth <= geo::V_QUALITY_LIMITS[1]
                && self.phases_used > geo::N_QUALITY_LIMITS[1]
            {
                'B'
            } else if self.error_avg_h <= geo::H_QUALITY_LIMITS[2]
                && self.se_depth <= geo::V_QUALITY_LIMITS[2]
            {
                'C'
            } else {
                'D'
            };
            // Degrade elongated error ellipses.
            let semi_major = self.ellipsoid[0].semi_len;
            if summary == 'A' && semi_major > geo::A_QUALITY_LIMITS[0] {
                summary = 'B';
            }
            if (summary == 'A' || summary == 'B') && semi_major > geo::A_QUALITY_LIMITS[1] {
                summary = 'C';
            }
            if semi_major > geo::A_QUALITY_LIMITS[2] {
                summary = 'D';
            }
            summary
        };

        let epicenter = if self.error_avg_h <= geo::H_QUALITY_LIMITS[0]
            && self.phases_used > geo::N_QUALITY_LIMITS[0]
        {
            ' '
        } else if self.error_avg_h <= geo::H_QUALITY_LIMITS[1]
            && self.phases_used > geo::N_QUALITY_LIMITS[1]
        {
            '*'
        } else if self.error_avg_h <= geo::H_QUALITY_LIMITS[2] {
            '?'
        } else {
            summary = '!';
            '?'
        };

        let depth = if self.is_depth_held {
            'G'
        } else if self.se_depth <= geo::V_QUALITY_LIMITS[0]
            && self.phases_used > geo::N_QUALITY_LIMITS[0]
        {
            ' '
        } else if self.se_depth <= geo::V_QUALITY_LIMITS[1]
            && self.phases_used > geo::N_QUALITY_LIMITS[1]
        {
            '*'
        } else if self.se_depth <= geo::V_QUALITY_LIMITS[2] {
            '?'
        } else {
            '!'
        };

        self.quality = [summary, epicenter, depth].iter().collect();
    }

    /// Maximum tangential and vertical projections of the error
    /// ellipsoid. Not statistically rigorous, but what the regional
    /// networks expect.
    pub fn summarize_errors(&mut self) {
        self.error_h = 0.0;
        self.error_z = 0.0;
        for axis in &self.ellipsoid {
            self.error_h = self.error_h.max(axis.tangential_projection());
            self.error_z = self.error_z.max(axis.vertical_projection());
        }
    }

    /// Zero out the error statistics when no solution is possible.
    pub fn zero_stats(&mut self, all: bool) {
        self.se_time = 0.0;
        self.se_latitude = 0.0;
        self.se_longitude = 0.0;
        self.se_depth = 0.0;
        self.error_h = 0.0;
        self.error_z = 0.0;
        self.error_avg_h = 0.0;
        self.ellipsoid = [EllipseAxis::default(); 3];
        if all {
            self.se_residual = 0.0;
        }
    }

    /// Zero out the data importances and weights when they cannot be
    /// computed.
    pub fn zero_weights(&mut self) {
        for pick in &mut self.picks {
            pick.weight = 0.0;
            pick.importance = 0.0;
        }
    }

    /// Total horizontal and vertical movement since the first audit in
    /// kilometers.
    fn total_movement(&self) -> (f64, f64) {
        match self.audits.first() {
            Some(start) => {
                let start_trig = geo::TrigCache::new(start.colatitude, start.longitude);
                let (delta, _) = geo::delta_azimuth(&start_trig, self.hypocenter.trig());
                (delta * geo::DEG2KM, (self.hypocenter.depth - start.depth).abs())
            }
            None => (0.0, 0.0),
        }
    }

    /// Map the final internal status onto the exit code reported to
    /// clients.
    pub fn set_exit_code(&mut self, status: LocStatus) {
        self.exit_code = match status {
            LocStatus::Success
            | LocStatus::NearlyConverged
            | LocStatus::DidNotConverge
            | LocStatus::UnstableSolution => {
                let (moved_h, moved_z) = self.total_movement();
                if moved_h > geo::DELTA_TOLERANCE || moved_z > geo::DEPTH_TOLERANCE {
                    LocStatus::SuccessfulLocation
                } else {
                    LocStatus::DidNotMove
                }
            }
            LocStatus::SingularMatrix | LocStatus::EllipsoidFailed => LocStatus::ErrorsNotComputed,
            LocStatus::InsufficientData => LocStatus::InsufficientData,
            LocStatus::BadDepth => LocStatus::BadDepth,
            LocStatus::LocationFailed => LocStatus::LocationFailed,
            _ => LocStatus::UnknownStatus,
        };
    }

    /// Group indices sorted by (distance, first arrival), the output
    /// ordering.
    pub fn groups_by_distance(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.groups.len()).collect();
        order.sort_by(|&a, &b| {
            let ga = &self.groups[a];
            let gb = &self.groups[b];
            (ga.delta, ga.first_arrival(&self.picks))
                .partial_cmp(&(gb.delta, gb.first_arrival(&self.picks)))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pick::AuthorType;

    fn pick_at(station: &Arc<Station>, time: f64) -> Pick {
        Pick::new(
            "",
            station.clone(),
            "BHZ",
            "US-NEIC",
            "auto",
            AuthorType::LocalAutomatic,
            time,
            0.5,
            1.0,
            true,
            "P",
            "",
        )
    }

    fn event_with_stations(coords: &[(f64, f64)]) -> Event {
        let mut event = Event::new("ak135", Hypocenter::new(0.0, 0.0, 0.0, 10.0));
        for (j, &(lat, lon)) in coords.iter().enumerate() {
            let station = Arc::new(Station::new(
                StationId::new(format!("S{j:02}"), "XX", ""),
                lat,
                lon,
                0.0,
            ));
            event.picks.push(pick_at(&station, 30.0 + j as f64));
        }
        event.init(0.0, 0.0);
        event
    }

    #[test]
    fn init_groups_picks_by_station() {
        let station =
            Arc::new(Station::new(StationId::new("DUG", "US", ""), 40.195, -112.813, 1.477));
        let other = Arc::new(Station::new(StationId::new("ANMO", "IU", ""), 34.946, -106.457, 1.85));
        let mut event = Event::new("ak135", Hypocenter::new(0.0, 40.0, -110.0, 10.0));
        event.picks.push(pick_at(&station, 50.0));
        event.picks.push(pick_at(&other, 40.0));
        event.picks.push(pick_at(&station, 45.0));
        event.init(0.0, 0.0);

        assert_eq!(event.groups.len(), 2);
        assert_eq!(event.stations_associated, 2);
        assert_eq!(event.phases_associated, 3);
        // Within a group the picks are time-ordered.
        let dug = event
            .groups
            .iter()
            .find(|g| g.station.id.station == "DUG")
            .unwrap();
        let times: Vec<f64> = dug
            .pick_indices
            .iter()
            .map(|&i| event.picks[i].arrival_time)
            .collect();
        assert_eq!(times, vec![45.0, 50.0]);
    }

    #[test]
    fn held_location_simulates_depth_prior() {
        let mut event = Event::new("ak135", Hypocenter::new(0.0, 40.0, -110.0, 33.0));
        event.is_location_held = true;
        event.init(0.0, 0.0);
        let bayes = event.hypocenter.bayes.unwrap();
        assert_eq!(bayes.depth, 33.0);
        assert_eq!(bayes.spread, geo::DEFAULT_DEPTH_SE);
        assert!(event.is_depth_manual);
    }

    #[test]
    fn azimuth_gap_surrounded_versus_one_sided() {
        let mut surrounded = event_with_stations(&[(2.0, 0.0), (0.0, 2.0), (-2.0, 0.0), (0.0, -2.0)]);
        surrounded.compute_azimuth_gaps();
        assert!(surrounded.azimuthal_gap <= 100.0);

        let mut one_sided = event_with_stations(&[(2.0, 0.1), (2.0, -0.1), (2.5, 0.0)]);
        one_sided.compute_azimuth_gaps();
        assert!(one_sided.azimuthal_gap > 300.0);
        assert_eq!(one_sided.robust_gap, 360.0_f64.min(one_sided.robust_gap));
    }

    #[test]
    fn exit_code_tracks_total_movement() {
        let mut event = event_with_stations(&[(2.0, 0.0)]);
        event.add_audit(0, 0, LocStatus::Success);
        event.set_exit_code(LocStatus::Success);
        assert_eq!(event.exit_code, LocStatus::DidNotMove);

        // Move the hypocenter well past the tolerances.
        event.update_hypo(0.0, 0.3, 0.0, 10.0);
        event.set_exit_code(LocStatus::Success);
        assert_eq!(event.exit_code, LocStatus::SuccessfulLocation);

        event.set_exit_code(LocStatus::InsufficientData);
        assert_eq!(event.exit_code, LocStatus::InsufficientData);
    }

    #[test]
    fn insufficient_data_quality_is_d() {
        let mut event = event_with_stations(&[(2.0, 0.0)]);
        event.set_quality_flags(LocStatus::InsufficientData);
        assert_eq!(event.quality, "D  ");
    }
}
