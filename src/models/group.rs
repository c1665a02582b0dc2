//! Pick groups: all the picks recorded at one station.

use std::sync::Arc;

use crate::geo;
use crate::models::hypocenter::Hypocenter;
use crate::models::pick::Pick;
use crate::models::station::Station;
use crate::models::wresidual::{ResidualSource, WeightedResidual};

/// The picks from one station, ordered by arrival time, together with the
/// station geometry relative to the current hypocenter.
#[derive(Debug, Clone)]
pub struct PickGroup {
    pub station: Arc<Station>,
    /// Indices into the event pick list, sorted by arrival time
    pub pick_indices: Vec<usize>,
    /// Epicentral distance in degrees
    pub delta: f64,
    /// Azimuth from the source to the station in degrees
    pub azimuth: f64,
    /// Best cumulative figure-of-merit seen for the current cluster
    pub cumulative_fom: f64,
}

impl PickGroup {
    pub fn new(station: Arc<Station>, first_pick: usize) -> Self {
        Self {
            station,
            pick_indices: vec![first_pick],
            delta: 0.0,
            azimuth: 0.0,
            cumulative_fom: 0.0,
        }
    }

    /// Recompute distance and azimuth after the hypocenter moved.
    pub fn update_geometry(&mut self, hypo: &Hypocenter) {
        let (delta, azimuth) = geo::delta_azimuth(hypo.trig(), self.station.trig());
        self.delta = delta;
        self.azimuth = azimuth;
    }

    pub fn num_picks(&self) -> usize {
        self.pick_indices.len()
    }

    pub fn picks_used(&self, picks: &[Pick]) -> usize {
        self.pick_indices.iter().filter(|&&i| picks[i].is_used).count()
    }

    /// Arrival time of the earliest pick in the group.
    pub fn first_arrival(&self, picks: &[Pick]) -> f64 {
        self.pick_indices
            .first()
            .map(|&i| picks[i].arrival_time)
            .unwrap_or(f64::MAX)
    }

    /// Travel-time design row for one assignment at this station: the
    /// derivatives with respect to a local (south, east, down) kilometer
    /// step at the source.
    pub fn design_row(&self, dtdd: f64, dtdz: f64) -> [f64; 3] {
        let azimuth = self.azimuth.to_radians();
        [
            dtdd * azimuth.cos() / geo::DEG2KM,
            -dtdd * azimuth.sin() / geo::DEG2KM,
            dtdz,
        ]
    }

    /// Fold the winning assignments into the picks, recompute residuals
    /// (and weights, if requested), and append the weighted residuals of
    /// the used picks. A used pick that lost its identification entirely
    /// is triaged out of the solution.
    ///
    /// Returns true if any used pick's phase code changed.
    pub fn update_identifications(
        &self,
        picks: &mut [Pick],
        reweight: bool,
        residuals: &mut Vec<WeightedResidual>,
    ) -> bool {
        let mut changed = false;

        for &idx in &self.pick_indices {
            let pick = &mut picks[idx];
            match pick.assignment.clone() {
                Some(assignment) => {
                    if pick.is_used && pick.current_code != assignment.phase {
                        changed = true;
                    }
                    pick.current_code = assignment.phase.clone();
                    pick.residual = pick.travel_time() - assignment.tt;
                    if reweight {
                        pick.weight = 1.0 / assignment.spread.max(1e-3);
                    }
                    if pick.is_used {
                        residuals.push(WeightedResidual::new(
                            ResidualSource::Phase(idx),
                            pick.residual,
                            pick.weight,
                            self.design_row(assignment.dtdd, assignment.dtdz),
                        ));
                    }
                }
                None => {
                    if pick.is_used && !pick.force_association {
                        pick.is_triage = true;
                        pick.is_used = false;
                        pick.current_code.clear();
                        changed = true;
                    }
                }
            }
        }

        changed
    }
}
