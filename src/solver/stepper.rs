//! The iteration kernel: environment, identification, step, damping.

use std::sync::Arc;

use tracing::debug;

use crate::error::{LocatorError, Result};
use crate::geo;
use crate::models::audit::HypoAudit;
use crate::models::event::Event;
use crate::refdata::AuxData;
use crate::solver::decorrelator::Decorrelator;
use crate::solver::estimator::{self, Basis};
use crate::solver::linear_step::{self, StepResult};
use crate::solver::phase_id;
use crate::solver::StageConfig;
use crate::status::LocStatus;
use crate::traveltime::Session;

/// Drives the hypocenter through rank-sum-estimator steps. One instance
/// per engine; borrows the event mutably for the duration of each call.
pub struct Stepper {
    aux: Arc<AuxData>,
    decorrelator: Decorrelator,
    last_result: StepResult,
}

impl Stepper {
    pub fn new(aux: Arc<AuxData>) -> Self {
        Self {
            aux,
            decorrelator: Decorrelator::new(),
            last_result: StepResult {
                step_length: 0.0,
                median: 0.0,
                dispersion: 0.0,
            },
        }
    }

    /// The most recent rank-sum estimation result.
    pub fn last_result(&self) -> StepResult {
        self.last_result
    }

    /// Set the location environment: the tectonic flag from the craton
    /// polygons and, unless an analyst pinned it, the Bayesian depth
    /// from the zone statistics.
    pub fn set_environment(&self, event: &mut Event) {
        event.is_tectonic = !self
            .aux
            .cratons
            .contains(event.hypocenter.latitude, event.hypocenter.longitude);
        debug!(tectonic = event.is_tectonic, "location environment");

        if !event.is_depth_manual {
            let (bayes_depth, bayes_spread) = self
                .aux
                .zone_stats
                .bayes_depth(event.hypocenter.latitude, event.hypocenter.longitude);
            event.hypocenter.update_bayes(bayes_depth, bayes_spread);
        }
    }

    /// Phase identification plus the rank-sum-estimator preliminaries,
    /// updating the reference dispersion on success.
    pub fn do_phase_identification(
        &mut self,
        event: &mut Event,
        session: &mut Session,
        stage: &StageConfig,
    ) -> Result<LocStatus> {
        let status = self.internal_phase_id(
            event,
            session,
            stage.other_weight,
            stage.sticky_weight,
            stage.reidentify,
            stage.reweight,
        )?;
        if status == LocStatus::Success {
            event.hypocenter.dispersion = self.last_result.dispersion;
        }
        Ok(status)
    }

    /// Identification and estimator preliminaries without touching the
    /// reference dispersion (the step logic decides whether to adopt it).
    fn internal_phase_id(
        &mut self,
        event: &mut Event,
        session: &mut Session,
        other_weight: f64,
        sticky_weight: f64,
        reidentify: bool,
        reweight: bool,
    ) -> Result<LocStatus> {
        if reweight {
            self.set_environment(event);
        }

        if let Err(error) = session.configure(event.hypocenter.depth, event.is_tectonic) {
            match error {
                LocatorError::BadDepth(depth) => {
                    // Clamp into the legal range; only an excessive clamp
                    // is fatal.
                    let (min_depth, max_depth) = session.depth_range();
                    let clamped = depth.clamp(min_depth, max_depth);
                    if (clamped - depth).abs() > geo::DEPTH_TOLERANCE {
                        return Ok(LocStatus::BadDepth);
                    }
                    let (origin, latitude, longitude) = (
                        event.hypocenter.origin_time,
                        event.hypocenter.latitude,
                        event.hypocenter.longitude,
                    );
                    event.update_hypo(origin, latitude, longitude, clamped);
                    session.configure(clamped, event.is_tectonic)?;
                }
                other => return Err(other),
            }
        }

        event.has_phase_id_changed = phase_id::identify(
            event,
            session,
            other_weight,
            sticky_weight,
            reidentify,
            reweight,
        );

        if event.stations_used < 3 {
            return Ok(LocStatus::InsufficientData);
        }

        let degrees_of_freedom = event.hypocenter.degrees_of_freedom;
        let (median, dispersion, direction);

        if event.use_decorrelation {
            median = estimator::compute_median(&event.residuals_raw, Basis::Residual);
            estimator::de_median_residuals(&mut event.residuals_raw, median);
            // The projection works from the de-medianed residuals.
            event.save_weighted_residuals();

            if event.has_phase_id_changed {
                self.decorrelator.decorrelate(event);
            }
            self.decorrelator.project(event);

            estimator::de_median_design(&mut event.residuals_projected);
            dispersion = estimator::dispersion(&event.residuals_projected, Basis::Residual);
            direction =
                estimator::steepest_descent(&event.residuals_projected, degrees_of_freedom);
        } else {
            median = estimator::compute_median(&event.residuals_raw, Basis::Residual);
            estimator::de_median_residuals(&mut event.residuals_raw, median);
            estimator::de_median_design(&mut event.residuals_raw);
            dispersion = estimator::dispersion(&event.residuals_raw, Basis::Residual);
            direction = estimator::steepest_descent(&event.residuals_raw, degrees_of_freedom);
        }

        event.hypocenter.step_direction = direction;
        self.last_result = StepResult {
            step_length: 0.0,
            median,
            dispersion,
        };

        Ok(LocStatus::Success)
    }

    /// Make one step from the current hypocenter towards the dispersion
    /// minimum along the steepest-descent direction, damping the step
    /// when the linearization overshoots.
    pub fn make_step(
        &mut self,
        event: &mut Event,
        session: &mut Session,
        stage: &StageConfig,
        stage_index: usize,
        iteration: usize,
    ) -> Result<LocStatus> {
        // Reference point for the step length damping.
        let audit = HypoAudit::new(
            &event.hypocenter,
            stage_index,
            iteration,
            event.phases_used,
            LocStatus::Success,
        );

        event.hypocenter.damping_count = 0;
        let damp = geo::dampening_factor(iteration);
        event.hypocenter.step_length = event
            .hypocenter
            .step_length
            .max(2.0 * stage.convergence_limit);

        let direction = event.hypocenter.step_direction;
        let initial_step = event.hypocenter.step_length;
        let reference_dispersion = event.hypocenter.dispersion;
        let result = {
            let rows = if event.use_decorrelation {
                &mut event.residuals_projected
            } else {
                &mut event.residuals_raw
            };
            linear_step::step_length(
                rows,
                &direction,
                initial_step,
                stage.convergence_limit,
                stage.max_step_length,
            )?
        };
        self.last_result = result;

        // This weird special case appears once in a while: nothing
        // descends, and the remaining step is already negligible.
        if result.dispersion >= reference_dispersion
            && result.step_length < stage.convergence_limit
        {
            event.hypocenter.step_length = result.step_length;
            event.hypocenter.del_h = 0.0;
            event.hypocenter.del_z = 0.0;
            self.log_step(event, "step", stage_index, iteration, LocStatus::Success);
            return Ok(LocStatus::Success);
        }

        // Take the step and the line-search origin-time shift.
        event.hypocenter.time_shift = result.median;
        event.step_hypo(result.step_length, result.median);

        // Re-identify and get the non-linear estimator parameters at the
        // new hypocenter.
        if self.internal_phase_id(event, session, 0.01, 5.0, false, false)?
            == LocStatus::InsufficientData
        {
            return Ok(LocStatus::InsufficientData);
        }
        event.shift_origin(self.last_result.median);

        // If the identification changed we have to start over.
        if event.has_phase_id_changed {
            event.hypocenter.dispersion = self.last_result.dispersion;
            self.log_step(event, "re-id", stage_index, iteration, LocStatus::PhaseIdChanged);
            return Ok(LocStatus::PhaseIdChanged);
        }

        // Headed downhill: this iteration is done.
        if self.last_result.dispersion < event.hypocenter.dispersion {
            event.hypocenter.dispersion = self.last_result.dispersion;
            self.log_step(event, "step", stage_index, iteration, LocStatus::Success);
            return Ok(LocStatus::Success);
        }

        // The linearized step increased the dispersion: damp. The factor
        // is fixed for the whole call; the limit cycle being avoided is a
        // normal step followed by a damped step, over and over.
        loop {
            let give_up = damp * event.hypocenter.step_length <= stage.convergence_limit
                || (event.hypocenter.damping_count > 0 && event.hypocenter.matches(&audit));
            if give_up {
                // Damped into oblivion.
                event.update_hypo(audit.origin_time, audit.latitude, audit.longitude, audit.depth);
                event.hypocenter.del_h = 0.0;
                event.hypocenter.del_z = 0.0;

                let status = if self.last_result.dispersion
                    <= geo::ALMOST_CONVERGED * event.hypocenter.dispersion
                    && event.hypocenter.step_length <= stage.convergence_limit
                {
                    LocStatus::NearlyConverged
                } else if event.hypocenter.step_length <= geo::STEP_TOLERANCE {
                    LocStatus::DidNotConverge
                } else {
                    LocStatus::UnstableSolution
                };
                self.log_step(event, "fail", stage_index, iteration, status);
                return Ok(status);
            }

            event.hypocenter.damping_count += 1;
            event.update_hypo(audit.origin_time, audit.latitude, audit.longitude, audit.depth);
            event.hypocenter.step_length *= damp;
            event.hypocenter.time_shift *= damp;

            let step_length = event.hypocenter.step_length;
            let time_shift = event.hypocenter.time_shift;
            event.step_hypo(step_length, time_shift);

            if self.internal_phase_id(event, session, 0.01, 5.0, false, false)?
                == LocStatus::InsufficientData
            {
                return Ok(LocStatus::InsufficientData);
            }
            event.shift_origin(self.last_result.median);

            if event.has_phase_id_changed {
                event.hypocenter.dispersion = self.last_result.dispersion;
                self.log_step(event, "re-id", stage_index, iteration, LocStatus::PhaseIdChanged);
                return Ok(LocStatus::PhaseIdChanged);
            }

            self.log_step(event, "damp", stage_index, iteration, LocStatus::Success);
            if self.last_result.dispersion < event.hypocenter.dispersion {
                event.hypocenter.dispersion = self.last_result.dispersion;
                return Ok(LocStatus::Success);
            }
        }
    }

    /// Update the least-squares-equivalent RMS and emit the step record.
    fn log_step(
        &self,
        event: &mut Event,
        kind: &str,
        stage: usize,
        iteration: usize,
        status: LocStatus,
    ) {
        let used = if event.use_decorrelation {
            event.projected_phases_used
        } else {
            event.phases_used
        };
        let degrees_of_freedom = event.hypocenter.degrees_of_freedom;
        event.hypocenter.rms = if used >= degrees_of_freedom {
            event.hypocenter.dispersion / (used - degrees_of_freedom + 1) as f64
        } else {
            0.0
        };

        debug!(
            kind,
            stage,
            iteration,
            used,
            latitude = event.hypocenter.latitude,
            longitude = event.hypocenter.longitude,
            depth = event.hypocenter.depth,
            del_h = event.hypocenter.del_h,
            del_z = event.hypocenter.del_z,
            rms = event.hypocenter.rms,
            %status,
            "step record"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::hypocenter::Hypocenter;
    use crate::models::pick::{AuthorType, Pick};
    use crate::models::station::{Station, StationId};
    use crate::refdata::{Craton, Cratons, ZoneStats};
    use crate::traveltime::synthetic::SyntheticModel;
    use crate::traveltime::TravelTimeModel;
    use approx::assert_relative_eq;

    fn aux_with_craton() -> Arc<AuxData> {
        let craton = Craton::new(
            "North America",
            vec![60.0, 59.9, 30.0, 30.1, 60.0],
            vec![-110.0, -85.0, -85.1, -110.0, -110.0],
        );
        Arc::new(AuxData::new(
            Cratons::new(vec![craton]),
            ZoneStats::empty(),
        ))
    }

    fn event_at(latitude: f64, longitude: f64) -> Event {
        Event::new("synthetic", Hypocenter::new(0.0, latitude, longitude, 15.0))
    }

    #[test]
    fn environment_sets_the_tectonic_flag() {
        let stepper = Stepper::new(aux_with_craton());

        let mut inside = event_at(45.0, -100.0);
        stepper.set_environment(&mut inside);
        assert!(!inside.is_tectonic);

        let mut outside = event_at(35.0, 140.0);
        stepper.set_environment(&mut outside);
        assert!(outside.is_tectonic);
    }

    #[test]
    fn environment_is_idempotent() {
        let stepper = Stepper::new(aux_with_craton());
        let mut event = event_at(45.0, -100.0);

        stepper.set_environment(&mut event);
        let tectonic = event.is_tectonic;
        let bayes = event.hypocenter.bayes;

        stepper.set_environment(&mut event);
        assert_eq!(event.is_tectonic, tectonic);
        assert_eq!(event.hypocenter.bayes, bayes);
    }

    #[test]
    fn analyst_depth_is_not_overwritten() {
        let stepper = Stepper::new(aux_with_craton());
        let mut event = event_at(45.0, -100.0);
        event.is_depth_manual = true;
        event.hypocenter.add_analyst_bayes(33.0, 5.0);

        stepper.set_environment(&mut event);
        let bayes = event.hypocenter.bayes.unwrap();
        assert_relative_eq!(bayes.depth, 33.0);
        assert_relative_eq!(bayes.spread, 5.0);
    }

    #[test]
    fn too_few_stations_is_insufficient_data() {
        let model: Arc<dyn TravelTimeModel> = Arc::new(SyntheticModel::new());
        let mut session = Session::new(model.clone());

        let mut event = event_at(0.0, 0.0);
        for (j, (lat, lon)) in [(1.5, 0.2), (0.3, 1.4)].iter().enumerate() {
            let station = Arc::new(Station::new(
                StationId::new(format!("S{j}"), "XX", ""),
                *lat,
                *lon,
                0.0,
            ));
            let (delta, _) = geo::delta_azimuth(event.hypocenter.trig(), station.trig());
            let p = model
                .arrivals(15.0, delta, 0.0, true)
                .into_iter()
                .find(|a| a.phase == "P")
                .unwrap();
            event.picks.push(Pick::new(
                format!("{j}"),
                station,
                "BHZ",
                "US-NEIC",
                "auto",
                AuthorType::LocalAutomatic,
                p.tt,
                0.5,
                1.0,
                true,
                "P",
                "",
            ));
        }
        event.init(0.0, 0.0);

        let mut stepper = Stepper::new(aux_with_craton());
        let status = stepper
            .do_phase_identification(&mut event, &mut session, &crate::solver::STAGES[0])
            .unwrap();
        assert_eq!(status, LocStatus::InsufficientData);
    }
}
