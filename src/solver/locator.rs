//! The location engine façade and its staged outer loop.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{LocatorError, Result};
use crate::io::request::{LocationRequest, LocationResult};
use crate::models::event::Event;
use crate::refdata::AuxData;
use crate::solver::initial_id::{self, InitialIdOutcome};
use crate::solver::stepper::Stepper;
use crate::solver::{ellipsoid, StageConfig, DISPERSION_TOLERANCE, STAGES};
use crate::status::LocStatus;
use crate::traveltime::{Session, TravelTimeModel};

/// Figure-of-merit controls used when the location is held and for the
/// restart re-identification.
const HELD_STAGE: StageConfig = StageConfig {
    other_weight: 0.1,
    sticky_weight: 1.0,
    reidentify: true,
    reweight: true,
    convergence_limit: 1.0,
    max_step_length: 0.0,
    max_iterations: 0,
};

/// One location engine: immutable reference data plus a travel-time
/// model, shareable across threads. Each `locate` call builds its own
/// event, session, and stepper, so distinct events can run in parallel
/// on clones of the same locator.
#[derive(Clone)]
pub struct Locator {
    aux: Arc<AuxData>,
    model: Arc<dyn TravelTimeModel>,
}

impl Locator {
    pub fn new(aux: Arc<AuxData>, model: Arc<dyn TravelTimeModel>) -> Self {
        Self { aux, model }
    }

    /// Name of the travel-time model backing this engine.
    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Locate one event from its wire request.
    ///
    /// Numerical anomalies never surface as errors here: they are folded
    /// into the exit code with the best partial result. Only malformed
    /// input and I/O-level failures are `Err`.
    pub fn locate(&self, request: &LocationRequest) -> Result<LocationResult> {
        let mut event = request.to_event()?;
        self.run(&mut event, request.reassess_initial_phase_ids)?;
        Ok(LocationResult::from_event(&event))
    }

    /// Run the staged location on a prepared event, finalizing the
    /// statistics, quality flags, and exit code.
    pub fn run(&self, event: &mut Event, reassess_initial_ids: bool) -> Result<LocStatus> {
        let mut session = Session::new(self.model.clone());
        let mut stepper = Stepper::new(self.aux.clone());

        let status = self.iterate(event, &mut session, &mut stepper, reassess_initial_ids)?;
        self.finalize(event, status);
        Ok(event.exit_code)
    }

    fn iterate(
        &self,
        event: &mut Event,
        session: &mut Session,
        stepper: &mut Stepper,
        reassess_initial_ids: bool,
    ) -> Result<LocStatus> {
        // Bail out before moving anything at all.
        if event.stations_used < 3 {
            return Ok(LocStatus::InsufficientData);
        }

        stepper.set_environment(event);
        if let Err(error) = session.configure(event.hypocenter.depth, event.is_tectonic) {
            match error {
                LocatorError::BadDepth(depth) => {
                    let (min_depth, max_depth) = session.depth_range();
                    let clamped = depth.clamp(min_depth, max_depth);
                    if (clamped - depth).abs() > crate::geo::DEPTH_TOLERANCE {
                        return Ok(LocStatus::BadDepth);
                    }
                    let hypo = &event.hypocenter;
                    let (origin, lat, lon) = (hypo.origin_time, hypo.latitude, hypo.longitude);
                    event.update_hypo(origin, lat, lon, clamped);
                    session.configure(clamped, event.is_tectonic)?;
                }
                other => return Err(other),
            }
        }

        // A held location is never iterated: identify the phases at the
        // fixed hypocenter so the error statistics remain meaningful.
        if event.is_location_held {
            debug!("location held, skipping iteration");
            let status = stepper.do_phase_identification(event, session, &HELD_STAGE)?;
            event.add_audit(0, 0, status);
            return Ok(status);
        }

        if reassess_initial_ids {
            if initial_id::run(event, session)? == InitialIdOutcome::RestartReidentify {
                // Re-identify everything against the corrected origin.
                let status = stepper.do_phase_identification(event, session, &HELD_STAGE)?;
                if status != LocStatus::Success {
                    return Ok(status);
                }
            }
        }

        let mut final_status = LocStatus::Success;

        'stages: for (stage_index, stage) in STAGES.iter().enumerate() {
            event.reset_triage();
            if stage_index == 1 {
                // Reinstate picks the initial identification benched.
                initial_id::reset_use_flags(event);
            }

            let status = stepper.do_phase_identification(event, session, stage)?;
            if status != LocStatus::Success {
                final_status = status;
                break 'stages;
            }
            event.add_audit(stage_index, 0, status);

            let mut previous_dispersion = event.hypocenter.dispersion;
            for iteration in 0..stage.max_iterations {
                let step_status =
                    stepper.make_step(event, session, stage, stage_index, iteration)?;
                event.add_audit(stage_index, iteration + 1, step_status);

                match step_status {
                    LocStatus::InsufficientData | LocStatus::BadDepth => {
                        final_status = step_status;
                        break 'stages;
                    }
                    LocStatus::PhaseIdChanged => {
                        // The identification moved under us; the new
                        // dispersion reference is already in place.
                        previous_dispersion = event.hypocenter.dispersion;
                    }
                    LocStatus::NearlyConverged
                    | LocStatus::DidNotConverge
                    | LocStatus::UnstableSolution => {
                        final_status = step_status;
                        break;
                    }
                    _ => {
                        final_status = LocStatus::Success;
                        if event.hypocenter.step_length <= stage.convergence_limit {
                            break;
                        }
                        let dispersion = event.hypocenter.dispersion;
                        if (previous_dispersion - dispersion).abs()
                            <= DISPERSION_TOLERANCE * previous_dispersion.max(1e-12)
                        {
                            break;
                        }
                        previous_dispersion = dispersion;
                    }
                }
            }

            event.save_weighted_residuals();
        }

        if final_status == LocStatus::PhaseIdChanged {
            final_status = LocStatus::Success;
        }
        Ok(final_status)
    }

    /// Final statistics, error ellipsoid, quality flags, and exit code.
    fn finalize(&self, event: &mut Event, status: LocStatus) {
        event.compute_station_stats();
        event.compute_azimuth_gaps();

        let mut status = status;
        match status {
            LocStatus::InsufficientData | LocStatus::BadDepth => {
                event.zero_stats(true);
                event.zero_weights();
            }
            _ => {
                let error_status = ellipsoid::compute_errors(event);
                if error_status != LocStatus::Success {
                    status = error_status;
                }
            }
        }

        event.set_quality_flags(status);
        event.set_exit_code(status);
        info!(
            hypo = %event.hypocenter,
            status = %status,
            exit = %event.exit_code,
            quality = %event.quality,
            "location finished"
        );
    }
}
