//! Initial phase identification.
//!
//! Before any location iteration, a tentative pass over the first
//! arrivals fixes the origin time robustly and weeds out automatic picks
//! that cannot be trusted yet. If many first arrivals look misidentified
//! the cleanup gets draconian.

use tracing::debug;

use crate::error::Result;
use crate::geo;
use crate::models::event::Event;
use crate::models::wresidual::{ResidualSource, WeightedResidual};
use crate::solver::estimator::{self, Basis};
use crate::traveltime::Session;

/// What the caller must do after the initial pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialIdOutcome {
    Done,
    /// The location was restarted externally: run a full
    /// re-identification against the corrected origin time.
    RestartReidentify,
}

/// Phase codes that are never treated as misidentified first arrivals
/// (core phases and crustal shear phases).
fn is_exempt_code(code: &str) -> bool {
    code.starts_with("PK")
        || code.starts_with("P'")
        || code.starts_with("Sc")
        || matches!(code, "Sg" | "Sb" | "Sn" | "Lg")
}

/// Run the initial identification: compute tentative residuals for the
/// usable first arrivals, correct the origin time from their weighted
/// median, and thin out the automatic picks.
pub fn run(event: &mut Event, session: &Session) -> Result<InitialIdOutcome> {
    event.residuals_raw.clear();

    let mut bad_first_arrivals = 0usize;

    {
        let Event {
            groups,
            picks,
            residuals_raw,
            hypocenter,
            ..
        } = &mut *event;

        for group in groups.iter() {
            if group.picks_used(picks) == 0 || group.delta > 100.0 {
                continue;
            }
            let arrivals = session.arrivals(group.delta, group.station.elevation);
            if arrivals.is_empty() {
                continue;
            }

            let first = group.pick_indices[0];
            let pick = &mut picks[first];
            if !pick.is_used || is_exempt_code(&pick.current_code) {
                continue;
            }

            // Based on a tentative identification, just compute residuals
            // and weights so a robust origin-time correction can be made.
            // The tentative identification itself is not remembered.
            if pick.is_automatic() {
                let first_arrival = &arrivals[0];
                if pick.current_code != first_arrival.phase {
                    bad_first_arrivals += 1;
                }
                pick.residual = pick.travel_time() - first_arrival.tt;
                pick.weight = 1.0 / first_arrival.spread.max(1e-3);
            } else {
                let matching = arrivals
                    .iter()
                    .find(|a| a.phase == pick.current_code)
                    .unwrap_or(&arrivals[0]);
                pick.residual = pick.travel_time() - matching.tt;
                pick.weight = 1.0 / matching.spread.max(1e-3);
            }

            residuals_raw.push(WeightedResidual::new(
                ResidualSource::Phase(first),
                pick.residual,
                pick.weight,
                [0.0, 0.0, 0.0],
            ));
        }

        // The estimator expects the depth prior as the final entry.
        residuals_raw.push(WeightedResidual::depth_prior(
            hypocenter.depth_residual(),
            hypocenter.depth_weight(),
        ));
    }

    // Adjusting the origin time to something reasonable gives the later
    // identifications a chance.
    let median = estimator::compute_median(&event.residuals_raw, Basis::Residual);
    event.shift_origin(median);
    debug!(median, bad_first_arrivals, "initial origin correction");

    if event.is_location_restarted {
        return Ok(InitialIdOutcome::RestartReidentify);
    }

    event.compute_station_stats();
    if (bad_first_arrivals as f64) < geo::BAD_P_RATIO * event.stations_used as f64 {
        simple_cleanup(event);
    } else {
        complex_cleanup(event, session);
    }

    Ok(InitialIdOutcome::Done)
}

/// The initial identification is mostly making sense: drop automatic
/// first arrivals that are not crust or mantle P, and all secondary
/// automatics.
fn simple_cleanup(event: &mut Event) {
    let Event { groups, picks, .. } = &mut *event;
    for group in groups.iter() {
        if group.picks_used(picks) == 0 {
            continue;
        }
        let first = group.pick_indices[0];
        {
            let pick = &mut picks[first];
            if pick.is_automatic()
                && pick.is_used
                && !matches!(pick.current_code.as_str(), "Pg" | "Pb" | "Pn" | "P")
            {
                pick.is_used = false;
            }
        }
        for &index in group.pick_indices.iter().skip(1) {
            let pick = &mut picks[index];
            if pick.is_automatic() && pick.is_used {
                pick.is_used = false;
            }
        }
    }
}

/// Too many misidentified first arrivals: force automatic first arrivals
/// to the first theoretical phase where plausible, drop them otherwise,
/// and drop all secondary automatics.
fn complex_cleanup(event: &mut Event, session: &Session) {
    let Event { groups, picks, .. } = &mut *event;
    for group in groups.iter() {
        if group.picks_used(picks) == 0 {
            continue;
        }
        let first = group.pick_indices[0];
        {
            let pick = &mut picks[first];
            if pick.is_automatic() && pick.is_used {
                if group.delta <= 100.0 && !is_exempt_code(&pick.current_code) {
                    let arrivals = session.arrivals(group.delta, group.station.elevation);
                    if let Some(first_arrival) = arrivals.first() {
                        pick.current_code = first_arrival.phase.clone();
                    }
                } else {
                    // A core phase or an unusual code: just don't use it.
                    pick.is_used = false;
                }
            }
        }
        for &index in group.pick_indices.iter().skip(1) {
            let pick = &mut picks[index];
            if pick.is_automatic() && pick.is_used {
                pick.is_used = false;
            }
        }
    }
}

/// Reinstate picks that were temporarily removed, up to their external
/// use commands.
pub fn reset_use_flags(event: &mut Event) {
    for pick in &mut event.picks {
        if !pick.is_used {
            pick.is_used = pick.external_use;
        }
    }
}
