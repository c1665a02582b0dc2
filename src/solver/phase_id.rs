//! Phase identification: associating theoretical arrivals with picks.
//!
//! For each pick group the theoretical phases are clustered by
//! overlapping arrival-time windows; within each cluster every
//! order-preserving assignment of picks to phases is scored by a
//! cumulative figure-of-merit (probability x observability x proximity
//! boost) and the best assignment wins. A separate no-reidentification
//! path merely tries to keep the existing identifications alive.

use tracing::{debug, trace};

use crate::geo;
use crate::models::event::Event;
use crate::models::group::PickGroup;
use crate::models::pick::{AuthorType, Pick, TtAssignment};
use crate::models::wresidual::WeightedResidual;
use crate::traveltime::phases;
use crate::traveltime::{Session, TtArrival};

/// Run phase identification over the whole event.
///
/// `other_weight` prices a move to an unrelated phase, `sticky_weight`
/// resists changing the current identification, `reidentify` selects the
/// full figure-of-merit pass over the keep-what-we-have pass, and
/// `reweight` refreshes the residual weights from the phase spreads.
///
/// Returns true if any used pick's phase code changed.
pub fn identify(
    event: &mut Event,
    session: &Session,
    other_weight: f64,
    sticky_weight: f64,
    reidentify: bool,
    reweight: bool,
) -> bool {
    debug!(hypo = %event.hypocenter, reidentify, "phase identification");

    event.residuals_raw.clear();
    let mut changed = false;

    let Event {
        groups,
        picks,
        residuals_raw,
        hypocenter,
        ..
    } = &mut *event;

    for group in groups.iter_mut() {
        let arrivals = session.arrivals(group.delta, group.station.elevation);

        for &index in &group.pick_indices {
            picks[index].force_association = false;
        }

        if arrivals.is_empty() {
            for &index in &group.pick_indices {
                picks[index].clear_assignment();
            }
        } else if reidentify {
            reidentify_group(group, picks, &arrivals, other_weight, sticky_weight);
        } else {
            no_reidentification(group, picks, &arrivals, other_weight, sticky_weight);
        }

        if group.update_identifications(picks, reweight, residuals_raw) {
            changed = true;
        }
    }

    // The Bayesian depth virtual observation is always the last entry.
    residuals_raw.push(WeightedResidual::depth_prior(
        hypocenter.depth_residual(),
        hypocenter.depth_weight(),
    ));

    event.save_weighted_residuals();
    event.compute_station_stats();

    changed
}

/// The full figure-of-merit identification for one pick group.
fn reidentify_group(
    group: &mut PickGroup,
    picks: &mut [Pick],
    arrivals: &[TtArrival],
    other_weight: f64,
    sticky_weight: f64,
) {
    for &index in &group.pick_indices {
        picks[index].clear_assignment();
    }

    // Pre-fix surface waves identified by trusted sources.
    for &index in &group.pick_indices {
        let pick = &mut picks[index];
        if pick.is_surface_wave() {
            if let Some(arrival) = arrivals.iter().find(|a| a.phase == pick.observed_code) {
                pick.set_assignment(to_assignment(arrival), 0.0);
                pick.force_association = true;
            }
        }
    }

    // Cluster the theoretical phases by overlapping arrival-time windows
    // and identify the picks falling inside each cluster.
    let mut pick_cursor = 0usize;
    let mut first_tt = 0usize;
    let mut min_window = arrivals[0].tt - arrivals[0].window();
    let mut max_window = arrivals[0].tt + arrivals[0].window();

    let mut num_tt = 1usize;
    for (j, arrival) in arrivals.iter().enumerate().skip(1) {
        if arrival.tt - arrival.window() <= max_window {
            min_window = min_window.min(arrival.tt - arrival.window());
            max_window = max_window.max(arrival.tt + arrival.window());
            num_tt += 1;
        } else {
            flush_cluster(
                group,
                picks,
                &mut pick_cursor,
                &arrivals[first_tt..first_tt + num_tt],
                min_window,
                max_window,
                other_weight,
                sticky_weight,
            );
            if pick_cursor >= group.pick_indices.len() {
                break;
            }
            min_window = arrival.tt - arrival.window();
            max_window = arrival.tt + arrival.window();
            first_tt = j;
            num_tt = 1;
        }
    }
    // The trailing cluster.
    if pick_cursor < group.pick_indices.len() {
        flush_cluster(
            group,
            picks,
            &mut pick_cursor,
            &arrivals[first_tt..first_tt + num_tt],
            min_window,
            max_window,
            other_weight,
            sticky_weight,
        );
    }

    // The first arriving phase gets a distance-dependent advantage in
    // its statistical figure-of-merit.
    let correction = geo::distance_correction(group.delta);
    if correction > 1.0 {
        if let Some(&first) = group.pick_indices.first() {
            if picks[first].assignment.is_some() {
                picks[first].statistical_fom /= correction;
            }
        }
    }
}

/// Collect the picks whose travel times fall inside one cluster window,
/// advancing the cursor, and identify them against the cluster's
/// theoretical arrivals.
#[allow(clippy::too_many_arguments)]
fn flush_cluster(
    group: &mut PickGroup,
    picks: &mut [Pick],
    cursor: &mut usize,
    cluster_arrivals: &[TtArrival],
    min_window: f64,
    max_window: f64,
    other_weight: f64,
    sticky_weight: f64,
) {
    let mut cluster_picks: Vec<usize> = Vec::new();
    while *cursor < group.pick_indices.len() {
        let pick = &picks[group.pick_indices[*cursor]];
        if pick.travel_time() > max_window {
            break;
        }
        if pick.travel_time() >= min_window {
            cluster_picks.push(group.pick_indices[*cursor]);
        }
        *cursor += 1;
    }
    if !cluster_picks.is_empty() {
        trace!(
            picks = cluster_picks.len(),
            arrivals = cluster_arrivals.len(),
            window = ?(min_window, max_window),
            "cluster"
        );
        group.cumulative_fom = 0.0;
        identify_cluster(
            group,
            picks,
            &cluster_picks,
            cluster_arrivals,
            other_weight,
            sticky_weight,
        );
    }
}

/// Score every order-preserving one-to-one assignment between the picks
/// and the theoretical arrivals of one cluster, keeping the best.
fn identify_cluster(
    group: &mut PickGroup,
    picks: &mut [Pick],
    cluster_picks: &[usize],
    cluster_arrivals: &[TtArrival],
    other_weight: f64,
    sticky_weight: f64,
) {
    let num_picks = cluster_picks.len();
    let num_tt = cluster_arrivals.len();
    trace!(num_picks, num_tt, "permutations");

    if num_tt >= num_picks {
        for_each_combination(num_tt, num_picks, &mut |combination| {
            let pairs: Vec<(usize, &TtArrival)> = cluster_picks
                .iter()
                .zip(combination.iter())
                .map(|(&pick, &tt)| (pick, &cluster_arrivals[tt]))
                .collect();
            score_assignment(group, picks, &pairs, other_weight, sticky_weight);
        });
    } else {
        for_each_combination(num_picks, num_tt, &mut |combination| {
            let pairs: Vec<(usize, &TtArrival)> = combination
                .iter()
                .zip(cluster_arrivals.iter())
                .map(|(&p, tt)| (cluster_picks[p], tt))
                .collect();
            score_assignment(group, picks, &pairs, other_weight, sticky_weight);
        });
    }
}

/// Compute the cumulative figure-of-merit of one trial assignment and
/// record it on the picks if it is the best so far.
fn score_assignment(
    group: &mut PickGroup,
    picks: &mut [Pick],
    pairs: &[(usize, &TtArrival)],
    other_weight: f64,
    sticky_weight: f64,
) {
    let mut cumulative = 1.0;
    for &(pick_index, arrival) in pairs {
        let pick = &picks[pick_index];
        if pick.is_surface_wave() {
            continue;
        }
        let probability =
            geo::residual_probability(pick.travel_time() - arrival.tt, arrival.spread);
        let amplitude = observability_amplitude(pick, arrival, other_weight, sticky_weight);
        let residual = affinity_residual(pick, arrival);
        let boost = geo::proximity_boost(residual);
        cumulative *= probability * amplitude * boost;
    }

    if cumulative > group.cumulative_fom {
        group.cumulative_fom = cumulative;
        for &(pick_index, arrival) in pairs {
            if !picks[pick_index].is_surface_wave() {
                let fom = affinity_residual(&picks[pick_index], arrival);
                picks[pick_index].set_assignment(to_assignment(arrival), fom);
            }
        }
    }
}

/// The modified phase "amplitude": the observability with the empirical
/// weights reflecting how well the observed phase matches the candidate.
fn observability_amplitude(
    pick: &Pick,
    arrival: &TtArrival,
    other_weight: f64,
    sticky_weight: f64,
) -> f64 {
    let observed_group = phases::find_group(
        pick.best_code(),
        pick.author_type == AuthorType::ContributedAutomatic,
    );
    let generic = phases::is_generic(pick.best_code(), observed_group);
    let primary = phases::is_primary(observed_group);

    let mut amplitude = if arrival.is_dist_discriminated {
        geo::DOWN_WEIGHT * arrival.observability
    } else {
        arrival.observability
    };

    // Group logic. An exact phase-code match drops through unless the
    // code is generic.
    if (pick.best_code() != arrival.phase || generic) && observed_group != "Any" {
        let group_match = if generic && primary {
            // A generic P might be either a P or a PKP; regional
            // contributed automatics match any regional phase.
            observed_group == arrival.group
                || arrival.aux_group == Some(observed_group)
                || (observed_group == "Reg" && arrival.is_regional)
        } else {
            observed_group == arrival.group
        };

        if group_match {
            amplitude *= geo::GROUP_WEIGHT;
        } else {
            amplitude *= other_weight;
            // A trusted pick that disagrees on P versus S is even harder
            // to move.
            if !pick.is_automatic()
                && geo::is_p_type(observed_group) != geo::is_p_type(&arrival.phase)
            {
                amplitude *= geo::TYPE_WEIGHT;
            }
        }
    }

    // The affinity rewards the exact phase the analyst named.
    if pick.best_code() == arrival.phase {
        amplitude *= pick.affinity;
    }
    // Hysteresis: the existing identification is harder to change.
    if pick.current_code == arrival.phase {
        amplitude *= sticky_weight;
    }

    amplitude
}

/// The affinity-weighted travel-time residual of one pairing.
fn affinity_residual(pick: &Pick, arrival: &TtArrival) -> f64 {
    let affinity = if pick.best_code() == arrival.phase {
        pick.affinity
    } else {
        geo::NULL_AFFINITY
    };
    (pick.travel_time() - arrival.tt).abs() / affinity
}

/// Try to keep the existing identifications: same phase code within the
/// association tolerance, then same phase group, then (for used picks)
/// the full re-identifier for the whole group.
fn no_reidentification(
    group: &mut PickGroup,
    picks: &mut [Pick],
    arrivals: &[TtArrival],
    other_weight: f64,
    sticky_weight: f64,
) {
    for position in 0..group.pick_indices.len() {
        let index = group.pick_indices[position];
        let code = picks[index].current_code.clone();
        if code.is_empty() {
            picks[index].clear_assignment();
            continue;
        }

        let travel_time = picks[index].travel_time();

        // Closest arrival with the same phase code.
        let same_code = arrivals
            .iter()
            .filter(|a| a.phase == code)
            .min_by(|a, b| {
                (travel_time - a.tt)
                    .abs()
                    .partial_cmp(&(travel_time - b.tt).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        if let Some(arrival) = same_code {
            let residual = (travel_time - arrival.tt).abs();
            // Surface waves stay associated no matter how large the
            // residual is.
            if residual <= geo::ASSOC_TOLERANCE || code == "Lg" || code == "LR" {
                picks[index].set_assignment(to_assignment(arrival), residual);
                picks[index].force_association = true;
                trace!(station = %group.station.id, code, residual, "kept identification");
                continue;
            }
        }

        // Fall back to the closest arrival in the same phase group.
        let group_name = phases::find_group(&code, false);
        let same_group = arrivals
            .iter()
            .filter(|a| a.group == group_name)
            .min_by(|a, b| {
                (travel_time - a.tt)
                    .abs()
                    .partial_cmp(&(travel_time - b.tt).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        if let Some(arrival) = same_group {
            let residual = (travel_time - arrival.tt).abs();
            if residual <= geo::ASSOC_TOLERANCE {
                picks[index].set_assignment(to_assignment(arrival), residual);
                picks[index].force_association = true;
                trace!(station = %group.station.id, code, to = arrival.phase, "group fallback");
                continue;
            }
        }

        if picks[index].is_used {
            // Sometimes re-identification is thrust upon us: the old
            // identification no longer exists at this depth or distance.
            debug!(station = %group.station.id, code, "identification lost, re-identifying group");
            reidentify_group(group, picks, arrivals, other_weight, sticky_weight);
            return;
        }
        picks[index].clear_assignment();
    }
}

fn to_assignment(arrival: &TtArrival) -> TtAssignment {
    TtAssignment {
        phase: arrival.phase.clone(),
        tt: arrival.tt,
        spread: arrival.spread,
        observability: arrival.observability,
        dtdd: arrival.dtdd,
        dtdz: arrival.dtdz,
    }
}

/// Visit every k-combination of `0..n` in ascending order.
fn for_each_combination(n: usize, k: usize, visit: &mut impl FnMut(&[usize])) {
    if k == 0 || k > n {
        return;
    }
    let mut indices: Vec<usize> = (0..k).collect();
    loop {
        visit(&indices);
        let mut j = k;
        loop {
            if j == 0 {
                return;
            }
            j -= 1;
            if indices[j] != n - k + j {
                break;
            }
            if j == 0 {
                return;
            }
        }
        indices[j] += 1;
        for l in j + 1..k {
            indices[l] = indices[l - 1] + 1;
        }
    }
}
