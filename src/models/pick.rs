//! Arrival-time observations.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::geo;
use crate::models::station::Station;

/// Who produced a pick. Contributed picks come from outside agencies,
/// local ones from our own processing; human picks are trusted more than
/// automatic ones during phase identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorType {
    ContributedAutomatic,
    LocalAutomatic,
    ContributedHuman,
    LocalHuman,
}

impl AuthorType {
    pub fn is_automatic(self) -> bool {
        matches!(self, AuthorType::ContributedAutomatic | AuthorType::LocalAutomatic)
    }

    /// Parse the wire spelling; unknown strings default to contributed
    /// automatic, the least trusted class.
    pub fn parse(text: &str) -> Self {
        match text {
            "LocalAutomatic" => AuthorType::LocalAutomatic,
            "ContributedHuman" => AuthorType::ContributedHuman,
            "LocalHuman" => AuthorType::LocalHuman,
            _ => AuthorType::ContributedAutomatic,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuthorType::ContributedAutomatic => "ContributedAutomatic",
            AuthorType::LocalAutomatic => "LocalAutomatic",
            AuthorType::ContributedHuman => "ContributedHuman",
            AuthorType::LocalHuman => "LocalHuman",
        }
    }

    /// Numeric code used by the hydra text format.
    pub fn code(self) -> u8 {
        match self {
            AuthorType::ContributedAutomatic => 1,
            AuthorType::LocalAutomatic => 2,
            AuthorType::ContributedHuman => 3,
            AuthorType::LocalHuman => 4,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            2 => AuthorType::LocalAutomatic,
            3 => AuthorType::ContributedHuman,
            4 => AuthorType::LocalHuman,
            _ => AuthorType::ContributedAutomatic,
        }
    }
}

/// The theoretical phase currently assigned to a pick, with everything
/// the estimator needs from the travel-time service.
#[derive(Debug, Clone)]
pub struct TtAssignment {
    pub phase: String,
    /// Theoretical travel time in seconds
    pub tt: f64,
    /// Statistical spread of the arrival in seconds
    pub spread: f64,
    pub observability: f64,
    /// dT/dDelta in seconds per degree
    pub dtdd: f64,
    /// dT/dDepth in seconds per kilometer
    pub dtdz: f64,
}

/// One observed arrival.
///
/// Created at intake; the identification fields are mutated by phase
/// identification and the residual/weight pair is recomputed on every
/// location pass.
#[derive(Debug, Clone)]
pub struct Pick {
    pub id: String,
    pub station: Arc<Station>,
    pub channel: String,
    pub agency: String,
    pub author: String,
    pub author_type: AuthorType,
    /// Arrival time in seconds since the epoch
    pub arrival_time: f64,
    pub quality: f64,
    /// Analyst confidence multiplier, at least [`geo::NULL_AFFINITY`]
    pub affinity: f64,
    /// Use command from the request; picks removed internally can be
    /// reinstated up to this flag
    pub external_use: bool,
    pub is_used: bool,
    /// Phase code claimed upstream (associated if given, else located)
    pub observed_code: String,
    /// Working phase code, mutated by phase identification
    pub current_code: String,
    pub residual: f64,
    pub weight: f64,
    pub importance: f64,
    pub is_triage: bool,
    pub force_association: bool,
    pub assignment: Option<TtAssignment>,
    /// Affinity-weighted absolute residual of the winning assignment
    pub statistical_fom: f64,
    travel_time: f64,
}

impl Pick {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        station: Arc<Station>,
        channel: impl Into<String>,
        agency: impl Into<String>,
        author: impl Into<String>,
        author_type: AuthorType,
        arrival_time: f64,
        quality: f64,
        affinity: f64,
        use_flag: bool,
        located_phase: &str,
        associated_phase: &str,
    ) -> Self {
        let observed = if associated_phase.is_empty() {
            located_phase.to_string()
        } else {
            associated_phase.to_string()
        };
        Self {
            id: id.into(),
            station,
            channel: channel.into(),
            agency: agency.into(),
            author: author.into(),
            author_type,
            arrival_time,
            quality,
            affinity: affinity.max(geo::NULL_AFFINITY),
            external_use: use_flag,
            is_used: use_flag,
            current_code: located_phase.to_string(),
            observed_code: observed,
            residual: 0.0,
            weight: 0.0,
            importance: 0.0,
            is_triage: false,
            force_association: false,
            assignment: None,
            statistical_fom: 0.0,
            travel_time: 0.0,
        }
    }

    /// Observed travel time relative to the current origin.
    pub fn travel_time(&self) -> f64 {
        self.travel_time
    }

    /// Recompute the observed travel time after an origin change.
    pub fn update_travel_time(&mut self, origin_time: f64) {
        self.travel_time = self.arrival_time - origin_time;
    }

    pub fn is_automatic(&self) -> bool {
        self.author_type.is_automatic()
    }

    /// Surface-wave picks from trusted (human) sources are pre-associated
    /// rather than run through the figure-of-merit machinery.
    pub fn is_surface_wave(&self) -> bool {
        !self.is_automatic() && matches!(self.observed_code.as_str(), "Lg" | "LR")
    }

    /// The phase code the pick claims to be: the working identification
    /// when there is one, the upstream code otherwise.
    pub fn best_code(&self) -> &str {
        if self.current_code.is_empty() {
            &self.observed_code
        } else {
            &self.current_code
        }
    }

    /// Record the winning theoretical assignment with its statistical
    /// figure-of-merit.
    pub fn set_assignment(&mut self, assignment: TtAssignment, fom: f64) {
        self.assignment = Some(assignment);
        self.statistical_fom = fom;
    }

    pub fn clear_assignment(&mut self) {
        self.assignment = None;
        self.statistical_fom = 0.0;
    }
}
