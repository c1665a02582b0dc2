//! Internal iteration status and the exit codes reported to clients.

use serde::{Deserialize, Serialize};

/// Status of the location iteration.
///
/// The stepper and the location loop communicate through these values; the
/// subset used as exit codes is mapped by `Event::set_exit_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocStatus {
    Success,
    NearlyConverged,
    DidNotConverge,
    UnstableSolution,
    InsufficientData,
    SingularMatrix,
    EllipsoidFailed,
    BadDepth,
    PhaseIdChanged,
    DidNotMove,
    ErrorsNotComputed,
    LocationFailed,
    SuccessfulLocation,
    UnknownStatus,
}

impl LocStatus {
    /// True for statuses that end the location run immediately.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LocStatus::InsufficientData | LocStatus::BadDepth | LocStatus::LocationFailed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LocStatus::Success => "Success",
            LocStatus::NearlyConverged => "NearlyConverged",
            LocStatus::DidNotConverge => "DidNotConverge",
            LocStatus::UnstableSolution => "UnstableSolution",
            LocStatus::InsufficientData => "InsufficientData",
            LocStatus::SingularMatrix => "SingularMatrix",
            LocStatus::EllipsoidFailed => "EllipsoidFailed",
            LocStatus::BadDepth => "BadDepth",
            LocStatus::PhaseIdChanged => "PhaseIdChanged",
            LocStatus::DidNotMove => "DidNotMove",
            LocStatus::ErrorsNotComputed => "ErrorsNotComputed",
            LocStatus::LocationFailed => "LocationFailed",
            LocStatus::SuccessfulLocation => "SuccessfulLocation",
            LocStatus::UnknownStatus => "UnknownStatus",
        }
    }
}

impl std::fmt::Display for LocStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
