//! Hypocenter audit records.

use crate::geo;
use crate::models::hypocenter::Hypocenter;
use crate::status::LocStatus;

/// A snapshot of the hypocenter at one point of the location process.
///
/// Audits double as fall-back hypocenters should the iteration go awry
/// and as the principal debugging record of a run.
#[derive(Debug, Clone)]
pub struct HypoAudit {
    pub stage: usize,
    pub iteration: usize,
    pub picks_used: usize,
    pub origin_time: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub depth: f64,
    pub colatitude: f64,
    /// Hypocentral change in kilometers
    pub step_length: f64,
    /// Epicentral change in kilometers
    pub del_h: f64,
    /// Depth change in kilometers
    pub del_z: f64,
    pub rms: f64,
    pub status: LocStatus,
}

impl HypoAudit {
    pub fn new(
        hypo: &Hypocenter,
        stage: usize,
        iteration: usize,
        picks_used: usize,
        status: LocStatus,
    ) -> Self {
        Self {
            stage,
            iteration,
            picks_used,
            origin_time: hypo.origin_time,
            latitude: hypo.latitude,
            longitude: hypo.longitude,
            depth: hypo.depth,
            colatitude: hypo.colatitude,
            step_length: hypo.step_length,
            del_h: hypo.del_h,
            del_z: hypo.del_z,
            rms: hypo.rms,
            status,
        }
    }
}

impl std::fmt::Display for HypoAudit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Audit: {} {:2} {:4} {} {:8.4} {:9.4} {:6.2} del = {:6.1} {:6.1} {:6.1} rms = {:6.2} {}",
            self.stage,
            self.iteration,
            self.picks_used,
            geo::format_origin_time(self.origin_time),
            self.latitude,
            self.longitude,
            self.depth,
            self.del_h,
            self.del_z,
            self.step_length,
            self.rms,
            self.status
        )
    }
}
