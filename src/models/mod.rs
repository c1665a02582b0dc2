//! Domain data model: stations, picks, groups, hypocenters, and the
//! event aggregate that owns them.

pub mod audit;
pub mod event;
pub mod group;
pub mod hypocenter;
pub mod pick;
pub mod station;
pub mod wresidual;

pub use audit::HypoAudit;
pub use event::{EllipseAxis, Event};
pub use group::PickGroup;
pub use hypocenter::{DepthPrior, Hypocenter};
pub use pick::{AuthorType, Pick, TtAssignment};
pub use station::{Station, StationId};
pub use wresidual::{ResidualSource, WeightedResidual};
