//! # hypolocator
//!
//! Iterative seismic event locator.
//!
//! Given a set of arrival-time observations ("picks") at known stations
//! and a starting hypocenter, the engine refines the hypocenter (origin
//! time, latitude, longitude, depth) so that the theoretical arrival
//! times of identified phases best match the observations under a robust
//! rank-sum estimator, and reports formal error statistics and
//! data-quality flags.
//!
//! ## Architecture
//!
//! - [`models`]: the domain data model (hypocenter, stations, picks,
//!   pick groups, weighted residuals, the event aggregate)
//! - [`refdata`]: auxiliary reference data (craton boundaries, zone
//!   depth statistics) behind a regenerating serialized cache
//! - [`traveltime`]: the travel-time collaborator interface with a
//!   table-driven and a built-in synthetic implementation
//! - [`solver`]: the location engine proper (rank-sum estimator,
//!   decorrelator, linear step search, phase identification, the step
//!   controller, the staged location loop, and the error ellipsoid)
//! - [`io`]: JSON and legacy hydra request/response surfaces
//! - [`http`]: axum REST controller (feature `http-server`)
//!
//! ## Concurrency
//!
//! A single location run is single-threaded and deterministic. Distinct
//! events may be located in parallel by cloning a
//! [`solver::Locator`]: the reference data and travel-time tables are
//! immutable and shared, while each call builds its own event, session,
//! and stepper.

pub mod error;
pub mod geo;
pub mod io;
pub mod models;
pub mod refdata;
pub mod solver;
pub mod status;
pub mod traveltime;

#[cfg(feature = "http-server")]
pub mod http;

pub use error::{LocatorError, Result};
pub use status::LocStatus;
