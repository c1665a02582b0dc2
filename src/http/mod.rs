//! HTTP server module: a thin axum controller over the location engine.
//!
//! The handlers only parse, delegate to [`crate::solver::Locator`], and
//! serialize; all of the numerical work stays in the solver.

pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::create_router;
pub use state::AppState;
