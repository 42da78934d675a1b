//! REST surface for the ontology lifecycle engine.

pub mod error;
pub mod handlers;
pub mod router;
pub mod state;
pub mod warehouse;

pub use router::build_router;
pub use state::AppState;
