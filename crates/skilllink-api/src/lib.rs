//! API server for the Skilllink job marketplace.
//!
//! Provides the HTTP REST API, session endpoints and the WebSocket job feed.

pub mod error;
pub mod routes;
pub mod session;
pub mod state;
pub mod ws;

pub use state::AppState;
