//! HTTP surface for the query pipeline.
//!
//! `GET /?query=...` answers a question, `GET /health` reports readiness,
//! `GET /schema` lists the active snapshot and `POST /refresh` re-runs
//! discovery.

pub mod handlers;
pub mod router;
pub mod server;

pub use router::{AppState, Router, RouterError};
pub use server::Server;
