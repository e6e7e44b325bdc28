//! # Todoke Gateway
//! HTTP surface for operations: the manual delivery trigger (sharing the
//! scheduler's reconciliation engine, never duplicating its logic), plus
//! health/info and a read-only delivery status view.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
