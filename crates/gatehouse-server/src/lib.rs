//! Process assembly for gatehouse: CLI, logging, the reconciliation
//! pipeline and a small HTTP surface.

pub mod cli;
pub mod handlers;
pub mod observability;
pub mod server;

pub use server::{AppState, GatehouseServer, ServerBuilder, build_app};
