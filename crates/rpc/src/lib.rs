//! HTTP surface of the ofactory object store.

pub mod server;

pub use server::{build_router, start_server, AppState};
