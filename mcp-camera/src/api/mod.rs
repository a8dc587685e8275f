//! HTTP surface: the stream endpoint, the MCP JSON-RPC endpoint and health.

pub mod error;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
