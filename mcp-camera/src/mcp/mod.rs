//! Model Context Protocol surface: JSON-RPC types, the camera tools and the
//! stdio transport. The HTTP transport lives in `api::routes::mcp`.

pub mod handler;
pub mod stdio;
pub mod tools;
pub mod types;

pub use handler::McpHandler;
pub use tools::CameraTools;
