//! MCP camera server library crate.
//!
//! Captures stills, records to files and serves live streams from local
//! cameras by driving ffmpeg processes, exposed as MCP tools over stdio or
//! HTTP.

pub mod api;
pub mod camera;
pub mod config;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod utils;

pub use error::{Error, Result};
