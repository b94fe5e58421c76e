//! Questline: quest-driven project tracking with a next-task engine exposed
//! to coding agents over MCP.

pub mod advisor;
pub mod config;
pub mod mcp;

pub use questline_core::{db, models};
