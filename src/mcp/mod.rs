//! MCP (Model Context Protocol) relay
//!
//! Lets an AI assistant list and call the upstream catalog's tools through
//! JSON-RPC 2.0 on stdio.

pub mod names;
pub mod protocol;
pub mod server;
pub mod transport;

pub use server::{run, McpServer};
