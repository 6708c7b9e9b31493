//! MCP server exposing the open-data API of the Assembleia Legislativa de
//! Pernambuco (ALEPE) as tools over stdio JSON-RPC.

pub mod config;
pub mod error;
pub mod http;
pub mod mcp;
pub mod server;
pub mod tools;
pub mod types;
pub mod validators;
