// MCP (Model Context Protocol) server exposing CACD operations as tools
// to agent clients over stdio

pub mod context;
pub mod protocol;
pub mod server;
pub mod tools;

pub use context::McpContext;
pub use server::McpServer;
