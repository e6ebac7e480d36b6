//! MCP (Model Context Protocol) transport over stdin/stdout.

pub mod protocol;
pub mod server;

pub use protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
pub use server::{write_message, McpServer, ProgressNotifier, SERVER_NAME};
