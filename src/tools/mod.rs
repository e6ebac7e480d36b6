//! Tools module aggregator.
//!
//! `core` holds the definition/schema types, `catalog` the concrete tools and their typed
//! arguments, `resolver` the lookup-parse-execute step shared by every transport.

mod catalog;
mod core;
mod resolver;

pub use catalog::{
    build_assistant_tools, build_tool, AssistantIdArgs, CreateAssistantArgs, CreateThreadArgs,
    ListAssistantsArgs, ThreadIdArgs, ThreadMessageArgs, ToolCall, UpdateAssistantArgs,
};
pub use self::core::{ToolDefinition, ToolKind, ToolParametersBuilder};
pub use resolver::{resolve_and_execute_tool_call, ToolResolution};
