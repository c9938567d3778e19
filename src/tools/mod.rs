//! Tool declaration, registration and local execution.

pub mod format;
pub mod handler;
pub mod registry;
pub mod schema;

pub use format::{ToolDeclaration, ToolFormat, INTERNAL_TOOL_KINDS};
pub use handler::{ToolCallResult, ToolHandler, ToolOutput};
pub use registry::{Tool, ToolRegistry};
pub use schema::{ParamType, ToolParameter, ToolSchema};
