//! 工具层：注册表、调度器、schema 生成与内置工具

pub mod dispatcher;
pub mod echo;
pub mod registry;
pub mod schema;

pub use dispatcher::{ToolCall, ToolDispatcher, ToolOutput, ToolRef};
pub use echo::EchoTool;
pub use registry::{describe, ParamSpec, Tool, ToolDescriptor, ToolRegistry};
pub use schema::tool_call_schema_json;
