//! 工具层：注册表、调度器、输出契约 schema 与内置工具
//!
//! 内置工具：web.search、calendar.create_event、memory.write、agent.event、agent.verify_step、notes.write。

pub mod agent_event;
pub mod calendar;
pub mod dispatcher;
pub mod memory_write;
pub mod registry;
pub mod schema;
pub mod web_search;

pub use agent_event::{AgentEventTool, NotesWriteTool, VerifyStepTool};
pub use calendar::CalendarTool;
pub use dispatcher::{ToolDispatcher, ToolResult};
pub use memory_write::MemoryWriteTool;
pub use registry::{Tool, ToolRegistry, ToolSchema};
pub use schema::{step_contract_schema_json, validate_args};
pub use web_search::WebSearchTool;
