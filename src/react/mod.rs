//! 编排层：模式判定与 prompt 组装、输出解析、单步编排、升级级别

pub mod escalation;
pub mod events;
pub mod planner;
pub mod prompt;
pub mod step;

pub use escalation::{compute_level, thought_signature, EscalationLevel};
pub use events::StepEvent;
pub use planner::{parse_step_output, Planner, StepPlan, ToolCall};
pub use prompt::{StepMode, DEFAULT_SYSTEM_INSTRUCTION};
pub use step::{MemoryLimits, StepInput, StepOutput, StepSession};
