//! 模式判定与 prompt 组装
//!
//! observation.goal 为非空字符串时进入目标执行模式，否则为实时辅导模式。两种模式的输出契约不同，
//! 在调用生成后端之前就已确定。各段按固定顺序拼接：
//! 系统指令 → 偏好 → 长上下文提示 → 长期记忆片段 → 工具 schema 摘要 → 输出契约与其 JSON Schema → 观测（或目标）。

use serde_json::{Map, Value};

use crate::core::Observation;
use crate::tools::{step_contract_schema_json, ToolSchema};

/// 未配置系统指令时使用
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are OmniSense, a real-time meeting assistant. \
Read the situation, decide whether any tool would help, and give short, speakable guidance. \
Do not infer protected traits or identity. Avoid biometric claims.";

const GOAL_CONTRACT: &str = "OUTPUT CONTRACT (STRICT): Return ONLY JSON with keys:
- thoughts: your step-by-step reasoning (1-3 sentences)
- tool_calls: array of { name, args } from TOOLS below (use at least 1 tool when possible)
- final: a clear, helpful summary of what was done or found (plain text, 2-6 sentences). \
Write a direct, useful answer, not the three-line coaching format.";

const COACHING_CONTRACT: &str = "OUTPUT CONTRACT (STRICT): Return ONLY JSON with keys:
- thoughts: brief reasoning summary (concise)
- tool_calls: array of { name, args } from TOOLS below (may be empty)
- final: user-facing guidance in EXACTLY 3 short lines:
  The Leak: 1 sentence on what is really happening right now.
  The Fix: the exact action and sentence to say now.
  The Vibe: 2-3 words on the body language to use.";

/// 单步的运行模式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepMode {
    Goal { goal: String, step_index: u64 },
    Coaching,
}

impl StepMode {
    pub fn detect(observation: &Observation) -> Self {
        match observation.get("goal") {
            Some(Value::String(goal)) if !goal.is_empty() => StepMode::Goal {
                goal: goal.clone(),
                step_index: observation
                    .get("step_index")
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
            },
            _ => StepMode::Coaching,
        }
    }

    pub fn is_goal(&self) -> bool {
        matches!(self, StepMode::Goal { .. })
    }

    pub fn contract(&self) -> &'static str {
        match self {
            StepMode::Goal { .. } => GOAL_CONTRACT,
            StepMode::Coaching => COACHING_CONTRACT,
        }
    }
}

/// 组装 prompt 所需的全部输入
pub struct PromptParts<'a> {
    pub system_instruction: &'a str,
    pub preferences: &'a Map<String, Value>,
    pub long_context: &'a str,
    pub memory_snippet: &'a str,
    pub tools: &'a [ToolSchema],
    pub observation: &'a Observation,
}

pub fn build_prompt(mode: &StepMode, parts: &PromptParts<'_>) -> String {
    let tools = serde_json::to_string(parts.tools).unwrap_or_else(|_| "[]".to_string());
    let preferences =
        serde_json::to_string(parts.preferences).unwrap_or_else(|_| "{}".to_string());
    let memory = if parts.memory_snippet.is_empty() {
        "(none)"
    } else {
        parts.memory_snippet
    };

    let mut prompt = String::new();
    prompt.push_str(parts.system_instruction.trim());
    prompt.push_str("\n\n");
    if mode.is_goal() {
        prompt.push_str(
            "ROLE: You are OmniSense Planner, an autonomous goal-execution agent. \
             Break the goal into concrete actions and execute them with the TOOLS below.\n\n",
        );
    } else {
        prompt.push_str(
            "ROLE: You are OmniSense, a live meeting coach. Keep analysis minimal and the \
             solution maximal. Always leave the other person a graceful exit.\n\n",
        );
    }
    prompt.push_str(&format!("PREFERENCES: {preferences}\n"));
    prompt.push_str(&format!("LONG CONTEXT: {}\n", parts.long_context));
    prompt.push_str(&format!("LONG-TERM MEMORY (recent interactions):\n{memory}\n\n"));
    prompt.push_str(&format!("TOOLS (JSON schema summary):\n{tools}\n\n"));
    prompt.push_str(mode.contract());
    prompt.push_str("\n");
    prompt.push_str(&format!("OUTPUT JSON SCHEMA: {}\n\n", step_contract_schema_json()));
    match mode {
        StepMode::Goal { goal, step_index } => {
            prompt.push_str(&format!("GOAL: {goal}\nSTEP INDEX: {step_index}\n"));
        }
        StepMode::Coaching => {
            let observation =
                serde_json::to_string(parts.observation).unwrap_or_else(|_| "{}".to_string());
            prompt.push_str(&format!("OBSERVATION: {observation}\n"));
        }
    }
    prompt
}

/// 粗略 token 估计：ceil(字符数 / 4)
pub fn estimate_tokens(prompt: &str) -> usize {
    prompt.chars().count().div_ceil(4)
}
