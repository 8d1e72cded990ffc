//! 单步编排：Observe → Generate → Act → Verify → Escalate → Policy → Record
//!
//! run_step 永不失败：生成失败走回退计划，工具失败记入结果，策略与持久化错误被吞掉。

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::core::Observation;
use crate::memory::{LongContextProvider, LongTermMemory};
use crate::observability::AuditLog;
use crate::policy::{PolicyEngine, PrivacyMode};
use crate::react::escalation::{compute_level, ok_count, thought_signature, EscalationLevel};
use crate::react::prompt::{build_prompt, estimate_tokens, PromptParts, StepMode, DEFAULT_SYSTEM_INSTRUCTION};
use crate::react::{Planner, StepEvent, StepPlan};
use crate::session::{EventKind, SessionStore};
use crate::tools::{ToolDispatcher, ToolResult};

const VERIFY_TOOL: &str = "agent.verify_step";
const NOTE_TOOL: &str = "notes.write";
const EVENT_TOOL: &str = "agent.event";

const LEVEL3_NOTE: &str =
    "Level 3 escalation: no successful tools; documenting uncertainty and requesting follow-up.";

/// 单步输入
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepInput {
    #[serde(default)]
    pub observation: Observation,
    #[serde(default)]
    pub preferences: Map<String, Value>,
    /// 本步最多执行的工具数；None 时使用运行时默认值
    #[serde(default, rename = "maxTools")]
    pub max_tools: Option<usize>,
}

impl StepInput {
    pub fn new(observation: Observation) -> Self {
        Self {
            observation,
            ..Self::default()
        }
    }

    pub fn with_preferences(mut self, preferences: Map<String, Value>) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn with_max_tools(mut self, max_tools: usize) -> Self {
        self.max_tools = Some(max_tools);
        self
    }

    pub fn privacy_mode(&self) -> PrivacyMode {
        PrivacyMode::from_preferences(&self.preferences)
    }
}

/// 单步输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutput {
    pub thoughts: String,
    pub tool_results: Vec<ToolResult>,
    #[serde(rename = "final")]
    pub final_text: Option<String>,
    pub level: EscalationLevel,
    pub signature: String,
}

/// 长期记忆片段与保留条数
#[derive(Debug, Clone, Copy)]
pub struct MemoryLimits {
    pub snippet_limit: usize,
    pub snippet_max_chars: usize,
    pub max_items: usize,
}

impl Default for MemoryLimits {
    fn default() -> Self {
        Self {
            snippet_limit: 24,
            snippet_max_chars: 2200,
            max_items: 800,
        }
    }
}

/// 单步编排所需的协作者：planner / dispatcher / sessions / audit 必需，其余可选
pub struct StepSession<'a> {
    pub planner: &'a Planner,
    pub dispatcher: &'a ToolDispatcher,
    pub sessions: &'a dyn SessionStore,
    pub audit: &'a AuditLog,
    /// 可选：策略引擎，每步结束时评估一次
    pub policies: Option<&'a PolicyEngine>,
    /// 可选：长期记忆
    pub memory: Option<&'a dyn LongTermMemory>,
    /// 可选：长上下文提示
    pub long_context: Option<&'a dyn LongContextProvider>,
    pub system_instruction: &'a str,
    pub default_max_tools: usize,
    pub memory_limits: MemoryLimits,
}

impl<'a> StepSession<'a> {
    pub fn new(
        planner: &'a Planner,
        dispatcher: &'a ToolDispatcher,
        sessions: &'a dyn SessionStore,
        audit: &'a AuditLog,
    ) -> Self {
        Self {
            planner,
            dispatcher,
            sessions,
            audit,
            policies: None,
            memory: None,
            long_context: None,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION,
            default_max_tools: 2,
            memory_limits: MemoryLimits::default(),
        }
    }

    pub fn with_policies(mut self, policies: &'a PolicyEngine) -> Self {
        self.policies = Some(policies);
        self
    }

    pub fn with_memory(mut self, memory: &'a dyn LongTermMemory) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_long_context(mut self, provider: &'a dyn LongContextProvider) -> Self {
        self.long_context = Some(provider);
        self
    }

    pub fn with_system_instruction(mut self, instruction: &'a str) -> Self {
        self.system_instruction = instruction;
        self
    }

    pub fn with_default_max_tools(mut self, max_tools: usize) -> Self {
        self.default_max_tools = max_tools;
        self
    }

    pub fn with_memory_limits(mut self, limits: MemoryLimits) -> Self {
        self.memory_limits = limits;
        self
    }

    /// 执行一步
    pub async fn run_step(&self, input: StepInput) -> StepOutput {
        let started = Instant::now();
        let mode = StepMode::detect(&input.observation);
        let privacy = input.privacy_mode();

        let prompt = self.assemble_prompt(&mode, &input).await;
        let mut plan = match self.planner.plan(&prompt).await {
            Ok(plan) => plan,
            Err(e) => self.recover_from_upstream(&mode, &e.to_string()).await,
        };

        plan.clamp_tools(input.max_tools.unwrap_or(self.default_max_tools));
        self.audit
            .record(
                "agent_prompt",
                json!({ "tokens_est": estimate_tokens(&prompt), "tool_calls": plan.tool_calls.len() }),
            )
            .await;

        let mut tool_results = Vec::with_capacity(plan.tool_calls.len());
        for call in &plan.tool_calls {
            tool_results.push(self.dispatcher.dispatch(&call.name, call.args.clone()).await);
        }

        let ok = ok_count(&tool_results);
        let level = compute_level(&tool_results);
        let signature = thought_signature(&input.observation, &tool_results);
        self.audit
            .record("thought_signature", json!({ "level": level, "signature": signature }))
            .await;

        let total = tool_results.len();
        self.verify(
            &format!("Executed {total} tool(s); {ok} of {total} succeeded"),
            Value::String(signature.clone()),
            ok > 0,
        )
        .await;

        if level == EscalationLevel::Escalated {
            self.escalate(&signature, &tool_results).await;
        }

        if let Some(policies) = self.policies {
            policies.evaluate(&input.observation, privacy).await;
        }

        let StepPlan {
            thoughts,
            final_text,
            ..
        } = plan;
        let output = StepOutput {
            thoughts,
            tool_results,
            final_text,
            level,
            signature,
        };
        self.finalize(&input, &output, started).await;
        output
    }

    async fn assemble_prompt(&self, mode: &StepMode, input: &StepInput) -> String {
        let long_context = match self.long_context {
            Some(provider) => provider.assemble().await,
            None => String::new(),
        };
        let memory_snippet = match self.memory {
            Some(memory) => memory
                .build_snippet(
                    &input.preferences,
                    self.memory_limits.snippet_limit,
                    self.memory_limits.snippet_max_chars,
                )
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Failed to build memory snippet");
                    String::new()
                }),
            None => String::new(),
        };
        let tools = self.dispatcher.schema_summary();
        build_prompt(
            mode,
            &PromptParts {
                system_instruction: self.system_instruction,
                preferences: &input.preferences,
                long_context: &long_context,
                memory_snippet: &memory_snippet,
                tools: &tools,
                observation: &input.observation,
            },
        )
    }

    /// 重试耗尽：记录失败事件与一次未通过的自检，返回回退计划
    async fn recover_from_upstream(&self, mode: &StepMode, error: &str) -> StepPlan {
        tracing::error!(error, "Generation failed after retries, using fallback plan");
        self.sessions
            .add_event(EventKind::System, StepEvent::upstream_failure(error).to_payload())
            .await;
        self.verify(
            "Model call failed after retries",
            Value::String("generate".to_string()),
            false,
        )
        .await;
        StepPlan::fallback(mode)
    }

    /// 尝试过工具但全部失败：写笔记、记 agent.level3 事件、一次未通过的自检
    async fn escalate(&self, signature: &str, results: &[ToolResult]) {
        tracing::warn!(signature, tools = results.len(), "Escalating step to level 3");
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        self.dispatcher
            .dispatch(NOTE_TOOL, json!({ "text": LEVEL3_NOTE }))
            .await;
        self.dispatcher
            .dispatch(
                EVENT_TOOL,
                json!({
                    "kind": "agent.level3",
                    "details": { "signature": signature, "toolCalls": names }
                }),
            )
            .await;
        self.verify(
            "Level 3 escalation executed (no successful tools)",
            Value::String(signature.to_string()),
            false,
        )
        .await;
    }

    async fn verify(&self, claim: &str, evidence: Value, pass: bool) {
        let result = self
            .dispatcher
            .dispatch(
                VERIFY_TOOL,
                json!({ "claim": claim, "evidence": evidence, "pass": pass }),
            )
            .await;
        if !result.ok {
            tracing::debug!(error = ?result.error, "verification record not written");
        }
    }

    async fn finalize(&self, input: &StepInput, output: &StepOutput, started: Instant) {
        let ms = started.elapsed().as_millis() as u64;
        self.sessions
            .add_event(
                EventKind::System,
                StepEvent::Step {
                    ms,
                    output: output.clone(),
                }
                .to_payload(),
            )
            .await;
        self.audit
            .record("agent_step", json!({ "ms": ms, "tools": output.tool_results.len() }))
            .await;

        let Some(memory) = self.memory else {
            return;
        };
        let tools: Vec<Value> = output
            .tool_results
            .iter()
            .map(|r| json!({ "name": r.name, "ok": r.ok }))
            .collect();
        let payload = json!({
            "input": { "observation": input.observation, "preferences": input.preferences },
            "output": {
                "thoughts": output.thoughts,
                "final": output.final_text,
                "level": output.level,
                "signature": output.signature,
            },
            "meta": { "tools": tools },
            "preferences": input.preferences,
        });
        if let Err(e) = memory
            .append_interaction("agent.step", payload, self.memory_limits.max_items)
            .await
        {
            tracing::warn!(error = %e, "Failed to append interaction to long-term memory");
        }
        tracing::info!(ms, level = %output.level, tools = output.tool_results.len(), "Step finished");
    }
}
