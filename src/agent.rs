//! Headless Agent 运行时
//!
//! AgentRuntime 持有一次部署的全部状态（会话、策略、工具、记忆、审计、反馈），由 AgentBuilder 构建，
//! CLI 与 HTTP 前端共享。run_step 跑单步；act 先做隐私检查；run_goal 围绕一个目标跑多步并写校验产物。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::core::{AgentError, Clock, Observation};
use crate::memory::{
    FeedbackEntry, FeedbackLog, FeedbackStats, LongContextProvider, LongTermMemory, Rating,
    LONG_CONTEXT_MAX_CHARS,
};
use crate::memory::long_term::truncate_chars;
use crate::observability::AuditLog;
use crate::policy::{Policy, PolicyDraft, PolicyEngine, PrivacyMode};
use crate::react::{MemoryLimits, Planner, StepEvent, StepInput, StepOutput, StepSession};
use crate::session::{EventKind, SessionStore};
use crate::tools::ToolDispatcher;

/// run_goal 的步数范围与默认值
const MAX_GOAL_STEPS: usize = 10;
const DEFAULT_GOAL_STEPS: usize = 3;
/// run_goal 每步工具数上限与默认值
const MAX_TOOLS_PER_STEP: usize = 5;
const DEFAULT_TOOLS_PER_STEP: usize = 2;

/// 单步编排的运行参数
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub system_instruction: String,
    pub default_max_tools: usize,
    pub memory_limits: MemoryLimits,
}

/// 多步目标运行请求
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalRequest {
    #[serde(default)]
    pub goal: String,
    pub steps: Option<usize>,
    #[serde(alias = "maxTools")]
    pub max_tools_per_step: Option<usize>,
    #[serde(default)]
    pub preferences: Map<String, Value>,
}

impl GoalRequest {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            ..Self::default()
        }
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn with_max_tools(mut self, max_tools: usize) -> Self {
        self.max_tools_per_step = Some(max_tools);
        self
    }

    /// 步数限制在 1..=10，未给出时为 3
    pub fn effective_steps(&self) -> usize {
        self.steps
            .unwrap_or(DEFAULT_GOAL_STEPS)
            .clamp(1, MAX_GOAL_STEPS)
    }

    /// 每步工具数限制在 0..=5，未给出时为 2
    pub fn effective_max_tools(&self) -> usize {
        self.max_tools_per_step
            .unwrap_or(DEFAULT_TOOLS_PER_STEP)
            .min(MAX_TOOLS_PER_STEP)
    }
}

/// 多步运行中的一步
#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    pub i: usize,
    pub out: StepOutput,
}

/// 多步运行结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub ok: bool,
    pub goal: String,
    /// 实际执行的步数
    pub steps: usize,
    pub artifact: Option<PathBuf>,
    pub artifact_write_error: Option<String>,
    #[serde(skip)]
    pub trace: Vec<TraceEntry>,
}

pub struct AgentRuntime {
    pub(crate) planner: Planner,
    pub(crate) dispatcher: Arc<ToolDispatcher>,
    pub(crate) sessions: Arc<dyn SessionStore>,
    pub(crate) policies: Arc<PolicyEngine>,
    pub(crate) memory: Arc<dyn LongTermMemory>,
    pub(crate) long_context: Arc<dyn LongContextProvider>,
    pub(crate) audit: Arc<AuditLog>,
    pub(crate) feedback: FeedbackLog,
    pub(crate) clock: Arc<dyn Clock>,
    /// 校验产物写入 `<data_dir>/verify/`
    pub(crate) data_dir: PathBuf,
    pub(crate) settings: RuntimeSettings,
}

impl AgentRuntime {
    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn policies(&self) -> &Arc<PolicyEngine> {
        &self.policies
    }

    pub fn dispatcher(&self) -> &Arc<ToolDispatcher> {
        &self.dispatcher
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.planner.token_usage()
    }

    fn step_session(&self) -> StepSession<'_> {
        StepSession::new(
            &self.planner,
            self.dispatcher.as_ref(),
            self.sessions.as_ref(),
            self.audit.as_ref(),
        )
        .with_policies(self.policies.as_ref())
        .with_memory(self.memory.as_ref())
        .with_long_context(self.long_context.as_ref())
        .with_system_instruction(&self.settings.system_instruction)
        .with_default_max_tools(self.settings.default_max_tools)
        .with_memory_limits(self.settings.memory_limits)
    }

    /// 单步编排，永不失败
    pub async fn run_step(&self, input: StepInput) -> StepOutput {
        self.step_session().run_step(input).await
    }

    /// 带隐私检查的单步：privacyMode 为 off 时拒绝，不调用生成后端
    pub async fn act(&self, input: StepInput) -> Result<StepOutput, AgentError> {
        if input.privacy_mode() == PrivacyMode::Off {
            tracing::info!("Refusing step: privacy mode is off");
            return Err(AgentError::PrivacyOff);
        }
        Ok(self.run_step(input).await)
    }

    /// 围绕一个目标跑多步，某步给出非空 final 时提前结束
    pub async fn run_goal(&self, request: GoalRequest) -> Result<RunReport, AgentError> {
        let goal = request.goal.trim().to_string();
        if goal.is_empty() {
            return Err(AgentError::MissingGoal);
        }
        let steps = request.effective_steps();
        let max_tools = request.effective_max_tools();
        let started = self.clock.now_ms();
        tracing::info!(goal = %goal, steps, max_tools, "Starting goal run");

        let mut trace = Vec::with_capacity(steps);
        for i in 0..steps {
            let hint = truncate_chars(&self.long_context.assemble().await, LONG_CONTEXT_MAX_CHARS);
            let mut observation = Observation::new();
            observation.insert("goal".into(), Value::String(goal.clone()));
            observation.insert("step_index".into(), Value::from(i));
            observation.insert("long_context_hint".into(), Value::String(hint));

            let input = StepInput {
                observation,
                preferences: request.preferences.clone(),
                max_tools: Some(max_tools),
            };
            let out = self.run_step(input).await;
            let tools = out.tool_results.len();
            self.sessions
                .add_event(
                    EventKind::System,
                    StepEvent::RunStep { index: i, tools }.to_payload(),
                )
                .await;
            let done = out.final_text.as_deref().is_some_and(|f| !f.is_empty());
            trace.push(TraceEntry { i, out });
            if done {
                break;
            }
        }

        let record = json!({
            "goal": goal,
            "steps": steps,
            "maxTools": max_tools,
            "started": started,
            "ended": self.clock.now_ms(),
            "trace": trace,
        });
        let (artifact, artifact_write_error) =
            match write_artifact(&self.data_dir, started, &record).await {
                Ok(path) => (Some(path), None),
                Err(e) => {
                    let error = e.to_string();
                    tracing::warn!(error = %error, "Failed to write run artifact");
                    self.sessions
                        .add_event(
                            EventKind::System,
                            StepEvent::RunArtifactWriteFailed {
                                error: error.clone(),
                            }
                            .to_payload(),
                        )
                        .await;
                    (None, Some(error))
                }
            };

        Ok(RunReport {
            ok: true,
            goal,
            steps: trace.len(),
            artifact,
            artifact_write_error,
            trace,
        })
    }

    /// 准入检查后激活策略；被拒绝时返回 AgentError::PolicyRejected
    pub async fn activate_policy(&self, draft: PolicyDraft) -> Result<Policy, AgentError> {
        let policy = self.policies.create(draft).await?;
        Ok(policy)
    }

    /// 记录一条赞 / 踩反馈
    pub async fn record_feedback(
        &self,
        action_id: &str,
        action_type: &str,
        rating: Rating,
        correction: Option<String>,
    ) -> Result<FeedbackEntry, AgentError> {
        let entry = FeedbackEntry {
            t: self.clock.now_ms(),
            action_id: action_id.to_string(),
            action_type: action_type.to_string(),
            rating,
            correction: correction.filter(|c| !c.trim().is_empty()),
        };
        self.feedback
            .append(&entry)
            .await
            .map_err(|e| AgentError::Storage(e.to_string()))?;
        Ok(entry)
    }

    pub async fn recent_feedback(&self, limit: usize) -> Vec<FeedbackEntry> {
        self.feedback.list_recent(limit).await
    }

    pub async fn feedback_stats(&self) -> FeedbackStats {
        self.feedback.stats().await
    }
}

async fn write_artifact(dir: &Path, started: i64, record: &Value) -> anyhow::Result<PathBuf> {
    let verify_dir = dir.join("verify");
    tokio::fs::create_dir_all(&verify_dir).await?;
    let path = verify_dir.join(format!("run_{started}.json"));
    tokio::fs::write(&path, serde_json::to_string_pretty(record)?).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goal_request_clamps() {
        let req = GoalRequest::new("g");
        assert_eq!(req.effective_steps(), 3);
        assert_eq!(req.effective_max_tools(), 2);

        let req = GoalRequest::new("g").with_steps(0).with_max_tools(9);
        assert_eq!(req.effective_steps(), 1);
        assert_eq!(req.effective_max_tools(), 5);

        let req = GoalRequest::new("g").with_steps(50).with_max_tools(0);
        assert_eq!(req.effective_steps(), 10);
        assert_eq!(req.effective_max_tools(), 0);
    }

    #[test]
    fn test_goal_request_wire_names() {
        let req: GoalRequest = serde_json::from_value(json!({
            "goal": "prep for standup",
            "steps": 2,
            "maxToolsPerStep": 1,
            "preferences": {"privacyMode": "local"}
        }))
        .unwrap();
        assert_eq!(req.effective_steps(), 2);
        assert_eq!(req.effective_max_tools(), 1);
        assert_eq!(req.preferences["privacyMode"], "local");
    }
}
