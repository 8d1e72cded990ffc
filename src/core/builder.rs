//! Agent 构建器：统一的运行时初始化逻辑
//!
//! CLI 与 HTTP 前端共用同一套工具注册与存储装配。默认把会话、策略、长期记忆、审计写到 `[app] data_dir`；
//! in_memory 模式下这些状态只留在内存（日历、记忆条目、反馈与校验产物仍写 data_dir）。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::agent::{AgentRuntime, RuntimeSettings};
use crate::config::AppConfig;
use crate::core::{Clock, SystemClock};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient, RetryingLlmClient, DEEPSEEK_BASE_URL};
use crate::memory::{
    FeedbackLog, FileLongContext, FileLongTerm, InMemoryLongTerm, JsonListFile,
    LongContextProvider, LongTermMemory,
};
use crate::observability::AuditLog;
use crate::policy::{FilePolicyStore, MemoryPolicyStore, PolicyDefaults, PolicyEngine, PolicyStore};
use crate::react::{MemoryLimits, Planner, DEFAULT_SYSTEM_INSTRUCTION};
use crate::research::{ResearchProvider, SmartResearchProvider};
use crate::session::{FileSessionStore, MemorySessionStore, SessionStore};
use crate::tools::{
    AgentEventTool, CalendarTool, MemoryWriteTool, NotesWriteTool, ToolDispatcher, ToolRegistry,
    VerifyStepTool, WebSearchTool,
};

/// 按配置选择生成后端：有 Key 时用 OpenAI 兼容客户端（DeepSeek 走其兼容端点），否则 Mock
pub(crate) fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let deepseek_key = std::env::var("DEEPSEEK_API_KEY").ok();
    let openai_key = std::env::var("OPENAI_API_KEY").ok();

    match (provider.as_str(), deepseek_key, openai_key) {
        ("mock", _, _) => {
            tracing::info!("Using Mock LLM (provider = mock)");
            Arc::new(MockLlmClient::new())
        }
        ("deepseek", Some(key), _) | ("deepseek", None, Some(key)) => {
            let base = cfg.llm.base_url.as_deref().unwrap_or(DEEPSEEK_BASE_URL);
            tracing::info!("Using DeepSeek LLM ({})", cfg.llm.model);
            Arc::new(OpenAiClient::new(Some(base), &cfg.llm.model, &key))
        }
        (_, _, Some(key)) if provider != "deepseek" => {
            tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
            Arc::new(OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, &key))
        }
        _ => {
            tracing::warn!("No API key set or provider unknown, using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
    }
}

/// 系统指令：配置 > config/prompts/system.txt > 内置
fn load_system_instruction(cfg: &AppConfig) -> String {
    if let Some(text) = cfg
        .agent
        .system_instruction
        .as_ref()
        .filter(|s| !s.trim().is_empty())
    {
        return text.clone();
    }
    ["config/prompts/system.txt", "../config/prompts/system.txt"]
        .into_iter()
        .find_map(|p| std::fs::read_to_string(p).ok())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SYSTEM_INSTRUCTION.to_string())
}

/// Agent 构建器
pub struct AgentBuilder {
    config: AppConfig,
    data_dir: PathBuf,
    in_memory: bool,
    llm: Option<Arc<dyn LlmClient>>,
    clock: Option<Arc<dyn Clock>>,
    research: Option<Arc<dyn ResearchProvider>>,
    long_context: Option<Arc<dyn LongContextProvider>>,
    system_instruction: Option<String>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        let data_dir = config.app.data_dir.clone();
        Self {
            config,
            data_dir,
            in_memory: false,
            llm: None,
            clock: None,
            research: None,
            long_context: None,
            system_instruction: None,
        }
    }

    /// 覆盖 `[app] data_dir`
    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.data_dir = dir.as_ref().to_path_buf();
        self
    }

    /// 会话、策略、长期记忆、审计只保存在内存
    pub fn in_memory(mut self) -> Self {
        self.in_memory = true;
        self
    }

    /// 替换生成后端（仍会套上重试包装）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_research(mut self, research: Arc<dyn ResearchProvider>) -> Self {
        self.research = Some(research);
        self
    }

    pub fn with_long_context(mut self, provider: Arc<dyn LongContextProvider>) -> Self {
        self.long_context = Some(provider);
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// 构建工具注册表；注册顺序即 schema 摘要顺序
    pub fn build_tool_registry(
        &self,
        sessions: Arc<dyn SessionStore>,
        research: Arc<dyn ResearchProvider>,
        clock: Arc<dyn Clock>,
    ) -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(WebSearchTool::new(research, sessions.clone()));
        tools.register(CalendarTool::new(
            JsonListFile::new(self.data_dir.join("calendar.json")),
            sessions.clone(),
            clock.clone(),
        ));
        tools.register(MemoryWriteTool::new(
            JsonListFile::new(self.data_dir.join("memory.json")),
            sessions.clone(),
            clock,
        ));
        tools.register(AgentEventTool::new(sessions.clone()));
        tools.register(VerifyStepTool::new(sessions.clone()));
        tools.register(NotesWriteTool::new(sessions));
        tools
    }

    /// 组装 AgentRuntime
    pub async fn build(self) -> AgentRuntime {
        let cfg = &self.config;
        let clock = self
            .clock
            .clone()
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        let sessions: Arc<dyn SessionStore> = if self.in_memory {
            Arc::new(MemorySessionStore::new(clock.clone()))
        } else {
            Arc::new(FileSessionStore::open(self.data_dir.join("agent.json"), clock.clone()).await)
        };
        let policy_store: Arc<dyn PolicyStore> = if self.in_memory {
            Arc::new(MemoryPolicyStore::new())
        } else {
            Arc::new(FilePolicyStore::new(self.data_dir.join("policies.json")))
        };
        let memory: Arc<dyn LongTermMemory> = if self.in_memory {
            Arc::new(InMemoryLongTerm::new(clock.clone()))
        } else {
            Arc::new(FileLongTerm::new(self.data_dir.join("long_memory.json"), clock.clone()))
        };
        let audit = Arc::new(if self.in_memory {
            AuditLog::disabled()
        } else {
            AuditLog::new(self.data_dir.join("agent.log"), clock.clone())
        });

        let research = self.research.clone().unwrap_or_else(|| {
            Arc::new(SmartResearchProvider::from_env(cfg.tools.research.timeout_secs))
                as Arc<dyn ResearchProvider>
        });
        let registry = self.build_tool_registry(sessions.clone(), research, clock.clone());
        let dispatcher = Arc::new(
            ToolDispatcher::new(registry, cfg.tools.tool_timeout_secs, audit.clone())
                .with_arg_validation(cfg.tools.validate_args),
        );

        let policies = Arc::new(PolicyEngine::new(
            policy_store,
            dispatcher.clone(),
            clock.clone(),
            PolicyDefaults {
                cooldown_ms: cfg.policy.default_cooldown_ms,
                privacy_floor: cfg.policy.default_privacy_floor,
            },
        ));

        let backend = self
            .llm
            .clone()
            .unwrap_or_else(|| create_llm_from_config(cfg));
        let llm: Arc<dyn LlmClient> = Arc::new(RetryingLlmClient::new(backend, cfg.retry_config()));

        let long_context = self.long_context.clone().unwrap_or_else(|| {
            Arc::new(FileLongContext::new(self.data_dir.join("context.md")))
                as Arc<dyn LongContextProvider>
        });

        let settings = RuntimeSettings {
            system_instruction: self
                .system_instruction
                .clone()
                .unwrap_or_else(|| load_system_instruction(cfg)),
            default_max_tools: cfg.agent.max_tools,
            memory_limits: MemoryLimits {
                snippet_limit: cfg.memory.snippet_limit,
                snippet_max_chars: cfg.memory.snippet_max_chars,
                max_items: cfg.memory.max_items,
            },
        };
        tracing::info!(
            data_dir = %self.data_dir.display(),
            in_memory = self.in_memory,
            tools = dispatcher.tool_names().len(),
            "Agent runtime ready"
        );

        AgentRuntime {
            planner: Planner::new(llm),
            dispatcher,
            sessions,
            policies,
            memory,
            long_context,
            audit,
            feedback: FeedbackLog::new(self.data_dir.join("feedback.jsonl")),
            clock,
            data_dir: self.data_dir,
            settings,
        }
    }
}

/// 便捷函数：加载配置（失败时用默认值）并创建 AgentBuilder
pub fn create_agent_builder(config_path: Option<PathBuf>) -> AgentBuilder {
    let config = crate::config::load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    AgentBuilder::new(config)
}
