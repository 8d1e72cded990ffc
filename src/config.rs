//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `OMNI__*` 覆盖（双下划线表示嵌套，如 `OMNI__AGENT__MAX_TOOLS=3`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::llm::RetryConfig;
use crate::policy::PrivacyMode;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub memory: MemorySection,
    pub tools: ToolsSection,
    pub policy: PolicySection,
}

/// [app] 段：数据目录（会话、策略、审计日志、日历等 JSON 文件）
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".data")
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// openai / deepseek / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次生成尝试的截止时间（秒），0 表示不限
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

/// [agent] 段：单步工具上限、系统指令、重试
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_max_tools")]
    pub max_tools: usize,
    /// 未设置时依次尝试 config/prompts/system.txt 与内置指令
    pub system_instruction: Option<String>,
    #[serde(default)]
    pub retry: RetrySection,
}

fn default_max_tools() -> usize {
    2
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_tools: default_max_tools(),
            system_instruction: None,
            retry: RetrySection::default(),
        }
    }
}

/// [agent.retry] 段
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

fn default_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    2000
}

fn default_jitter_ms() -> u64 {
    100
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

/// [memory] 段：长期记忆片段大小与保留条数
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    #[serde(default = "default_snippet_limit")]
    pub snippet_limit: usize,
    #[serde(default = "default_snippet_max_chars")]
    pub snippet_max_chars: usize,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

fn default_snippet_limit() -> usize {
    24
}

fn default_snippet_max_chars() -> usize {
    2200
}

fn default_max_items() -> usize {
    800
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            snippet_limit: default_snippet_limit(),
            snippet_max_chars: default_snippet_max_chars(),
            max_items: default_max_items(),
        }
    }
}

/// [tools] 段：工具超时、参数校验开关、研究接口
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// 按工具声明的 schema 校验参数（默认关闭：schema 仅供生成后端参考）
    #[serde(default)]
    pub validate_args: bool,
    #[serde(default)]
    pub research: ResearchSection,
}

fn default_tool_timeout_secs() -> u64 {
    30
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            validate_args: false,
            research: ResearchSection::default(),
        }
    }
}

/// [tools.research] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ResearchSection {
    #[serde(default = "default_research_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_research_timeout_secs() -> u64 {
    10
}

impl Default for ResearchSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_research_timeout_secs(),
        }
    }
}

/// [policy] 段：创建策略时缺省 safeguards 的取值
#[derive(Debug, Clone, Deserialize)]
pub struct PolicySection {
    #[serde(default = "default_cooldown_ms")]
    pub default_cooldown_ms: u64,
    #[serde(default = "default_privacy_floor")]
    pub default_privacy_floor: PrivacyMode,
}

fn default_cooldown_ms() -> u64 {
    60_000
}

fn default_privacy_floor() -> PrivacyMode {
    PrivacyMode::Cloud
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            default_cooldown_ms: default_cooldown_ms(),
            default_privacy_floor: default_privacy_floor(),
        }
    }
}

impl AppConfig {
    /// 由 [agent.retry] 与 [llm.timeouts] 组合出重试策略
    pub fn retry_config(&self) -> RetryConfig {
        let r = &self.agent.retry;
        RetryConfig {
            attempts: r.attempts.max(1),
            base_delay: Duration::from_millis(r.base_delay_ms),
            max_delay: Duration::from_millis(r.max_delay_ms),
            jitter: Duration::from_millis(r.jitter_ms),
            attempt_timeout: match self.llm.timeouts.request {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

/// 从 config 目录加载配置，环境变量 OMNI__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 OMNI__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("OMNI")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
