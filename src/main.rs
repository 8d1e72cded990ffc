//! OmniSense 命令行
//!
//! 入口：初始化日志、按配置构建 AgentRuntime，执行子命令并把结果以 JSON 打印到标准输出。

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};

use omnisense::agent::GoalRequest;
use omnisense::core::builder::create_agent_builder;
use omnisense::core::{AgentError, Observation};
use omnisense::memory::{Rating, DEFAULT_RECENT_FEEDBACK};
use omnisense::observability::audit::DEFAULT_RECENT;
use omnisense::policy::{PolicyDraft, PrivacyMode};
use omnisense::react::StepInput;

/// OmniSense - meeting assistant agent core
#[derive(Parser, Debug)]
#[command(name = "omnisense")]
#[command(version)]
#[command(about = "Run agent steps, goals, sessions and policies from the command line.", long_about = None)]
struct Cli {
    /// Extra config file layered over config/default.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override [app] data_dir
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one orchestration step
    Step {
        /// Observation as a JSON object
        #[arg(short, long, default_value = "{}")]
        observation: String,

        /// Preferences as a JSON object
        #[arg(short, long, default_value = "{}")]
        preferences: String,

        /// Maximum tool calls for this step
        #[arg(long)]
        max_tools: Option<usize>,
    },

    /// Run a multi-step goal
    Run {
        goal: String,

        #[arg(long)]
        steps: Option<usize>,

        #[arg(long)]
        max_tools: Option<usize>,

        /// Preferences as a JSON object
        #[arg(short, long, default_value = "{}")]
        preferences: String,
    },

    /// Manage the session timeline
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Manage autonomous policies
    Policy {
        #[command(subcommand)]
        command: PolicyCommands,
    },

    /// Record or inspect feedback
    Feedback {
        #[command(subcommand)]
        command: FeedbackCommands,
    },

    /// Show recent audit log records
    Audit {
        #[arg(short, long, default_value_t = DEFAULT_RECENT)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
enum SessionCommands {
    Start,
    Stop,
    Status,
}

#[derive(Subcommand, Debug)]
enum PolicyCommands {
    /// List live policies
    List,
    /// Create a policy from a JSON file
    Create { file: PathBuf },
    /// Evaluate policies against an observation
    Evaluate {
        #[arg(short, long, default_value = "{}")]
        observation: String,
        #[arg(long, default_value = "cloud")]
        privacy: PrivacyMode,
    },
}

#[derive(Subcommand, Debug)]
enum FeedbackCommands {
    /// Rate an action
    Add {
        action_id: String,
        #[arg(long, default_value = "")]
        action_type: String,
        /// up or down
        #[arg(long)]
        down: bool,
        #[arg(long)]
        correction: Option<String>,
    },
    /// List recent feedback
    List {
        #[arg(short, long, default_value_t = DEFAULT_RECENT_FEEDBACK)]
        limit: usize,
    },
    /// Accuracy summary
    Stats,
}

fn parse_object(raw: &str, what: &str) -> anyhow::Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).with_context(|| format!("{what} is not valid JSON"))? {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("{what} must be a JSON object"),
    }
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    omnisense::observability::init();
    let cli = Cli::parse();

    let mut builder = create_agent_builder(cli.config);
    if let Some(dir) = cli.data_dir {
        builder = builder.with_data_dir(dir);
    }
    let runtime = builder.build().await;

    match cli.command {
        Commands::Step {
            observation,
            preferences,
            max_tools,
        } => {
            let input = StepInput {
                observation: parse_object(&observation, "observation")?,
                preferences: parse_object(&preferences, "preferences")?,
                max_tools,
            };
            let out = runtime.act(input).await.context("Step refused")?;
            print_json(&json!(out))?;
        }
        Commands::Run {
            goal,
            steps,
            max_tools,
            preferences,
        } => {
            let request = GoalRequest {
                goal,
                steps,
                max_tools_per_step: max_tools,
                preferences: parse_object(&preferences, "preferences")?,
            };
            let report = runtime.run_goal(request).await.context("Goal run failed")?;
            let last_final = report.trace.last().and_then(|t| t.out.final_text.clone());
            print_json(&json!({ "report": report, "final": last_final }))?;
        }
        Commands::Session { command } => {
            let sessions = runtime.sessions();
            let session = match command {
                SessionCommands::Start => Some(sessions.start().await),
                SessionCommands::Stop => sessions.stop().await,
                SessionCommands::Status => sessions.status().await,
            };
            print_json(&json!({ "session": session }))?;
        }
        Commands::Policy { command } => match command {
            PolicyCommands::List => {
                print_json(&json!({ "policies": runtime.policies().list().await }))?;
            }
            PolicyCommands::Create { file } => {
                let raw = tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let draft: PolicyDraft =
                    serde_json::from_str(&raw).context("Policy file is not a valid policy")?;
                match runtime.activate_policy(draft).await {
                    Ok(policy) => print_json(&json!({ "ok": true, "policy": policy }))?,
                    Err(AgentError::PolicyRejected(rejection)) => {
                        print_json(&json!({ "ok": false, "error": rejection.to_string() }))?
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            PolicyCommands::Evaluate {
                observation,
                privacy,
            } => {
                let observation: Observation = parse_object(&observation, "observation")?;
                runtime.policies().evaluate(&observation, privacy).await;
                print_json(&json!({ "ok": true }))?;
            }
        },
        Commands::Feedback { command } => match command {
            FeedbackCommands::Add {
                action_id,
                action_type,
                down,
                correction,
            } => {
                let rating = if down { Rating::Down } else { Rating::Up };
                let entry = runtime
                    .record_feedback(&action_id, &action_type, rating, correction)
                    .await?;
                print_json(&json!({ "ok": true, "entry": entry }))?;
            }
            FeedbackCommands::List { limit } => {
                print_json(&json!({ "items": runtime.recent_feedback(limit).await }))?;
            }
            FeedbackCommands::Stats => {
                print_json(&json!(runtime.feedback_stats().await))?;
            }
        },
        Commands::Audit { limit } => {
            print_json(&json!({ "items": runtime.audit().read_recent(limit).await }))?;
        }
    }

    Ok(())
}
