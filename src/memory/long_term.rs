//! 长期记忆：跨会话的交互记录
//!
//! append_interaction 记录每一步的输入输出摘要；build_snippet 取最近若干条拼成有长度上限的文本片段放进 prompt。
//! 两个操作都是尽力而为，编排层吞掉错误。隐私模式为 off 时不产出片段。

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;

use crate::core::Clock;
use crate::memory::JsonListFile;
use crate::policy::PrivacyMode;

/// 长期记忆 trait
#[async_trait]
pub trait LongTermMemory: Send + Sync {
    /// 追加一条交互记录，只保留最新的 max_items 条
    async fn append_interaction(
        &self,
        kind: &str,
        payload: Value,
        max_items: usize,
    ) -> anyhow::Result<()>;

    /// 最近 limit 条记录组成的片段，总长不超过 max_chars 个字符
    async fn build_snippet(
        &self,
        preferences: &Map<String, Value>,
        limit: usize,
        max_chars: usize,
    ) -> anyhow::Result<String>;
}

/// 空实现：未启用长期记忆时使用
#[derive(Clone, Default)]
pub struct NoopLongTerm;

#[async_trait]
impl LongTermMemory for NoopLongTerm {
    async fn append_interaction(&self, _kind: &str, _payload: Value, _max_items: usize) -> anyhow::Result<()> {
        Ok(())
    }

    async fn build_snippet(
        &self,
        _preferences: &Map<String, Value>,
        _limit: usize,
        _max_chars: usize,
    ) -> anyhow::Result<String> {
        Ok(String::new())
    }
}

/// 内存实现
pub struct InMemoryLongTerm {
    records: RwLock<Vec<Value>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryLongTerm {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl LongTermMemory for InMemoryLongTerm {
    async fn append_interaction(&self, kind: &str, payload: Value, max_items: usize) -> anyhow::Result<()> {
        let mut records = self.records.write().await;
        records.push(record(self.clock.now_ms(), kind, payload));
        let excess = records.len().saturating_sub(max_items);
        records.drain(..excess);
        Ok(())
    }

    async fn build_snippet(
        &self,
        preferences: &Map<String, Value>,
        limit: usize,
        max_chars: usize,
    ) -> anyhow::Result<String> {
        if PrivacyMode::from_preferences(preferences) == PrivacyMode::Off {
            return Ok(String::new());
        }
        let records = self.records.read().await;
        Ok(render_snippet(&records, limit, max_chars))
    }
}

/// 文件实现：`<data_dir>/long_memory.json`
pub struct FileLongTerm {
    file: JsonListFile,
    clock: Arc<dyn Clock>,
}

impl FileLongTerm {
    pub fn new(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Self {
        Self {
            file: JsonListFile::new(path),
            clock,
        }
    }
}

#[async_trait]
impl LongTermMemory for FileLongTerm {
    async fn append_interaction(&self, kind: &str, payload: Value, max_items: usize) -> anyhow::Result<()> {
        self.file
            .append(record(self.clock.now_ms(), kind, payload), Some(max_items))
            .await
    }

    async fn build_snippet(
        &self,
        preferences: &Map<String, Value>,
        limit: usize,
        max_chars: usize,
    ) -> anyhow::Result<String> {
        if PrivacyMode::from_preferences(preferences) == PrivacyMode::Off {
            return Ok(String::new());
        }
        let records = self.file.load().await?;
        Ok(render_snippet(&records, limit, max_chars))
    }
}

fn record(t: i64, kind: &str, payload: Value) -> Value {
    json!({ "t": t, "kind": kind, "payload": payload })
}

/// 每条一行：`- [kind] 摘要`；从最新往前取，超出 max_chars 即停止，输出按时间正序
fn render_snippet(records: &[Value], limit: usize, max_chars: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut used = 0usize;
    for r in records.iter().rev().take(limit) {
        let kind = r.get("kind").and_then(Value::as_str).unwrap_or("interaction");
        let line = format!("- [{}] {}", kind, summarize(r.get("payload").unwrap_or(&Value::Null)));
        let len = line.chars().count() + 1;
        if used + len > max_chars {
            break;
        }
        used += len;
        lines.push(line);
    }
    lines.reverse();
    lines.join("\n")
}

/// 优先取 output.final，其次 output.thoughts，否则压缩 JSON
fn summarize(payload: &Value) -> String {
    let output = payload.get("output");
    let text = output
        .and_then(|o| o.get("final"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| output.and_then(|o| o.get("thoughts")).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| payload.to_string());
    let single_line = text.replace('\n', " / ");
    truncate_chars(&single_line, 240)
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
