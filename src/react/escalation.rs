//! 升级级别与思维签名
//!
//! 级别只由工具结果决定：有成功 → 1；无工具 → 2；尝试过工具但全部失败 → 3。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::Observation;
use crate::tools::ToolResult;

/// 签名中最多列出的观测键数
const SIGNATURE_OBS_KEYS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EscalationLevel {
    Resolved = 1,
    Unresolved = 2,
    Escalated = 3,
}

impl From<EscalationLevel> for u8 {
    fn from(level: EscalationLevel) -> u8 {
        level as u8
    }
}

impl TryFrom<u8> for EscalationLevel {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(EscalationLevel::Resolved),
            2 => Ok(EscalationLevel::Unresolved),
            3 => Ok(EscalationLevel::Escalated),
            other => Err(format!("invalid escalation level: {other}")),
        }
    }
}

impl fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

pub fn ok_count(results: &[ToolResult]) -> usize {
    results.iter().filter(|r| r.ok).count()
}

/// 由工具结果计算级别
pub fn compute_level(results: &[ToolResult]) -> EscalationLevel {
    if ok_count(results) > 0 {
        EscalationLevel::Resolved
    } else if results.is_empty() {
        EscalationLevel::Unresolved
    } else {
        EscalationLevel::Escalated
    }
}

/// `obs:<至多 4 个观测键>|tools:<工具名以 + 连接>|ok:<成功数>`，仅用于日志关联
pub fn thought_signature(observation: &Observation, results: &[ToolResult]) -> String {
    let keys: Vec<&str> = observation
        .keys()
        .take(SIGNATURE_OBS_KEYS)
        .map(String::as_str)
        .collect();
    let tools: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
    format!(
        "obs:{}|tools:{}|ok:{}",
        keys.join(","),
        tools.join("+"),
        ok_count(results)
    )
}
