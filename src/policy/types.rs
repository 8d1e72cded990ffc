//! 策略数据模型
//!
//! Policy 为声明式、带 TTL 的「触发条件 → 工具动作」规则；JSON 字段名保持 camelCase，与持久化文件和 HTTP 接口一致。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 隐私档位：off < local < cloud
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyMode {
    Off,
    Local,
    #[default]
    Cloud,
}

impl PrivacyMode {
    /// 以 self 作为策略的隐私下限，判断当前模式是否满足
    ///
    /// off 总是满足；local 需要 local 或 cloud；cloud 只接受 cloud。
    pub fn permits(self, current: PrivacyMode) -> bool {
        match self {
            PrivacyMode::Off => true,
            PrivacyMode::Local => matches!(current, PrivacyMode::Local | PrivacyMode::Cloud),
            PrivacyMode::Cloud => current == PrivacyMode::Cloud,
        }
    }

    /// 从偏好 `privacyMode` 取当前模式：缺省为 cloud，无法识别的取值按 off 处理
    pub fn from_preferences(preferences: &Map<String, Value>) -> PrivacyMode {
        match preferences.get("privacyMode") {
            None | Some(Value::Null) => PrivacyMode::Cloud,
            Some(Value::String(s)) => s.parse().unwrap_or_else(|_| {
                tracing::warn!(mode = %s, "unrecognized privacyMode, treating as off");
                PrivacyMode::Off
            }),
            Some(other) => {
                tracing::warn!(mode = %other, "unrecognized privacyMode, treating as off");
                PrivacyMode::Off
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyMode::Off => "off",
            PrivacyMode::Local => "local",
            PrivacyMode::Cloud => "cloud",
        }
    }
}

impl fmt::Display for PrivacyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrivacyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(PrivacyMode::Off),
            "local" => Ok(PrivacyMode::Local),
            "cloud" => Ok(PrivacyMode::Cloud),
            other => Err(format!("unknown privacy mode: {other}")),
        }
    }
}

/// anyTrue 子句中的一项：观测中的键
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRef {
    pub path: String,
}

/// 阈值子句：observation[key] >= gte
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
}

/// 触发条件：出现的子句之间为 AND
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Triggers {
    /// 每个键都必须与观测字段相等
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub exact: Option<Map<String, Value>>,
    /// 至少一个路径为真值
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any_true: Option<Vec<PathRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Threshold>,
}

impl Triggers {
    /// 是否至少声明了一个子句；没有子句的策略永不触发
    pub fn has_clauses(&self) -> bool {
        self.exact.is_some() || self.any_true.is_some() || self.threshold.is_some()
    }
}

/// 策略动作：按声明顺序调度的工具调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyAction {
    pub name: String,
    #[serde(default = "empty_args")]
    pub args: Value,
}

fn empty_args() -> Value {
    Value::Object(Map::new())
}

/// 安全护栏；对象内缺省字段取「最宽松」值（冷却 0、隐私下限 off）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Safeguards {
    #[serde(default)]
    pub cooldown_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_firings: Option<u32>,
    #[serde(default = "floor_off", alias = "privacy")]
    pub privacy_floor: PrivacyMode,
}

fn floor_off() -> PrivacyMode {
    PrivacyMode::Off
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyClaim {
    pub claim: String,
}

/// 已准入的策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub id: String,
    pub intent: String,
    #[serde(default)]
    pub triggers: Option<Triggers>,
    #[serde(default)]
    pub actions: Vec<PolicyAction>,
    #[serde(default)]
    pub safeguards: Safeguards,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<VerifyClaim>,
    pub ttl_ms: u64,
    #[serde(default)]
    pub priority: i64,
    pub created_at: i64,
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fired_at: Option<i64>,
    #[serde(default)]
    pub fire_count: u32,
}

impl Policy {
    /// 未过期且未达到触发上限
    pub fn is_live(&self, now: i64) -> bool {
        now < self.expires_at
            && self
                .safeguards
                .max_firings
                .map_or(true, |max| self.fire_count < max)
    }

    /// 冷却已过（从未触发或距上次触发 >= cooldownMs）
    pub fn cooled_down(&self, now: i64) -> bool {
        match self.last_fired_at {
            None => true,
            Some(last) => now.saturating_sub(last) >= ms_to_i64(self.safeguards.cooldown_ms),
        }
    }

    pub(crate) fn mark_fired(&mut self, now: i64) {
        self.fire_count = self.fire_count.saturating_add(1);
        self.last_fired_at = Some(now);
    }
}

/// 创建策略的请求体（未准入、未打时间戳）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDraft {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub triggers: Option<Triggers>,
    #[serde(default)]
    pub actions: Vec<PolicyAction>,
    /// 缺省时使用 [policy] 段的默认值
    #[serde(default)]
    pub safeguards: Option<Safeguards>,
    #[serde(default)]
    pub verify: Option<VerifyClaim>,
    #[serde(default)]
    pub ttl_ms: u64,
    #[serde(default)]
    pub priority: Option<i64>,
}

/// 毫秒时长转 i64；超出范围时取 i64::MAX
pub(crate) fn ms_to_i64(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_privacy_floor_matrix() {
        use PrivacyMode::*;
        assert!(Off.permits(Off));
        assert!(Off.permits(Cloud));
        assert!(!Local.permits(Off));
        assert!(Local.permits(Local));
        assert!(Local.permits(Cloud));
        assert!(!Cloud.permits(Local));
        assert!(Cloud.permits(Cloud));
    }

    #[test]
    fn test_privacy_mode_parse() {
        assert_eq!("LOCAL".parse::<PrivacyMode>().unwrap(), PrivacyMode::Local);
        assert!("public".parse::<PrivacyMode>().is_err());
    }

    #[test]
    fn test_privacy_mode_from_preferences() {
        let prefs = |v: Value| v.as_object().cloned().unwrap();
        assert_eq!(PrivacyMode::from_preferences(&prefs(json!({}))), PrivacyMode::Cloud);
        assert_eq!(
            PrivacyMode::from_preferences(&prefs(json!({"privacyMode": "local"}))),
            PrivacyMode::Local
        );
        assert_eq!(
            PrivacyMode::from_preferences(&prefs(json!({"privacyMode": "public"}))),
            PrivacyMode::Off
        );
    }

    #[test]
    fn test_policy_json_shape() {
        let raw = json!({
            "id": "p1",
            "intent": "schedule a follow-up",
            "triggers": { "match": { "topic": "deadline" }, "anyTrue": [{ "path": "urgent" }] },
            "actions": [{ "name": "calendar.create_event", "args": { "title": "Follow-up" } }],
            "safeguards": { "cooldownMs": 1000, "privacy": "local" },
            "ttlMs": 5000,
            "createdAt": 0,
            "expiresAt": 5000
        });
        let p: Policy = serde_json::from_value(raw).unwrap();
        assert_eq!(p.safeguards.privacy_floor, PrivacyMode::Local);
        assert_eq!(p.safeguards.cooldown_ms, 1000);
        assert_eq!(p.fire_count, 0);
        assert!(p.triggers.as_ref().unwrap().has_clauses());

        let back = serde_json::to_value(&p).unwrap();
        assert_eq!(back["safeguards"]["privacyFloor"], "local");
        assert_eq!(back["triggers"]["match"]["topic"], "deadline");
    }

    #[test]
    fn test_liveness_and_cooldown() {
        let mut p: Policy = serde_json::from_value(json!({
            "id": "p", "intent": "i", "ttlMs": 100, "createdAt": 0, "expiresAt": 100,
            "safeguards": { "cooldownMs": 50, "maxFirings": 1 }
        }))
        .unwrap();
        assert!(p.is_live(99));
        assert!(!p.is_live(100));
        assert!(p.cooled_down(10));
        p.mark_fired(10);
        assert!(!p.is_live(20));
        assert!(!p.cooled_down(59));
        assert!(p.cooled_down(60));
    }

    #[test]
    fn test_huge_cooldown_still_blocks() {
        let mut p: Policy = serde_json::from_value(json!({
            "id": "p", "intent": "i", "ttlMs": 100, "createdAt": 0, "expiresAt": 100,
            "safeguards": { "cooldownMs": u64::MAX }
        }))
        .unwrap();
        p.mark_fired(10);
        assert!(!p.cooled_down(10));
        assert!(!p.cooled_down(i64::MAX));
        assert_eq!(ms_to_i64(u64::MAX), i64::MAX);
        assert_eq!(ms_to_i64(60_000), 60_000);
    }
}
