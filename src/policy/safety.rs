//! 策略准入检查
//!
//! 创建时对 intent 与序列化后的 actions 做静态关键字匹配（不区分大小写），不做语义判断。

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::policy::PolicyDraft;

/// 策略被拒绝的原因；Display 即对外返回的错误码
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyRejection {
    #[error("missing_fields")]
    MissingFields,

    /// 医疗建议类用语
    #[error("forbidden_scope")]
    ForbiddenScope,

    /// 受保护属性推断类用语
    #[error("sensitive_inference")]
    SensitiveInference,
}

fn forbidden_scope() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)diagnos|prescrib|medical advice|therapy").expect("static regex")
    })
}

fn sensitive_inference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)demograph|ethnic|religion|political").expect("static regex")
    })
}

/// 必填字段检查：id、intent、triggers、actions、ttlMs > 0
pub fn check_required(draft: &PolicyDraft) -> Result<(), PolicyRejection> {
    if draft.id.trim().is_empty()
        || draft.intent.trim().is_empty()
        || draft.triggers.is_none()
        || draft.actions.is_empty()
        || draft.ttl_ms == 0
    {
        return Err(PolicyRejection::MissingFields);
    }
    Ok(())
}

/// 关键字检查
pub fn check_safety(draft: &PolicyDraft) -> Result<(), PolicyRejection> {
    let actions = serde_json::to_string(&draft.actions).unwrap_or_default();
    let text = format!("{} {}", draft.intent, actions);
    if forbidden_scope().is_match(&text) {
        return Err(PolicyRejection::ForbiddenScope);
    }
    if sensitive_inference().is_match(&text) {
        return Err(PolicyRejection::SensitiveInference);
    }
    Ok(())
}
