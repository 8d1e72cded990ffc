//! 策略规则引擎
//!
//! 声明式、带 TTL 的「触发条件 → 工具动作」规则，不经过生成后端即可自动触发工具。
//! 创建时做准入检查，求值时做隐私 / 冷却 / 条件三道闸门。

pub mod engine;
pub mod predicate;
pub mod safety;
pub mod store;
pub mod types;

pub use engine::{PolicyDefaults, PolicyEngine};
pub use safety::PolicyRejection;
pub use store::{FilePolicyStore, MemoryPolicyStore, PolicyStore};
pub use types::{
    PathRef, Policy, PolicyAction, PolicyDraft, PrivacyMode, Safeguards, Threshold, Triggers,
    VerifyClaim,
};
