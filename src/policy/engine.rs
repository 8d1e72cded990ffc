//! 策略引擎
//!
//! evaluate 不调用生成后端：清理过期 / 达到上限的策略，按 priority 降序（同级保持插入顺序）依次检查
//! 隐私、冷却、触发条件三道闸门；通过则顺序执行动作（失败不影响后续），有 verify 声明时补一次校验，
//! 随后无条件更新 fireCount / lastFiredAt。读-改-写整表在一把锁内完成。

use std::cmp::Reverse;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;

use crate::core::{Clock, Observation};
use crate::policy::types::ms_to_i64;
use crate::policy::{predicate, safety, Policy, PolicyDraft, PolicyRejection, PolicyStore, PrivacyMode, Safeguards};
use crate::tools::ToolDispatcher;

/// 创建策略时缺省 safeguards 的取值（来自 [policy] 配置段）
#[derive(Debug, Clone, Copy)]
pub struct PolicyDefaults {
    pub cooldown_ms: u64,
    pub privacy_floor: PrivacyMode,
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        Self {
            cooldown_ms: 60_000,
            privacy_floor: PrivacyMode::Cloud,
        }
    }
}

/// 策略引擎
pub struct PolicyEngine {
    store: Arc<dyn PolicyStore>,
    dispatcher: Arc<ToolDispatcher>,
    clock: Arc<dyn Clock>,
    defaults: PolicyDefaults,
    lock: Mutex<()>,
}

impl PolicyEngine {
    pub fn new(
        store: Arc<dyn PolicyStore>,
        dispatcher: Arc<ToolDispatcher>,
        clock: Arc<dyn Clock>,
        defaults: PolicyDefaults,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            defaults,
            lock: Mutex::new(()),
        }
    }

    /// 准入检查后创建（同 id 覆盖）；持久化失败只记 warn
    pub async fn create(&self, draft: PolicyDraft) -> Result<Policy, PolicyRejection> {
        safety::check_required(&draft)?;
        safety::check_safety(&draft)?;

        let _guard = self.lock.lock().await;
        let now = self.clock.now_ms();
        let policy = Policy {
            id: draft.id,
            intent: draft.intent,
            triggers: draft.triggers,
            actions: draft.actions,
            safeguards: draft.safeguards.unwrap_or(Safeguards {
                cooldown_ms: self.defaults.cooldown_ms,
                max_firings: None,
                privacy_floor: self.defaults.privacy_floor,
            }),
            verify: draft.verify,
            ttl_ms: draft.ttl_ms,
            priority: draft.priority.unwrap_or(0),
            created_at: now,
            expires_at: now.saturating_add(ms_to_i64(draft.ttl_ms)),
            last_fired_at: None,
            fire_count: 0,
        };

        let mut items = self.load().await;
        match items.iter_mut().find(|p| p.id == policy.id) {
            Some(existing) => *existing = policy.clone(),
            None => items.push(policy.clone()),
        }
        self.save(&items).await;
        tracing::info!(policy = %policy.id, priority = policy.priority, "policy activated");
        Ok(policy)
    }

    /// 清理后的策略列表（插入顺序）
    pub async fn list(&self) -> Vec<Policy> {
        let _guard = self.lock.lock().await;
        self.load_pruned(self.clock.now_ms()).await
    }

    /// 对观测求值并触发匹配的策略；不返回错误
    pub async fn evaluate(&self, observation: &Observation, privacy: PrivacyMode) {
        let _guard = self.lock.lock().await;
        let now = self.clock.now_ms();
        let mut items = self.load_pruned(now).await;

        let mut order: Vec<usize> = (0..items.len()).collect();
        order.sort_by_key(|&i| Reverse(items[i].priority));

        let mut fired = 0usize;
        for i in order {
            let policy = &items[i];
            if !policy.safeguards.privacy_floor.permits(privacy) {
                continue;
            }
            if !policy.cooled_down(now) {
                continue;
            }
            if !predicate::matches(observation, policy.triggers.as_ref()) {
                continue;
            }

            for action in &policy.actions {
                let r = self.dispatcher.dispatch(&action.name, action.args.clone()).await;
                if !r.ok {
                    tracing::warn!(
                        policy = %policy.id,
                        action = %action.name,
                        error = r.error.as_deref().unwrap_or_default(),
                        "policy action failed"
                    );
                }
            }
            if let Some(verify) = &policy.verify {
                self.dispatcher
                    .dispatch("agent.verify_step", json!({ "claim": verify.claim, "pass": true }))
                    .await;
            }

            let fired_at = self.clock.now_ms();
            items[i].mark_fired(fired_at);
            fired += 1;
            tracing::info!(policy = %items[i].id, fire_count = items[i].fire_count, "policy fired");
        }

        if fired > 0 {
            self.save(&items).await;
        }
    }

    async fn load(&self) -> Vec<Policy> {
        match self.store.load().await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(error = %e, "policy load failed");
                Vec::new()
            }
        }
    }

    async fn save(&self, items: &[Policy]) {
        if let Err(e) = self.store.save(items).await {
            tracing::warn!(error = %e, "policy save failed");
        }
    }

    /// 读取并剔除过期 / 达到触发上限的策略；有变化时写回
    async fn load_pruned(&self, now: i64) -> Vec<Policy> {
        let items = self.load().await;
        let before = items.len();
        let kept: Vec<Policy> = items.into_iter().filter(|p| p.is_live(now)).collect();
        if kept.len() != before {
            tracing::debug!(pruned = before - kept.len(), "policies pruned");
            self.save(&kept).await;
        }
        kept
    }
}
