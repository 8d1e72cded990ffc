//! 时间源
//!
//! 策略 TTL / 冷却、会话时间戳、审计日志都从 Clock 取毫秒时间戳；测试用 ManualClock 精确推进时间。

use std::sync::atomic::{AtomicI64, Ordering};

/// 毫秒级 Unix 时间戳来源
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// 系统时钟（chrono::Utc）
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// 手动时钟：只在 set / advance 时变化
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
