//! 可观测性：tracing 初始化与持久化审计日志

pub mod audit;

pub use audit::AuditLog;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化 tracing：默认 info，可用 RUST_LOG 覆盖；重复调用时忽略
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}
