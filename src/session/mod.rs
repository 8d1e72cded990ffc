//! 会话事件存储
//!
//! 进程内至多一个活动会话（无 endedAt）；事件只追加。存储通过 SessionStore trait 注入，
//! 内存实现用于测试与单进程，文件实现每次变更整份重写 `<data_dir>/agent.json`。

pub mod file_store;
pub mod store;
pub mod types;

pub use file_store::FileSessionStore;
pub use store::{MemorySessionStore, SessionStore};
pub use types::{AgentEvent, AgentSession, EventKind};
