//! 记忆层：长期交互记忆、长上下文提示、JSON 记录文件、反馈日志

pub mod context;
pub mod feedback;
pub mod long_term;
pub mod records;

pub use context::{FileLongContext, LongContextProvider, StaticLongContext, LONG_CONTEXT_MAX_CHARS};
pub use feedback::{FeedbackEntry, FeedbackLog, FeedbackStats, Rating, DEFAULT_RECENT_FEEDBACK};
pub use long_term::{FileLongTerm, InMemoryLongTerm, LongTermMemory, NoopLongTerm};
pub use records::JsonListFile;
