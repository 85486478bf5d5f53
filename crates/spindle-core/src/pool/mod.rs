//! Pool - reaper 付きスレッドプール
//!
//! Fire-and-forget OS threads whose handles are joined in submission order
//! by a background reaper.

mod reaper;
mod record;
mod thread_pool;

pub use record::{PoolStats, ReapRecord, SubmissionId};
pub use thread_pool::ThreadPool;
