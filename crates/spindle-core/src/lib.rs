//! spindle-core
//!
//! Background thread lifecycle building blocks.
//!
//! # モジュール構成
//! - **worker**: `PeriodicWorker`（周期 tick ループ、start / halt）
//! - **pool**: `ThreadPool`（投入順 join を保証する reaper 付きプール）
//! - **config**: 設定（grace period などの既定値）
//! - **error**: エラー型

pub mod config;
pub mod error;
pub mod pool;
pub mod worker;

mod wait;

pub use config::{PoolConfig, WorkerConfig};
pub use error::{ConfigError, PoolError, WorkerError};
pub use pool::{PoolStats, ReapRecord, SubmissionId, ThreadPool};
pub use worker::{PeriodicWorker, Tick};
