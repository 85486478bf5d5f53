//! Worker - 周期実行ワーカー
//!
//! A [`PeriodicWorker`] owns one background thread that calls a [`Tick`]
//! at a configurable frequency until halted.

mod periodic;
mod tick;

pub use periodic::PeriodicWorker;
pub use tick::Tick;
