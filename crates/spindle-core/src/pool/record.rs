//! Submission bookkeeping: ids, pending entries, reap history.

use std::fmt;
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies one submitted thread. Ids are handed out in submission order,
/// so comparing two ids compares their submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubmissionId(u64);

impl SubmissionId {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "submission-{}", self.0)
    }
}

/// A submitted thread waiting for the reaper.
///
/// `handle` is `Some` while Submitted. The reaper takes it out to join it
/// while the entry stays at the front of the queue, so `threads_running()`
/// keeps reporting the thread until it is actually joined.
pub(crate) struct PendingThread {
    pub id: SubmissionId,
    pub name: String,
    pub submitted_at: DateTime<Utc>,
    pub handle: Option<JoinHandle<()>>,
}

/// One joined thread, as recorded by the reaper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReapRecord {
    pub id: SubmissionId,
    pub name: String,
    pub submitted_at: DateTime<Utc>,
    pub joined_at: DateTime<Utc>,
    /// The thread's closure panicked; it was still joined normally.
    pub panicked: bool,
}

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub submitted: u64,
    pub joined: u64,
    pub panicked: u64,
    pub pending: usize,
}
