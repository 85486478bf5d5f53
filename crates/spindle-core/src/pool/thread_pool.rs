use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::reaper;
use super::record::{PendingThread, PoolStats, ReapRecord, SubmissionId};
use crate::config::PoolConfig;
use crate::error::PoolError;

/// Everything the reaper and the owner share. One mutex guards the whole
/// state; the two condvars only signal changes to it.
pub(crate) struct PoolState {
    pub pending: VecDeque<PendingThread>,
    pub shutdown_requested: bool,
    pub reaper_finished: bool,
    pub next_id: u64,
    pub joined: u64,
    pub panicked: u64,
    history: VecDeque<ReapRecord>,
    history_capacity: usize,
}

impl PoolState {
    pub fn record(&mut self, record: ReapRecord) {
        if self.history_capacity == 0 {
            return;
        }
        if self.history.len() == self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }
}

pub(crate) struct Shared {
    state: Mutex<PoolState>,
    /// Signalled on submit and on shutdown request (reaper waits on it).
    work: Condvar,
    /// Signalled after each join and when the reaper finishes.
    progress: Condvar,
    poll_interval: Duration,
}

impl Shared {
    /// No user code runs under this lock, so a poisoned state is still consistent.
    pub fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Idle wait of the reaper, capped at the poll interval.
    pub fn wait_for_work<'a>(&self, guard: MutexGuard<'a, PoolState>) -> MutexGuard<'a, PoolState> {
        match self.work.wait_timeout(guard, self.poll_interval) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }

    pub fn notify_progress(&self) {
        self.progress.notify_all();
    }

    /// Blocks up to `timeout` while `condition` holds; returns the guard either way.
    fn wait_progress_while<'a>(
        &self,
        guard: MutexGuard<'a, PoolState>,
        timeout: Duration,
        condition: impl FnMut(&mut PoolState) -> bool,
    ) -> MutexGuard<'a, PoolState> {
        match self.progress.wait_timeout_while(guard, timeout, condition) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }
}

/// A pool of fire-and-forget OS threads with ordered join-on-shutdown.
///
/// Every [`submit`](Self::submit) spawns a new thread and queues its handle.
/// A dedicated reaper thread joins the queued handles strictly in submission
/// order, even when a later thread finishes first.
///
/// Dropping the pool (or calling [`shutdown`](Self::shutdown)) requests
/// shutdown, gives pending threads `drain_grace` to finish and the reaper
/// `reaper_grace` to report back. A thread that refuses to finish cannot
/// hang shutdown: the reaper is detached and the degradation is reported.
///
/// # Example
/// ```
/// use spindle_core::pool::ThreadPool;
/// use std::time::Duration;
///
/// let pool = ThreadPool::new().unwrap();
/// for _ in 0..5 {
///     pool.submit(|| std::thread::sleep(Duration::from_millis(50))).unwrap();
/// }
/// assert!(pool.join(Duration::from_millis(2000)));
/// assert_eq!(pool.size(), 0);
/// ```
pub struct ThreadPool {
    shared: Arc<Shared>,
    reaper: Option<JoinHandle<()>>,
    config: PoolConfig,
}

impl ThreadPool {
    /// Pool with the default config (2 s drain grace, 1 s reaper grace).
    pub fn new() -> Result<Self, PoolError> {
        Self::with_config(PoolConfig::default())
    }

    pub fn with_config(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                pending: VecDeque::new(),
                shutdown_requested: false,
                reaper_finished: false,
                next_id: 0,
                joined: 0,
                panicked: 0,
                history: VecDeque::new(),
                history_capacity: config.history_capacity,
            }),
            work: Condvar::new(),
            progress: Condvar::new(),
            poll_interval: config.poll_interval(),
        });

        let name = format!("{}-reaper", config.thread_name_prefix);
        let reaper_shared = Arc::clone(&shared);
        let reaper = thread::Builder::new()
            .name(name.clone())
            .spawn(move || reaper::run(reaper_shared))
            .map_err(|source| PoolError::Spawn { name, source })?;

        debug!(prefix = %config.thread_name_prefix, "thread pool created");
        Ok(Self {
            shared,
            reaper: Some(reaper),
            config,
        })
    }

    /// Spawn `f` on a new thread and queue it for the reaper. Returns immediately.
    pub fn submit<F>(&self, f: F) -> Result<SubmissionId, PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.lock();
        let id = SubmissionId::new(state.next_id);
        let name = format!("{}-{}", self.config.thread_name_prefix, id.as_u64());

        // Spawning under the lock keeps queue order equal to id order when
        // several threads submit at once.
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(f)
            .map_err(|source| PoolError::Spawn {
                name: name.clone(),
                source,
            })?;

        state.next_id += 1;
        state.pending.push_back(PendingThread {
            id,
            name,
            submitted_at: Utc::now(),
            handle: Some(handle),
        });
        drop(state);

        self.shared.work.notify_one();
        debug!(%id, "thread submitted");
        Ok(id)
    }

    /// Number of submitted threads not yet joined.
    pub fn size(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn threads_running(&self) -> bool {
        !self.shared.lock().pending.is_empty()
    }

    /// Wait up to `wait` for every submitted thread to be joined.
    ///
    /// Returns `true` as soon as nothing is pending, `false` if `wait`
    /// elapses first. Does not request shutdown; more work may be submitted
    /// afterwards.
    pub fn join(&self, wait: Duration) -> bool {
        let state = self.shared.lock();
        let state = self
            .shared
            .wait_progress_while(state, wait, |s| !s.pending.is_empty());
        state.pending.is_empty()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock();
        PoolStats {
            submitted: state.next_id,
            joined: state.joined,
            panicked: state.panicked,
            pending: state.pending.len(),
        }
    }

    /// The most recent joins, oldest first (bounded by `history_capacity`).
    pub fn recent_reaps(&self) -> Vec<ReapRecord> {
        self.shared.lock().history.iter().cloned().collect()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Shut down and report whether the reaper finished cleanly.
    ///
    /// Same sequence as `Drop`, but degradation is returned as
    /// [`PoolError::ShutdownDegraded`] instead of logged.
    pub fn shutdown(mut self) -> Result<(), PoolError> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> Result<(), PoolError> {
        let Some(reaper) = self.reaper.take() else {
            return Ok(());
        };

        {
            let mut state = self.shared.lock();
            info!(pending = state.pending.len(), "waiting for remaining threads to close");
            state.shutdown_requested = true;
        }
        self.shared.work.notify_all();

        if !self.join(self.config.drain_grace()) {
            warn!(
                pending = self.size(),
                grace_ms = self.config.drain_grace_ms,
                "threads still pending after drain grace"
            );
        }

        let state = self.shared.lock();
        let state = self
            .shared
            .wait_progress_while(state, self.config.reaper_grace(), |s| !s.reaper_finished);
        if !state.reaper_finished {
            let pending = state.pending.len();
            drop(state);
            // Detach: joining a reaper stuck on a thread would hang forever.
            drop(reaper);
            return Err(PoolError::ShutdownDegraded { pending });
        }
        drop(state);

        if let Err(payload) = reaper.join() {
            warn!(
                panic = %crate::error::panic_message(&*payload),
                "reaper panicked after finishing"
            );
        }
        info!("threads ended");
        Ok(())
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown_inner() {
            warn!(error = %e, "thread pool shutdown degraded; reaper left running");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Instant;

    fn fast_config() -> PoolConfig {
        PoolConfig::default()
            .with_drain_grace(Duration::from_millis(200))
            .with_reaper_grace(Duration::from_millis(200))
    }

    #[test]
    fn five_sleepers_drain_within_join() {
        let pool = ThreadPool::new().unwrap();
        for _ in 0..5 {
            pool.submit(|| thread::sleep(Duration::from_millis(50))).unwrap();
        }
        assert!(pool.join(Duration::from_millis(2000)));
        assert_eq!(pool.size(), 0);
        assert!(!pool.threads_running());
    }

    #[rstest]
    #[case(1)]
    #[case(8)]
    #[case(32)]
    fn join_drains_every_submission(#[case] n: usize) {
        let pool = ThreadPool::new().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..n {
            let c = Arc::clone(&counter);
            pool.submit(move || {
                thread::sleep(Duration::from_millis(10));
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        assert!(pool.join(Duration::from_millis(2000)));
        assert_eq!(counter.load(Ordering::SeqCst), n);

        let stats = pool.stats();
        assert_eq!(stats.submitted, n as u64);
        assert_eq!(stats.joined, n as u64);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn joins_in_submission_order_even_when_later_threads_finish_first() {
        let pool = ThreadPool::new().unwrap();
        let finished = Arc::new(Mutex::new(Vec::new()));

        let delays = [300u64, 10, 0, 50, 5];
        let mut ids = Vec::new();
        for delay in delays {
            let finished = Arc::clone(&finished);
            let id = pool
                .submit(move || {
                    thread::sleep(Duration::from_millis(delay));
                    finished.lock().unwrap().push(delay);
                })
                .unwrap();
            ids.push(id);
        }
        assert!(pool.join(Duration::from_millis(2000)));

        // The slow first thread finished last...
        assert_eq!(finished.lock().unwrap().last(), Some(&300));

        // ...but was still joined first.
        let reaps = pool.recent_reaps();
        let reaped_ids: Vec<_> = reaps.iter().map(|r| r.id).collect();
        assert_eq!(reaped_ids, ids);
        assert!(reaps.windows(2).all(|w| w[0].joined_at <= w[1].joined_at));
    }

    #[test]
    fn threads_running_until_joined() {
        let pool = ThreadPool::new().unwrap();
        let (tx, rx) = mpsc::channel::<()>();
        pool.submit(move || {
            let _ = rx.recv();
        })
        .unwrap();

        assert!(pool.threads_running());
        assert_eq!(pool.size(), 1);
        assert!(!pool.join(Duration::from_millis(50)));

        tx.send(()).unwrap();
        assert!(pool.join(Duration::from_millis(1000)));
        assert!(!pool.threads_running());
    }

    #[test]
    fn join_times_out_then_succeeds() {
        let pool = ThreadPool::new().unwrap();
        pool.submit(|| thread::sleep(Duration::from_millis(300))).unwrap();

        let started = Instant::now();
        assert!(!pool.join(Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_millis(250));

        assert!(pool.join(Duration::from_millis(2000)));
    }

    #[test]
    fn join_on_empty_pool_returns_immediately() {
        let pool = ThreadPool::new().unwrap();
        assert!(pool.join(Duration::ZERO));
    }

    #[test]
    fn idle_shutdown_is_clean_and_fast() {
        let pool = ThreadPool::new().unwrap();
        pool.submit(|| {}).unwrap();
        assert!(pool.join(Duration::from_millis(1000)));

        let started = Instant::now();
        pool.shutdown().unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn shutdown_waits_for_pending_threads() {
        let pool = ThreadPool::new().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let c = Arc::clone(&counter);
            pool.submit(move || {
                thread::sleep(Duration::from_millis(100));
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.shutdown().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn drop_joins_pending_threads() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = ThreadPool::new().unwrap();
            let c = Arc::clone(&counter);
            pool.submit(move || {
                thread::sleep(Duration::from_millis(100));
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stuck_thread_degrades_shutdown_without_hanging() {
        let pool = ThreadPool::with_config(fast_config()).unwrap();
        pool.submit(|| thread::sleep(Duration::from_secs(3))).unwrap();

        let started = Instant::now();
        let err = pool.shutdown().unwrap_err();
        assert!(matches!(err, PoolError::ShutdownDegraded { pending: 1 }));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn panicking_thread_is_joined_and_counted() {
        let pool = ThreadPool::new().unwrap();
        pool.submit(|| panic!("submitted thread failed")).unwrap();
        pool.submit(|| {}).unwrap();
        assert!(pool.join(Duration::from_millis(1000)));

        let stats = pool.stats();
        assert_eq!(stats.joined, 2);
        assert_eq!(stats.panicked, 1);

        let reaps = pool.recent_reaps();
        assert!(reaps[0].panicked);
        assert!(!reaps[1].panicked);
        pool.shutdown().unwrap();
    }

    #[test]
    fn history_keeps_only_most_recent_reaps() {
        let pool = ThreadPool::with_config(PoolConfig::default().with_history_capacity(2)).unwrap();
        for _ in 0..5 {
            pool.submit(|| {}).unwrap();
        }
        assert!(pool.join(Duration::from_millis(1000)));

        let ids: Vec<u64> = pool.recent_reaps().iter().map(|r| r.id.as_u64()).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[test]
    fn submitted_threads_are_named_after_prefix() {
        let pool =
            ThreadPool::with_config(PoolConfig::default().with_thread_name_prefix("cards")).unwrap();
        let (tx, rx) = mpsc::channel();
        pool.submit(move || {
            let _ = tx.send(thread::current().name().map(str::to_string));
        })
        .unwrap();

        assert_eq!(rx.recv().unwrap().as_deref(), Some("cards-0"));
        assert!(pool.join(Duration::from_millis(1000)));
    }

    #[test]
    fn concurrent_submitters_share_one_queue() {
        let pool = Arc::new(ThreadPool::new().unwrap());
        let submitters: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..25 {
                        pool.submit(|| thread::sleep(Duration::from_millis(1))).unwrap();
                    }
                })
            })
            .collect();
        for s in submitters {
            s.join().unwrap();
        }

        assert!(pool.join(Duration::from_secs(5)));
        let reaps = pool.recent_reaps();
        assert_eq!(reaps.len(), 100);
        assert!(reaps.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = ThreadPool::with_config(PoolConfig::default().with_thread_name_prefix(""));
        assert!(matches!(result, Err(PoolError::Config(_))));
    }
}
