use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::Tick;
use crate::config::WorkerConfig;
use crate::error::{ConfigError, WorkerError, panic_message};
use crate::wait::poll_until;

/// State shared between the owner and the loop thread.
struct Shared {
    running: AtomicBool,
    stop_requested: AtomicBool,
    frequency_hz: AtomicU32,
    ticks: AtomicU64,
}

/// Runs one caller-supplied [`Tick`] on a background thread at a target rate.
///
/// - `start()` で tick ループを起動
/// - `halt()` で協調的に停止（強制終了はしない）
/// - 周波数は実行中でも変更可能（次のサイクルから反映）
///
/// The tick never runs concurrently with itself: there is exactly one loop
/// thread, and it holds the tick for its whole run.
pub struct PeriodicWorker {
    shared: Arc<Shared>,
    tick: Arc<Mutex<Box<dyn Tick>>>,
    config: WorkerConfig,
    thread: Option<JoinHandle<()>>,
}

impl PeriodicWorker {
    /// Create an idle worker. Nothing runs until [`start`](Self::start).
    pub fn new(tick: impl Tick, config: WorkerConfig) -> Result<Self, WorkerError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                frequency_hz: AtomicU32::new(config.frequency_hz),
                ticks: AtomicU64::new(0),
            }),
            tick: Arc::new(Mutex::new(Box::new(tick))),
            config,
            thread: None,
        })
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn frequency(&self) -> u32 {
        self.shared.frequency_hz.load(Ordering::Relaxed)
    }

    /// Change the tick rate. The loop picks it up when it computes its next sleep.
    pub fn set_frequency(&self, hz: u32) -> Result<(), WorkerError> {
        if hz == 0 {
            return Err(ConfigError::ZeroFrequency.into());
        }
        self.shared.frequency_hz.store(hz, Ordering::Relaxed);
        Ok(())
    }

    /// Number of ticks completed since construction (across restarts).
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::Relaxed)
    }

    /// Spawn the tick loop. `is_running()` is true when this returns.
    pub fn start(&mut self) -> Result<(), WorkerError> {
        if self.is_running() {
            return Err(WorkerError::AlreadyRunning);
        }

        // A loop left behind by a timed-out halt has exited by now.
        if let Some(previous) = self.thread.take()
            && let Err(payload) = previous.join()
        {
            warn!(
                worker = %self.config.thread_name,
                panic = %panic_message(&*payload),
                "previous tick loop had panicked"
            );
        }

        self.shared.stop_requested.store(false, Ordering::Release);
        self.shared.running.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let tick = Arc::clone(&self.tick);
        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || run_loop(shared, tick));

        match spawned {
            Ok(handle) => {
                self.thread = Some(handle);
                info!(
                    worker = %self.config.thread_name,
                    frequency_hz = self.frequency(),
                    "periodic worker started"
                );
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                Err(WorkerError::Spawn(e))
            }
        }
    }

    /// Ask the loop to stop and wait for it.
    ///
    /// `None` waits forever. With `Some(timeout)` the loop is checked at the
    /// configured poll cadence; if it is still running when the budget runs
    /// out, [`WorkerError::HaltTimeout`] is returned and the worker stays
    /// running (stop remains requested, so a later `halt` can finish the job).
    /// Halting a worker that was never started, or was already halted,
    /// returns [`WorkerError::NotRunning`].
    pub fn halt(&mut self, timeout: Option<Duration>) -> Result<(), WorkerError> {
        // A loop that died from a panicking tick still owes us a join.
        if self.thread.is_none() {
            return Err(WorkerError::NotRunning);
        }

        self.request_stop();

        let stopped = poll_until(timeout, self.config.poll_interval(), || !self.is_running());
        if !stopped {
            let budget = timeout.unwrap_or_default();
            warn!(
                worker = %self.config.thread_name,
                timeout_ms = budget.as_millis() as u64,
                "periodic worker did not stop in time"
            );
            return Err(WorkerError::HaltTimeout(budget));
        }

        if let Some(handle) = self.thread.take() {
            handle
                .join()
                .map_err(|payload| WorkerError::TickPanicked(panic_message(&*payload)))?;
        }
        info!(worker = %self.config.thread_name, ticks = self.ticks(), "periodic worker halted");
        Ok(())
    }

    fn request_stop(&self) {
        self.shared.stop_requested.store(true, Ordering::Release);
        // 待機中のループを起こす
        if let Some(handle) = &self.thread {
            handle.thread().unpark();
        }
    }
}

impl Drop for PeriodicWorker {
    fn drop(&mut self) {
        if !self.is_running() {
            return;
        }
        let timeout = self.config.drop_halt_timeout();
        if let Err(e) = self.halt(Some(timeout)) {
            // The loop thread is detached; it exits on its own once the tick returns.
            warn!(worker = %self.config.thread_name, error = %e, "periodic worker dropped while running");
        }
    }
}

/// Clears `running` when the loop exits, including by panic.
struct RunningGuard<'a>(&'a Shared);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::Release);
    }
}

fn run_loop(shared: Arc<Shared>, tick: Arc<Mutex<Box<dyn Tick>>>) {
    let _running = RunningGuard(&shared);
    // A poisoned lock only means an earlier run panicked mid-tick.
    let mut tick = tick.lock().unwrap_or_else(PoisonError::into_inner);

    let mut deadline = Instant::now();
    while !shared.stop_requested.load(Ordering::Acquire) {
        tick.tick();
        shared.ticks.fetch_add(1, Ordering::Relaxed);

        // Anchored to the previous deadline so tick duration does not accumulate.
        deadline += period(shared.frequency_hz.load(Ordering::Relaxed));
        let now = Instant::now();
        if deadline < now {
            // Fell behind: re-anchor instead of firing a burst of catch-up ticks.
            deadline = now;
        }
        sleep_until(&shared, deadline);
    }
    debug!("tick loop observed stop request");
}

fn period(hz: u32) -> Duration {
    Duration::from_secs(1) / hz.max(1)
}

/// Parks until `deadline` or until a stop request unparks this thread.
fn sleep_until(shared: &Shared, deadline: Instant) {
    loop {
        if shared.stop_requested.load(Ordering::Acquire) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::park_timeout(deadline - now);
    }
}
