//! Bounded polling shared by the lifecycle calls.

use std::thread;
use std::time::{Duration, Instant};

/// Polls `done` every `cadence` until it returns true or `timeout` elapses.
///
/// `None` waits forever. The final sleep is clipped to the deadline so the
/// total wait never exceeds `timeout` by more than one check.
pub(crate) fn poll_until(
    timeout: Option<Duration>,
    cadence: Duration,
    mut done: impl FnMut() -> bool,
) -> bool {
    let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
    loop {
        if done() {
            return true;
        }
        let nap = match deadline {
            None => cadence,
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                cadence.min(deadline - now)
            }
        };
        thread::sleep(nap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn returns_immediately_when_already_done() {
        let started = Instant::now();
        assert!(poll_until(Some(Duration::from_secs(5)), Duration::from_millis(33), || true));
        assert!(started.elapsed() < Duration::from_millis(30));
    }

    #[test]
    fn gives_up_after_timeout() {
        let started = Instant::now();
        let done = poll_until(Some(Duration::from_millis(100)), Duration::from_millis(33), || false);
        assert!(!done);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(100));
        assert!(waited < Duration::from_millis(500));
    }

    #[test]
    fn observes_flag_set_by_another_thread() {
        let flag = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&flag);
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            setter.store(true, Ordering::SeqCst);
        });
        assert!(poll_until(None, Duration::from_millis(10), || flag.load(Ordering::SeqCst)));
        t.join().unwrap();
    }
}
