use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by [`PeriodicWorker`](crate::worker::PeriodicWorker).
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker is already running")]
    AlreadyRunning,

    #[error("halt called on a worker that is not running")]
    NotRunning,

    /// The loop did not observe the stop request within the budget.
    /// The worker is still running; `halt` may be called again.
    #[error("worker did not stop within {0:?}")]
    HaltTimeout(Duration),

    #[error("tick panicked: {0}")]
    TickPanicked(String),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors surfaced by [`ThreadPool`](crate::pool::ThreadPool).
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to spawn thread `{name}`: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The reaper did not report completion within the grace periods and
    /// was left detached.
    #[error("reaper did not finish within grace period ({pending} thread(s) still pending)")]
    ShutdownDegraded { pending: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration rejected by `validate()` or by the JSON loader.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("frequency must be at least 1 Hz")]
    ZeroFrequency,

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("thread name prefix must not be empty")]
    EmptyThreadName,

    #[error("invalid config json: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Extracts a readable message from a `JoinHandle::join` panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let err = std::thread::spawn::<_, ()>(|| panic!("boom")).join().unwrap_err();
        assert_eq!(panic_message(&*err), "boom");

        let err = std::thread::spawn::<_, ()>(|| panic!("{}", String::from("formatted")))
            .join()
            .unwrap_err();
        assert_eq!(panic_message(&*err), "formatted");
    }

    #[test]
    fn errors_render_readable_messages() {
        let err = PoolError::ShutdownDegraded { pending: 3 };
        assert!(err.to_string().contains("3 thread(s)"));

        let err = WorkerError::from(ConfigError::ZeroFrequency);
        assert_eq!(err.to_string(), "frequency must be at least 1 Hz");
    }
}
