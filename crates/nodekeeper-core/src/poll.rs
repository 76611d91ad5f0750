//! Bounded polling with cooperative cancellation.
//!
//! Liveness checks, model-readiness checks and similar waits all share one
//! loop: probe at a fixed interval until the probe reports ready, the deadline
//! passes or the caller cancels. A timeout is an outcome, not an error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Cooperative cancellation token; clones share one flag.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<watch::Sender<bool>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    /// Resolves once `cancel` has been called on any clone
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // the sender lives as long as `self`, so this only returns on cancel
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// What a single probe observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    /// Condition met
    Ready(T),
    /// Not yet; carries a human-readable description of the current state
    Pending(String),
}

/// Result of a bounded wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut {
        waited: Duration,
        /// Last pending or error state observed before the deadline
        last: Option<String>,
    },
    Cancelled,
}

impl<T> PollOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready(_))
    }
}

/// Progress notification passed to the caller on every attempt
#[derive(Debug, Clone)]
pub struct PollProgress<'a> {
    pub attempt: u32,
    pub elapsed: Duration,
    pub state: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub deadline: Duration,
}

/// Probe until ready, timed out or cancelled.
///
/// Probe errors are treated like a pending state: the endpoint being polled
/// is expected to be down while the thing behind it starts.
pub async fn poll_until<T, F, Fut, P>(
    settings: PollSettings,
    cancel: &CancellationToken,
    mut probe: F,
    mut on_progress: P,
) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<Probe<T>>>,
    P: FnMut(PollProgress<'_>),
{
    let start = Instant::now();
    let mut attempt = 0u32;
    let mut last = None;

    loop {
        if cancel.is_cancelled() {
            return PollOutcome::Cancelled;
        }

        let remaining = settings.deadline.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return PollOutcome::TimedOut {
                waited: start.elapsed(),
                last,
            };
        }

        attempt += 1;
        let answer = tokio::select! {
            answer = tokio::time::timeout(remaining, probe()) => answer,
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
        };
        let state = match answer {
            Ok(Ok(Probe::Ready(value))) => return PollOutcome::Ready(value),
            Ok(Ok(Probe::Pending(state))) => state,
            Ok(Err(err)) => format!("{:#}", err),
            Err(_) => "probe did not answer before the deadline".to_string(),
        };

        on_progress(PollProgress {
            attempt,
            elapsed: start.elapsed(),
            state: &state,
        });
        last = Some(state);

        let remaining = settings.deadline.saturating_sub(start.elapsed());
        tokio::select! {
            _ = tokio::time::sleep(settings.interval.min(remaining)) => {}
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
        }
    }
}
