use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use log::{debug, warn};
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use super::loop_worker::flush_loop;

pub type FlushFuture = Pin<Box<dyn Future<Output = bool> + Send>>;

/// The flush operation itself: idempotent, no arguments, `true` on success.
pub type FlushFn = Arc<dyn Fn() -> FlushFuture + Send + Sync>;

/// Why a delayed flush was requested. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    CandidateCreated,
    AnswerSubmitted,
    InterviewCompleted,
    CandidateDeleted,
    Restored,
}

impl FlushReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushReason::CandidateCreated => "candidate created",
            FlushReason::AnswerSubmitted => "answer submitted",
            FlushReason::InterviewCompleted => "interview completed",
            FlushReason::CandidateDeleted => "candidate deleted",
            FlushReason::Restored => "candidates restored",
        }
    }
}

struct IntervalLoop {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

/// Handed to every component that needs to persist: delayed flushes after
/// lifecycle events, the fixed-interval loop, and direct `flush_now` calls
/// all go through the same [`FlushFn`].
#[derive(Clone)]
pub struct FlushScheduler {
    flush: FlushFn,
    delay: Duration,
    period: Duration,
    delayed_pending: Arc<AtomicBool>,
    interval: Arc<Mutex<Option<IntervalLoop>>>,
}

impl FlushScheduler {
    pub fn new(flush: FlushFn, delay: Duration, period: Duration) -> Self {
        Self {
            flush,
            delay,
            period,
            delayed_pending: Arc::new(AtomicBool::new(false)),
            interval: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn flush_now(&self) -> bool {
        (self.flush)().await
    }

    /// Flushes after the settle delay. Requests arriving while one is already
    /// pending are folded into it.
    pub fn request_flush(&self, reason: FlushReason) {
        if self.delayed_pending.swap(true, Ordering::SeqCst) {
            debug!("flush for {} folded into pending flush", reason.as_str());
            return;
        }

        let flush = self.flush.clone();
        let pending = self.delayed_pending.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            pending.store(false, Ordering::SeqCst);
            if !flush().await {
                warn!("flush after {} failed", reason.as_str());
            }
        });
    }

    /// Starts or stops the interval loop so it runs exactly while `active`.
    pub async fn set_interval_active(&self, active: bool) {
        let mut guard = self.interval.lock().await;
        match (active, guard.is_some()) {
            (true, false) => {
                let cancel_token = CancellationToken::new();
                let handle = tokio::spawn(flush_loop(
                    self.flush.clone(),
                    self.period,
                    cancel_token.clone(),
                ));
                *guard = Some(IntervalLoop {
                    handle,
                    cancel_token,
                });
                debug!("interval flush started ({:?})", self.period);
            }
            (false, true) => {
                if let Some(running) = guard.take() {
                    running.cancel_token.cancel();
                    if let Err(err) = running.handle.await {
                        warn!("flush loop task failed to join: {err}");
                    }
                }
            }
            _ => {}
        }
    }

    pub async fn interval_active(&self) -> bool {
        self.interval.lock().await.is_some()
    }

    pub async fn stop(&self) {
        self.set_interval_active(false).await;
    }
}
