use std::{sync::Arc, time::Duration};

use log::{debug, warn};
use serde::Serialize;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use super::{CountdownState, CountdownStatus};

/// Emitted by the ticker when an armed countdown runs out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockEvent {
    Expired {
        candidate_id: String,
        question_id: String,
        generation: u64,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockSnapshot {
    pub state: CountdownState,
    pub remaining_ms: u64,
}

/// Countdown for the active question.
///
/// Expiry is not acted on here: the ticker only sends a generation-tagged
/// [`ClockEvent`] and whoever drains the channel decides whether it is still
/// current.
#[derive(Clone)]
pub struct QuestionClock {
    state: Arc<Mutex<CountdownState>>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    tick_interval: Duration,
    events: mpsc::UnboundedSender<ClockEvent>,
}

impl QuestionClock {
    pub fn new(tick_interval: Duration) -> (Self, mpsc::UnboundedReceiver<ClockEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let clock = Self {
            state: Arc::new(Mutex::new(CountdownState::new())),
            ticker: Arc::new(Mutex::new(None)),
            tick_interval,
            events,
        };
        (clock, rx)
    }

    pub async fn snapshot(&self) -> ClockSnapshot {
        let mut guard = self.state.lock().await;
        guard.sync_active_from_anchor();
        ClockSnapshot {
            remaining_ms: guard.remaining_ms(),
            state: guard.clone(),
        }
    }

    /// Arms a fresh countdown, replacing whatever was running.
    pub async fn start(&self, candidate_id: &str, question_id: &str, time_secs: u32) -> u64 {
        let generation = {
            let mut state = self.state.lock().await;
            state.begin(
                candidate_id.to_string(),
                question_id.to_string(),
                u64::from(time_secs) * 1000,
                Instant::now(),
            )
        };
        debug!("clock armed for {candidate_id}/{question_id} ({time_secs}s, gen {generation})");
        self.spawn_ticker(generation).await;
        generation
    }

    pub async fn pause(&self) -> bool {
        let paused = self.state.lock().await.pause();
        if paused {
            self.cancel_ticker().await;
        }
        paused
    }

    pub async fn resume(&self) -> Option<u64> {
        let generation = self.state.lock().await.resume(Instant::now())?;
        self.spawn_ticker(generation).await;
        Some(generation)
    }

    pub async fn cancel(&self) {
        self.state.lock().await.cancel();
        self.cancel_ticker().await;
    }

    pub async fn belongs_to(&self, candidate_id: &str) -> bool {
        self.state.lock().await.belongs_to(candidate_id)
    }

    pub async fn is_paused_for(&self, candidate_id: &str) -> bool {
        let state = self.state.lock().await;
        state.status == CountdownStatus::Paused && state.belongs_to(candidate_id)
    }

    /// True when `generation` is still the live countdown.
    pub async fn is_current(&self, generation: u64) -> bool {
        self.state.lock().await.generation == generation
    }

    async fn spawn_ticker(&self, generation: u64) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let state = self.state.clone();
        let events = self.events.clone();
        let tick_interval = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;

                let event = {
                    let mut guard = state.lock().await;
                    if guard.status != CountdownStatus::Running || guard.generation != generation {
                        break;
                    }
                    guard.sync_active_from_anchor();
                    if guard.remaining_ms() > 0 {
                        continue;
                    }
                    guard.expire();
                    match (guard.candidate_id.clone(), guard.question_id.clone()) {
                        (Some(candidate_id), Some(question_id)) => ClockEvent::Expired {
                            candidate_id,
                            question_id,
                            generation,
                        },
                        _ => break,
                    }
                };

                if events.send(event).is_err() {
                    warn!("clock expired but nobody is listening");
                }
                break;
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }
}
