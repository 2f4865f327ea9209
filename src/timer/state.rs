use serde::Serialize;
use std::cmp;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum CountdownStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Expired,
}

/// Countdown for the question currently on screen.
///
/// `generation` identifies one armed countdown. Every re-arm, pause or
/// cancel bumps it, so an expiry tagged with an older generation is stale.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CountdownState {
    pub status: CountdownStatus,
    pub candidate_id: Option<String>,
    pub question_id: Option<String>,
    pub generation: u64,
    pub target_ms: u64,
    pub active_ms: u64,
    /// Time accumulated from earlier running windows; combines with `running_anchor`
    /// to compute the true active duration.
    #[serde(skip)]
    pub active_ms_baseline: u64,
    #[serde(skip)]
    pub running_anchor: Option<Instant>,
}

impl CountdownState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remaining_ms(&self) -> u64 {
        match self.status {
            CountdownStatus::Idle | CountdownStatus::Expired => 0,
            CountdownStatus::Running | CountdownStatus::Paused => {
                cmp::max(self.target_ms as i64 - self.current_active_ms() as i64, 0) as u64
            }
        }
    }

    pub fn current_active_ms(&self) -> u64 {
        if let (CountdownStatus::Running, Some(anchor)) = (self.status, self.running_anchor) {
            self.active_ms_baseline
                .saturating_add(anchor.elapsed().as_millis() as u64)
        } else {
            self.active_ms
        }
    }

    pub fn sync_active_from_anchor(&mut self) {
        if let (CountdownStatus::Running, Some(anchor)) = (self.status, self.running_anchor) {
            self.active_ms = self
                .active_ms_baseline
                .saturating_add(anchor.elapsed().as_millis() as u64);
        }
    }

    pub fn belongs_to(&self, candidate_id: &str) -> bool {
        self.candidate_id.as_deref() == Some(candidate_id)
    }

    pub fn begin(
        &mut self,
        candidate_id: String,
        question_id: String,
        target_ms: u64,
        now: Instant,
    ) -> u64 {
        let generation = self.generation.wrapping_add(1);
        *self = Self {
            status: CountdownStatus::Running,
            candidate_id: Some(candidate_id),
            question_id: Some(question_id),
            generation,
            target_ms,
            active_ms: 0,
            active_ms_baseline: 0,
            running_anchor: Some(now),
        };
        generation
    }

    pub fn pause(&mut self) -> bool {
        if self.status != CountdownStatus::Running {
            return false;
        }
        self.sync_active_from_anchor();
        self.status = CountdownStatus::Paused;
        self.running_anchor = None;
        self.active_ms_baseline = self.active_ms;
        self.generation = self.generation.wrapping_add(1);
        true
    }

    /// Re-anchors a paused countdown. Returns the new generation.
    pub fn resume(&mut self, now: Instant) -> Option<u64> {
        if self.status != CountdownStatus::Paused {
            return None;
        }
        self.status = CountdownStatus::Running;
        self.running_anchor = Some(now);
        self.generation = self.generation.wrapping_add(1);
        Some(self.generation)
    }

    pub fn expire(&mut self) {
        self.sync_active_from_anchor();
        self.active_ms = self.active_ms.min(self.target_ms);
        self.active_ms_baseline = self.active_ms;
        self.running_anchor = None;
        self.status = CountdownStatus::Expired;
    }

    /// Back to idle. The generation keeps counting so older expiries stay stale.
    pub fn cancel(&mut self) {
        let generation = self.generation.wrapping_add(1);
        *self = Self {
            generation,
            ..Self::default()
        };
    }
}
