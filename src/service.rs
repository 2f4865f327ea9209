//! Runtime wiring for one interview session.
//!
//! Every handler takes the core lock for its whole duration, so lifecycle
//! transitions, backup writes and clock expiries run to completion one at a
//! time. Clock expiries arrive over a channel and go through the same
//! submission path as a manual answer.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::error::{LifecycleError, ScoringError, StorageError};
use crate::models::{
    CandidateFields, CandidateStatus, InterviewSummary, Question, SortBy, SortOrder, ViewState,
};
use crate::persistence::{
    decode_candidate, decode_primary, reconcile, AnswerDraft, BackupWriter, DecodeFailure,
    DraftAutosave, Namespace, ReconcileReport, Repository,
};
use crate::scheduler::{FlushFn, FlushFuture, FlushReason, FlushScheduler};
use crate::scoring::{fallback_scored, AnswerInput, AnswerScorer, Scored, FALLBACK_MESSAGE};
use crate::settings::PersistenceSettings;
use crate::store::{AnswerEvent, CandidateStore, Progress};
use crate::timer::{ClockEvent, ClockSnapshot, QuestionClock};
use crate::{log_error, log_info, log_warn};

const ENABLE_LOGS: bool = true;

struct Core {
    store: CandidateStore,
    writer: BackupWriter,
    drafts: DraftAutosave,
}

impl Core {
    fn flush(&mut self, now: DateTime<Utc>) -> bool {
        self.writer.flush(&self.store, now)
    }
}

struct Inner {
    core: Arc<Mutex<Core>>,
    repo: Repository,
    clock: QuestionClock,
    scheduler: FlushScheduler,
    scorer: Arc<dyn AnswerScorer>,
    clock_events: Mutex<Option<mpsc::UnboundedReceiver<ClockEvent>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct InterviewService {
    inner: Arc<Inner>,
}

/// What boot recovered from durable storage.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootReport {
    pub primary_candidates: usize,
    pub primary_skipped: usize,
    /// Set when the primary snapshot was unreadable and boot started empty.
    pub primary_error: Option<String>,
    /// Interviews that were running when the process stopped; now paused.
    pub interrupted: Vec<String>,
    pub reconcile: ReconcileReport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOutcome {
    pub question_id: String,
    pub score: u32,
    pub feedback: String,
    /// Shown to the candidate when the fallback score was applied.
    pub notice: Option<&'static str>,
    pub progress: Progress,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDigest {
    pub id: String,
    pub name: String,
    pub status: CandidateStatus,
    pub current_question_index: usize,
    pub answered: usize,
    pub questions: usize,
    pub total_score: u32,
    pub max_score: u32,
    pub restored: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugReport {
    pub generated_at: DateTime<Utc>,
    pub candidates: Vec<CandidateDigest>,
    pub active_candidate_id: Option<String>,
    pub view: ViewState,
    pub tombstones: Vec<String>,
    pub keys: BTreeMap<&'static str, Vec<String>>,
    pub unknown_keys: Vec<String>,
    pub undecodable: Vec<DecodeFailure>,
    pub pending_writes: bool,
    pub clock: ClockSnapshot,
}

impl InterviewService {
    /// Loads the primary snapshot, pauses interviews that were cut off
    /// mid-question, and reconciles backups into the result. Nothing is
    /// written until [`InterviewService::start`] or a flush.
    pub fn boot(
        repo: Repository,
        settings: &PersistenceSettings,
        scorer: Arc<dyn AnswerScorer>,
    ) -> (Self, BootReport) {
        let now = Utc::now();
        let mut report = BootReport::default();

        let mut store = match repo.read_primary() {
            Ok(Some(bytes)) => match decode_primary(&bytes) {
                Ok(decoded) => {
                    report.primary_candidates = decoded.store.len();
                    report.primary_skipped = decoded.skipped;
                    decoded.store
                }
                Err(err) => {
                    log_warn!("primary snapshot unreadable, starting from an empty store: {err}");
                    report.primary_error = Some(err.to_string());
                    CandidateStore::new()
                }
            },
            Ok(None) => CandidateStore::new(),
            Err(err) => {
                log_warn!("could not read primary snapshot: {err}");
                report.primary_error = Some(err.to_string());
                CandidateStore::new()
            }
        };

        report.reconcile = reconcile(&mut store, &repo, now);

        let running: Vec<String> = store
            .candidates()
            .iter()
            .filter(|c| c.status == CandidateStatus::Interview)
            .map(|c| c.id.clone())
            .collect();
        report.interrupted = pause_interrupted(&mut store, running, now);

        let mut writer = BackupWriter::new(repo.clone(), settings.primary_throttle());
        if report.reconcile.changed() || !report.interrupted.is_empty() {
            writer.mark_dirty(None);
        }

        let core = Arc::new(Mutex::new(Core {
            store,
            writer,
            drafts: DraftAutosave::new(repo.clone(), settings.draft_debounce()),
        }));

        let flush_core = core.clone();
        let flush: FlushFn = Arc::new(move || -> FlushFuture {
            let core = flush_core.clone();
            Box::pin(async move {
                let flushed = core.lock().await.flush(Utc::now());
                flushed
            })
        });
        let scheduler = FlushScheduler::new(
            flush,
            settings.flush_delay(),
            settings.autosave_interval(),
        );
        let (clock, clock_events) = QuestionClock::new(settings.clock_tick());

        log_info!(
            "booted with {} candidates ({} restored from backups)",
            report.primary_candidates + report.reconcile.inserted.len(),
            report.reconcile.inserted.len()
        );

        let service = Self {
            inner: Arc::new(Inner {
                core,
                repo,
                clock,
                scheduler,
                scorer,
                clock_events: Mutex::new(Some(clock_events)),
                pump: Mutex::new(None),
            }),
        };
        (service, report)
    }

    /// Starts draining clock expiries and the interval flush. Must run inside
    /// a tokio runtime.
    pub async fn start(&self) {
        if let Some(mut events) = self.inner.clock_events.lock().await.take() {
            let weak: Weak<Inner> = Arc::downgrade(&self.inner);
            let handle = tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    let Some(inner) = weak.upgrade() else { break };
                    InterviewService { inner }.handle_clock_event(event).await;
                }
            });
            *self.inner.pump.lock().await = Some(handle);
        }

        let (active, dirty) = {
            let core = self.inner.core.lock().await;
            (core.store.has_in_progress(), core.writer.is_dirty())
        };
        if dirty {
            self.inner.scheduler.request_flush(FlushReason::Restored);
        }
        self.sync_interval(active).await;
    }

    /// Stops every background task and writes a final snapshot.
    pub async fn shutdown(&self) -> bool {
        self.inner.scheduler.stop().await;
        self.inner.clock.cancel().await;
        if let Some(handle) = self.inner.pump.lock().await.take() {
            handle.abort();
        }
        self.flush_now().await
    }

    pub async fn store_snapshot(&self) -> CandidateStore {
        self.inner.core.lock().await.store.clone()
    }

    pub async fn clock(&self) -> ClockSnapshot {
        self.inner.clock.snapshot().await
    }

    pub async fn create_candidate(&self, fields: CandidateFields) -> Option<String> {
        let mut core = self.inner.core.lock().await;
        let id = core.store.create_candidate(fields, Utc::now())?;
        core.writer.mark_dirty(Some(&id));
        self.inner.scheduler.request_flush(FlushReason::CandidateCreated);
        Some(id)
    }

    pub async fn update_candidate_info(
        &self,
        id: &str,
        fields: CandidateFields,
    ) -> Result<(), LifecycleError> {
        let mut core = self.inner.core.lock().await;
        core.store.update_candidate_info(id, fields, Utc::now())?;
        core.writer.mark_dirty(Some(id));
        Ok(())
    }

    /// Assigns questions and arms the clock on the first one.
    pub async fn start_interview(&self, id: &str, questions: Vec<Question>) -> Result<(), LifecycleError> {
        {
            let mut core = self.inner.core.lock().await;
            core.store.start_interview(id, questions, Utc::now())?;
            core.writer.mark_dirty(Some(id));
            self.arm_current(&core.store, id).await;
        }
        self.sync_interval(true).await;
        Ok(())
    }

    /// Scores the answer with the configured scorer, falling back to the
    /// difficulty default when it fails, then submits and advances.
    pub async fn answer_current_question(
        &self,
        id: &str,
        input: AnswerInput,
    ) -> Result<AnswerOutcome, LifecycleError> {
        let question = {
            let core = self.inner.core.lock().await;
            core.store
                .get(id)
                .ok_or_else(|| LifecycleError::NotFound(id.to_string()))?
                .current_question()
                .cloned()
                .ok_or_else(|| LifecycleError::Malformed(format!("candidate {id} has no current question")))?
        };
        let scored = self.inner.scorer.score(&question, &input);
        self.submit_scored(id, &question.id, input, scored).await
    }

    /// Submits an answer scored elsewhere. A scoring failure is replaced by
    /// the fallback score and reported through [`AnswerOutcome::notice`].
    pub async fn submit_scored(
        &self,
        id: &str,
        question_id: &str,
        input: AnswerInput,
        scored: Result<Scored, ScoringError>,
    ) -> Result<AnswerOutcome, LifecycleError> {
        let now = Utc::now();
        let (outcome, active) = {
            let mut core = self.inner.core.lock().await;
            let candidate = core
                .store
                .get(id)
                .ok_or_else(|| LifecycleError::NotFound(id.to_string()))?;
            if candidate.status != CandidateStatus::Interview {
                return Err(LifecycleError::InvalidTransition {
                    id: id.to_string(),
                    from: candidate.status,
                    action: "answer",
                });
            }
            let question = candidate
                .current_question()
                .filter(|q| q.id == question_id)
                .cloned()
                .ok_or_else(|| LifecycleError::Malformed(format!("question {question_id} is no longer current")))?;

            let (scored, notice) = match scored {
                Ok(scored) => (Scored::capped(&question, scored.score, scored.feedback), None),
                Err(err) => {
                    log_warn!("scoring failed for {id}/{question_id}: {err}");
                    (fallback_scored(&question), Some(FALLBACK_MESSAGE))
                }
            };

            let event = AnswerEvent::manual(
                question_id,
                input.text,
                input.selected_option,
                scored.score,
                scored.feedback.clone(),
            );
            let progress = self.submit_and_advance(&mut core, id, event, now).await?;
            let outcome = AnswerOutcome {
                question_id: question_id.to_string(),
                score: scored.score,
                feedback: scored.feedback,
                notice,
                progress,
            };
            (outcome, core.store.has_in_progress())
        };
        self.sync_interval(active).await;
        Ok(outcome)
    }

    async fn handle_clock_event(&self, event: ClockEvent) {
        let ClockEvent::Expired {
            candidate_id,
            question_id,
            generation,
        } = event;
        let now = Utc::now();

        let active = {
            let mut core = self.inner.core.lock().await;
            if !self.inner.clock.is_current(generation).await {
                log_warn!("ignoring stale expiry for {candidate_id}/{question_id} (gen {generation})");
                return;
            }
            let still_current = core.store.get(&candidate_id).is_some_and(|c| {
                c.status == CandidateStatus::Interview
                    && c.current_question()
                        .is_some_and(|q| q.id == question_id && !q.is_answered())
            });
            if !still_current {
                log_warn!("expiry for {candidate_id}/{question_id} no longer applies");
                return;
            }

            log_info!("time expired on {candidate_id}/{question_id}");
            if let Err(err) = self
                .submit_and_advance(&mut core, &candidate_id, AnswerEvent::expired(&question_id), now)
                .await
            {
                log_error!("expiry submission for {candidate_id} rejected: {err}");
            }
            core.store.has_in_progress()
        };
        self.sync_interval(active).await;
    }

    /// Shared tail of manual and expired submissions: record, back up,
    /// then advance or complete. The score is in the store before
    /// `next_question` runs.
    async fn submit_and_advance(
        &self,
        core: &mut Core,
        id: &str,
        event: AnswerEvent,
        now: DateTime<Utc>,
    ) -> Result<Progress, LifecycleError> {
        let Core {
            store,
            writer,
            drafts,
        } = &mut *core;
        store.submit_answer(id, event, now)?;
        drafts.clear_for(id);
        writer.on_answer_submitted(store, id, now);
        self.inner.scheduler.request_flush(FlushReason::AnswerSubmitted);

        let progress = store.next_question(id, now)?;
        match progress {
            Progress::Advanced(_) => self.arm_current(store, id).await,
            Progress::Completed => self.finish(core, id, None, now).await?,
        }
        Ok(progress)
    }

    async fn finish(
        &self,
        core: &mut Core,
        id: &str,
        summary: Option<InterviewSummary>,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        let candidate = core
            .store
            .get(id)
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))?;
        let summary = summary.unwrap_or_else(|| {
            InterviewSummary::fallback(&candidate.name, candidate.total_score, candidate.max_score, now)
        });
        core.store.complete_interview(id, summary, now)?;

        if self.inner.clock.belongs_to(id).await {
            self.inner.clock.cancel().await;
        }
        core.writer.on_interview_completed(&core.store, id, now);
        self.inner.scheduler.request_flush(FlushReason::InterviewCompleted);
        log_info!("interview {id} completed");
        Ok(())
    }

    /// Completes explicitly. Without a summary the score-based fallback is attached.
    pub async fn complete_interview(
        &self,
        id: &str,
        summary: Option<InterviewSummary>,
    ) -> Result<(), LifecycleError> {
        let active = {
            let mut core = self.inner.core.lock().await;
            self.finish(&mut core, id, summary, Utc::now()).await?;
            core.store.has_in_progress()
        };
        self.sync_interval(active).await;
        Ok(())
    }

    pub async fn pause_interview(&self, id: &str) -> Result<(), LifecycleError> {
        let mut core = self.inner.core.lock().await;
        core.store.pause_interview(id, Utc::now())?;
        if self.inner.clock.belongs_to(id).await {
            self.inner.clock.pause().await;
        }
        core.writer.mark_dirty(Some(id));
        Ok(())
    }

    /// Resumes the paused countdown, or re-arms the current question when the
    /// clock was lost (after a restart).
    pub async fn resume_interview(&self, id: &str) -> Result<(), LifecycleError> {
        {
            let mut core = self.inner.core.lock().await;
            core.store.resume_interview(id, Utc::now())?;
            if self.inner.clock.is_paused_for(id).await {
                self.inner.clock.resume().await;
            } else {
                self.arm_current(&core.store, id).await;
            }
            core.writer.mark_dirty(Some(id));
        }
        self.sync_interval(true).await;
        Ok(())
    }

    /// Removes the candidate and purges its durable copies before returning.
    /// Returns whether an in-memory record existed.
    pub async fn delete_candidate(&self, id: &str) -> bool {
        let now = Utc::now();
        let (existed, active) = {
            let mut core = self.inner.core.lock().await;
            if self.inner.clock.belongs_to(id).await {
                self.inner.clock.cancel().await;
            }
            let existed = core.store.delete_candidate(id).is_some();
            let Core {
                store,
                writer,
                drafts,
            } = &mut *core;
            if !writer.on_candidate_deleted(store, id, now) {
                log_warn!("durable purge of {id} incomplete; tombstone still blocks restore");
            }
            drafts.clear_for(id);
            self.inner.scheduler.request_flush(FlushReason::CandidateDeleted);
            (existed, store.has_in_progress())
        };
        self.sync_interval(active).await;
        existed
    }

    pub async fn add_chat_message(
        &self,
        id: &str,
        kind: &str,
        text: &str,
        sender: &str,
    ) -> Result<String, LifecycleError> {
        let mut core = self.inner.core.lock().await;
        let message_id = core.store.add_chat_message(id, kind, text, sender, Utc::now())?;
        core.writer.mark_dirty(Some(id));
        Ok(message_id)
    }

    pub async fn set_active_candidate(&self, id: Option<&str>) -> bool {
        let mut core = self.inner.core.lock().await;
        let changed = match id {
            Some(id) => core.store.set_active_candidate(id),
            None => {
                core.store.clear_active_candidate();
                true
            }
        };
        if changed {
            core.writer.mark_dirty(None);
        }
        changed
    }

    pub async fn select_candidate(&self, id: Option<&str>) -> bool {
        let mut core = self.inner.core.lock().await;
        let changed = core.store.set_selected_candidate(id);
        if changed {
            core.writer.mark_dirty(None);
        }
        changed
    }

    pub async fn set_view(&self, search_term: Option<String>, sort: Option<(SortBy, SortOrder)>) {
        let mut core = self.inner.core.lock().await;
        if let Some(term) = search_term {
            core.store.set_search_term(term);
        }
        if let Some((sort_by, sort_order)) = sort {
            core.store.set_sort(sort_by, sort_order);
        }
        core.writer.mark_dirty(None);
    }

    pub async fn record_draft_text(&self, id: &str, question_index: usize, text: &str) {
        self.inner
            .core
            .lock()
            .await
            .drafts
            .record_text(id, question_index, text, Utc::now());
    }

    pub async fn record_draft_selection(&self, id: &str, question_index: usize, option: usize) -> bool {
        self.inner
            .core
            .lock()
            .await
            .drafts
            .record_selection(id, question_index, option, Utc::now())
    }

    pub async fn restore_draft(&self, id: &str, question_index: usize) -> Option<AnswerDraft> {
        self.inner.core.lock().await.drafts.restore(id, question_index)
    }

    /// Runs another reconciliation pass against current storage. Restored
    /// records left mid-question are paused unless the clock is running for
    /// them.
    pub async fn reconcile_now(&self) -> ReconcileReport {
        let (report, active) = {
            let mut core = self.inner.core.lock().await;
            let now = Utc::now();
            let mut report = reconcile(&mut core.store, &self.inner.repo, now);

            let mut running = Vec::new();
            for id in report.inserted.iter().chain(&report.replaced) {
                let interviewing = core
                    .store
                    .get(id)
                    .is_some_and(|c| c.status == CandidateStatus::Interview);
                if interviewing && !self.inner.clock.belongs_to(id).await {
                    running.push(id.clone());
                }
            }
            report.paused = pause_interrupted(&mut core.store, running, now);

            if report.changed() || !report.paused.is_empty() {
                core.writer.mark_dirty(None);
                self.inner.scheduler.request_flush(FlushReason::Restored);
            }
            (report, core.store.has_in_progress())
        };
        self.sync_interval(active).await;
        report
    }

    /// Writes everything now, bypassing throttle and delay. `false` means at
    /// least one write was rejected; the in-memory store is unaffected.
    pub async fn flush_now(&self) -> bool {
        self.inner.scheduler.flush_now().await
    }

    /// Read-only report of the store and every durable key.
    pub async fn debug_dump(&self) -> Result<DebugReport, StorageError> {
        let core = self.inner.core.lock().await;
        let store = &core.store;
        let repo = &self.inner.repo;

        let (known, unknown_keys) = repo.partition_keys()?;
        let mut keys: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
        for (namespace, key) in known {
            keys.entry(namespace.as_str()).or_default().push(key);
        }

        let mut undecodable = Vec::new();
        for namespace in [Namespace::Backup, Namespace::Emergency] {
            for entry in repo.list_by_namespace(namespace)? {
                if let Err(err) = decode_candidate(&entry.bytes) {
                    undecodable.push(DecodeFailure {
                        key: entry.key,
                        reason: err.to_string(),
                    });
                }
            }
        }

        let candidates = store
            .candidates()
            .iter()
            .map(|c| CandidateDigest {
                id: c.id.clone(),
                name: c.name.clone(),
                status: c.status,
                current_question_index: c.current_question_index,
                answered: c.answered_count(),
                questions: c.questions.len(),
                total_score: c.total_score,
                max_score: c.max_score,
                restored: c.restored_at.is_some(),
            })
            .collect();

        Ok(DebugReport {
            generated_at: Utc::now(),
            candidates,
            active_candidate_id: store.active_candidate_id().map(str::to_string),
            view: store.view().clone(),
            tombstones: store.tombstones().iter().cloned().collect(),
            keys,
            unknown_keys,
            undecodable,
            pending_writes: core.writer.is_dirty(),
            clock: self.inner.clock.snapshot().await,
        })
    }

    async fn arm_current(&self, store: &CandidateStore, id: &str) {
        if let Some(question) = store.get(id).and_then(|c| c.current_question()) {
            self.inner.clock.start(id, &question.id, question.time).await;
        }
    }

    async fn sync_interval(&self, active: bool) {
        self.inner.scheduler.set_interval_active(active).await;
    }
}

/// Pauses each listed interview, returning the ids that actually paused.
fn pause_interrupted(store: &mut CandidateStore, ids: Vec<String>, now: DateTime<Utc>) -> Vec<String> {
    let mut paused = Vec::new();
    for id in ids {
        if store.pause_interview(&id, now).is_ok() {
            log_warn!("recovered interrupted interview {id}; marking as paused");
            paused.push(id);
        }
    }
    paused
}
