use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use intervault::models::{Difficulty, ViewState};
use intervault::persistence::{decode_primary, encode_candidate, Namespace};
use intervault::scoring::{AnswerScorer, Scored, FALLBACK_MESSAGE};
use intervault::settings::PersistenceSettings;
use intervault::store::AnswerEvent;
use intervault::timer::CountdownStatus;
use intervault::{
    AnswerInput, BootReport, Candidate, CandidateFields, CandidateStatus, CandidateStore,
    ChoiceScorer, InterviewService, MemoryStore, Progress, Question, Repository, ScoringError,
};

struct OfflineScorer;

impl AnswerScorer for OfflineScorer {
    fn score(&self, _question: &Question, _answer: &AnswerInput) -> Result<Scored, ScoringError> {
        Err(ScoringError::Unavailable("scoring service offline".into()))
    }
}

fn boot_on(kv: &Arc<MemoryStore>) -> (InterviewService, BootReport) {
    InterviewService::boot(
        Repository::new(kv.clone()),
        &PersistenceSettings::default(),
        Arc::new(ChoiceScorer),
    )
}

fn ada() -> CandidateFields {
    CandidateFields::new("Ada Lovelace", "ada@example.com", "+44 20 7946 0000")
}

fn two_questions() -> Vec<Question> {
    vec![
        Question::multiple_choice(
            "q1",
            "Which keyword moves a value into a closure?",
            Difficulty::Easy,
            vec!["ref".into(), "move".into(), "box".into(), "dyn".into()],
            1,
        ),
        Question::new("q2", "Explain interior mutability.", Difficulty::Medium),
    ]
}

async fn started(kv: &Arc<MemoryStore>) -> (InterviewService, String) {
    let (service, _) = boot_on(kv);
    service.start().await;
    let id = service.create_candidate(ada()).await.unwrap();
    service.start_interview(&id, two_questions()).await.unwrap();
    (service, id)
}

fn primary_chat_len(kv: &Arc<MemoryStore>, id: &str) -> usize {
    let bytes = Repository::new(kv.clone()).read_primary().unwrap().unwrap();
    let decoded = decode_primary(&bytes).unwrap();
    decoded.store.get(id).unwrap().chat_history.len()
}

#[tokio::test(start_paused = true)]
async fn expired_question_advances_with_zero_score() {
    let kv = Arc::new(MemoryStore::new());
    let (service, id) = started(&kv).await;

    tokio::time::sleep(Duration::from_secs(21)).await;

    let store = service.store_snapshot().await;
    let candidate = store.get(&id).unwrap();
    assert_eq!(candidate.current_question_index, 1);
    assert_eq!(candidate.questions[0].score, Some(0));
    assert_eq!(candidate.questions[0].answer.as_deref(), Some(""));
    assert_eq!(candidate.status, CandidateStatus::Interview);

    let clock = service.clock().await;
    assert_eq!(clock.state.question_id.as_deref(), Some("q2"));
    assert_eq!(clock.state.status, CountdownStatus::Running);
}

#[tokio::test(start_paused = true)]
async fn paused_interview_ignores_the_old_countdown() {
    let kv = Arc::new(MemoryStore::new());
    let (service, id) = started(&kv).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    service.pause_interview(&id).await.unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;

    let store = service.store_snapshot().await;
    let candidate = store.get(&id).unwrap();
    assert_eq!(candidate.status, CandidateStatus::Paused);
    assert_eq!(candidate.current_question_index, 0);
    assert_eq!(candidate.questions[0].score, None);

    service.resume_interview(&id).await.unwrap();
    tokio::time::sleep(Duration::from_secs(11)).await;
    let store = service.store_snapshot().await;
    assert_eq!(store.get(&id).unwrap().current_question_index, 1);
}

#[tokio::test(start_paused = true)]
async fn final_expiry_completes_with_fallback_summary() {
    let kv = Arc::new(MemoryStore::new());
    let (service, id) = started(&kv).await;

    let outcome = service
        .answer_current_question(&id, AnswerInput::choice(1))
        .await
        .unwrap();
    assert_eq!(outcome.score, 10);
    assert_eq!(outcome.progress, Progress::Advanced(1));

    tokio::time::sleep(Duration::from_secs(61)).await;

    let store = service.store_snapshot().await;
    let candidate = store.get(&id).unwrap();
    assert_eq!(candidate.status, CandidateStatus::Completed);
    assert_eq!(candidate.total_score, 10);
    assert_eq!(candidate.max_score, 30);
    assert!(candidate.summary.is_some());

    let emergency = Repository::new(kv.clone())
        .list_by_namespace(Namespace::Emergency)
        .unwrap();
    assert_eq!(emergency.len(), 1);
    assert_eq!(emergency[0].owner_id.as_deref(), Some(id.as_str()));
}

#[tokio::test(start_paused = true)]
async fn scorer_failure_applies_difficulty_default() {
    let kv = Arc::new(MemoryStore::new());
    let (service, _) = InterviewService::boot(
        Repository::new(kv.clone()),
        &PersistenceSettings::default(),
        Arc::new(OfflineScorer),
    );
    service.start().await;
    let id = service.create_candidate(ada()).await.unwrap();
    service
        .start_interview(&id, vec![Question::new("q1", "Explain lifetimes.", Difficulty::Medium)])
        .await
        .unwrap();

    let outcome = service
        .answer_current_question(&id, AnswerInput::text("they bound borrows"))
        .await
        .unwrap();
    assert_eq!(outcome.score, 10);
    assert_eq!(outcome.notice, Some(FALLBACK_MESSAGE));
    assert_eq!(outcome.progress, Progress::Completed);

    let store = service.store_snapshot().await;
    assert_eq!(store.get(&id).unwrap().status, CandidateStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn interval_flush_persists_unflagged_changes() {
    let kv = Arc::new(MemoryStore::new());
    let (service, id) = started(&kv).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    service
        .add_chat_message(&id, "system", "interview started", "bot")
        .await
        .unwrap();
    assert_eq!(primary_chat_len(&kv, &id), 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(primary_chat_len(&kv, &id), 1);
}

#[tokio::test(start_paused = true)]
async fn deleted_candidate_stays_deleted_after_restart() {
    let kv = Arc::new(MemoryStore::new());
    let (service, id) = started(&kv).await;
    service
        .answer_current_question(&id, AnswerInput::choice(1))
        .await
        .unwrap();
    service.complete_interview(&id, None).await.unwrap();

    let repo = Repository::new(kv.clone());
    assert!(!repo.list_by_namespace(Namespace::Backup).unwrap().is_empty());

    assert!(service.delete_candidate(&id).await);
    assert!(service.shutdown().await);
    assert!(repo.list_by_namespace(Namespace::Backup).unwrap().is_empty());
    assert!(repo.list_by_namespace(Namespace::Emergency).unwrap().is_empty());

    let (rebooted, report) = boot_on(&kv);
    assert!(report.reconcile.inserted.is_empty());
    let store = rebooted.store_snapshot().await;
    assert!(store.get(&id).is_none());
    assert!(store.is_tombstoned(&id));
}

#[tokio::test(start_paused = true)]
async fn restart_pauses_interrupted_interview() {
    let kv = Arc::new(MemoryStore::new());
    let (service, id) = started(&kv).await;
    assert!(service.flush_now().await);
    drop(service);

    let (rebooted, report) = boot_on(&kv);
    assert_eq!(report.interrupted, vec![id.clone()]);
    rebooted.start().await;
    assert_eq!(
        rebooted.store_snapshot().await.get(&id).unwrap().status,
        CandidateStatus::Paused
    );

    rebooted.resume_interview(&id).await.unwrap();
    let clock = rebooted.clock().await;
    assert_eq!(clock.state.status, CountdownStatus::Running);
    assert_eq!(clock.state.question_id.as_deref(), Some("q1"));
}

#[tokio::test(start_paused = true)]
async fn draft_selection_restores_for_same_question_only() {
    let kv = Arc::new(MemoryStore::new());
    let (service, id) = started(&kv).await;

    assert!(service.record_draft_selection(&id, 0, 2).await);
    let draft = service.restore_draft(&id, 0).await.unwrap();
    assert_eq!(draft.selected_option, Some(2));
    assert!(service.restore_draft(&id, 1).await.is_none());
}

fn draft_key_present(kv: &Arc<MemoryStore>) -> bool {
    Repository::new(kv.clone()).read_autosave().unwrap().is_some()
}

#[tokio::test(start_paused = true)]
async fn pending_text_draft_is_dropped_on_submit() {
    let kv = Arc::new(MemoryStore::new());
    let (service, id) = started(&kv).await;

    service.record_draft_text(&id, 0, "probably move").await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    service
        .answer_current_question(&id, AnswerInput::choice(1))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!draft_key_present(&kv));
    assert!(service.restore_draft(&id, 0).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn pending_text_draft_is_dropped_on_delete() {
    let kv = Arc::new(MemoryStore::new());
    let (service, id) = started(&kv).await;

    service.record_draft_text(&id, 0, "half an answer").await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(service.delete_candidate(&id).await);
    assert!(service.flush_now().await);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!draft_key_present(&kv));
}

fn backed_up_record(kv: &Arc<MemoryStore>, status: CandidateStatus) {
    let now = Utc::now();
    let mut store = CandidateStore::from_parts(
        vec![Candidate::new("R1".into(), ada(), now)],
        None,
        ViewState::default(),
        Vec::<String>::new(),
    );
    store.start_interview("R1", two_questions(), now).unwrap();
    if status == CandidateStatus::Paused {
        store.pause_interview("R1", now).unwrap();
    }
    let bytes = encode_candidate(store.get("R1").unwrap(), now).unwrap();
    Repository::new(kv.clone())
        .write_owned(Namespace::Backup, "R1", &bytes)
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn reconcile_restores_running_interview_as_paused() {
    let kv = Arc::new(MemoryStore::new());
    let (service, _) = boot_on(&kv);
    service.start().await;
    backed_up_record(&kv, CandidateStatus::Interview);

    let report = service.reconcile_now().await;
    assert_eq!(report.inserted, vec!["R1".to_string()]);
    assert_eq!(report.paused, vec!["R1".to_string()]);

    let store = service.store_snapshot().await;
    assert_eq!(store.get("R1").unwrap().status, CandidateStatus::Paused);

    service.resume_interview("R1").await.unwrap();
    let clock = service.clock().await;
    assert_eq!(clock.state.status, CountdownStatus::Running);
    assert_eq!(clock.state.question_id.as_deref(), Some("q1"));
}

#[tokio::test(start_paused = true)]
async fn reconcile_restore_starts_interval_flush() {
    let kv = Arc::new(MemoryStore::new());
    let (service, _) = boot_on(&kv);
    service.start().await;
    backed_up_record(&kv, CandidateStatus::Paused);

    let report = service.reconcile_now().await;
    assert_eq!(report.inserted, vec!["R1".to_string()]);
    assert!(report.paused.is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    service
        .add_chat_message("R1", "system", "resumed later", "bot")
        .await
        .unwrap();
    assert_eq!(primary_chat_len(&kv, "R1"), 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(primary_chat_len(&kv, "R1"), 1);
}

#[test]
fn single_easy_question_with_empty_answer_completes_at_zero() {
    let now = Utc::now();
    let mut store = CandidateStore::from_parts(
        vec![Candidate::new("C1".into(), CandidateFields::new("C", "", ""), now)],
        None,
        ViewState::default(),
        Vec::<String>::new(),
    );
    store
        .start_interview("C1", vec![Question::new("q1", "Say hi", Difficulty::Easy)], now)
        .unwrap();
    assert_eq!(store.get("C1").unwrap().questions[0].time, 20);

    store
        .submit_answer("C1", AnswerEvent::manual("q1", "", None, 0, "no answer"), now)
        .unwrap();
    assert_eq!(store.next_question("C1", now).unwrap(), Progress::Completed);

    let candidate = store.get("C1").unwrap();
    assert_eq!(candidate.status, CandidateStatus::Completed);
    assert_eq!(candidate.total_score, 0);
    assert_eq!(candidate.max_score, 10);
}
