pub mod db;
pub mod error;
pub mod models;
pub mod persistence;
pub mod scheduler;
pub mod scoring;
pub mod service;
pub mod settings;
pub mod store;
pub mod timer;
pub mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

pub use db::{KeyValueStore, MemoryStore, SqliteStore};
pub use error::{DecodeError, LifecycleError, ScoringError, StorageError};
pub use models::{Candidate, CandidateFields, CandidateStatus, InterviewSummary, Question};
pub use persistence::{ReconcileReport, Repository};
pub use scoring::{AnswerInput, AnswerScorer, ChoiceScorer};
pub use service::{BootReport, InterviewService};
pub use settings::{Settings, SettingsStore};
pub use store::{CandidateStore, Progress};

use models::{SortBy, SortOrder};

#[derive(Parser, Debug)]
#[command(name = "intervault")]
#[command(author, version, about = "Inspect and repair persisted interview state")]
struct Args {
    /// SQLite database file (overrides settings and INTERVAULT_DB_PATH)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Settings file
    #[arg(long, default_value = "intervault.settings.json")]
    settings: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the restored store and every durable key without writing
    Dump,
    /// Merge backup and emergency snapshots into the primary and save it
    Reconcile,
    /// Rewrite the primary snapshot and per-candidate backups
    Flush,
    /// List candidates the way the dashboard shows them
    List {
        /// Case-insensitive match on name, email or summary rating, or an
        /// exact substring of the phone number
        #[arg(long)]
        search: Option<String>,

        /// score, name, date or status
        #[arg(long, default_value = "date")]
        sort: String,

        /// asc or desc
        #[arg(long, default_value = "desc")]
        order: String,
    },
    /// Delete a candidate and purge its backups
    Delete { id: String },
    /// Remove every interview key: primary, backups, emergency copies and the draft
    Clear,
    /// Remove per-candidate backups older than the given age
    Prune {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
}

pub fn run() -> Result<()> {
    let args = Args::parse();

    let settings_store = SettingsStore::new(args.settings.clone())?;
    let settings = settings_store.settings();
    utils::init_logging(settings.debug);

    let db_path = args.db.clone().unwrap_or_else(|| settings.storage.db_path.clone());
    log::info!("intervault starting with {}", db_path.display());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        let store = SqliteStore::open(db_path, settings.storage.quota_bytes)?;
        let repo = Repository::new(Arc::new(store));
        let (service, boot) =
            InterviewService::boot(repo.clone(), &settings.persistence, Arc::new(ChoiceScorer));

        match args.command {
            Command::Dump => {
                let report = service.debug_dump().await?;
                print_json(&json!({ "boot": boot, "state": report }))
            }
            Command::List {
                search,
                sort,
                order,
            } => {
                let sort_by =
                    SortBy::parse(&sort).ok_or_else(|| anyhow!("unknown sort field: {sort}"))?;
                let sort_order =
                    SortOrder::parse(&order).ok_or_else(|| anyhow!("unknown sort order: {order}"))?;

                let mut store = service.store_snapshot().await;
                if let Some(term) = search {
                    store.set_search_term(term);
                }
                store.set_sort(sort_by, sort_order);

                let rows: Vec<_> = store
                    .visible_candidates()
                    .into_iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "name": c.name,
                            "email": c.email,
                            "status": c.status,
                            "totalScore": c.total_score,
                            "maxScore": c.max_score,
                            "createdAt": c.created_at,
                        })
                    })
                    .collect();
                print_json(&rows)
            }
            Command::Reconcile => {
                let pass = service.reconcile_now().await;
                let flushed = service.shutdown().await;
                print_json(&json!({ "boot": boot, "reconcile": pass, "flushed": flushed }))
            }
            Command::Flush => {
                let flushed = service.shutdown().await;
                print_json(&json!({ "flushed": flushed }))
            }
            Command::Delete { id } => {
                let existed = service.delete_candidate(&id).await;
                let flushed = service.shutdown().await;
                print_json(&json!({ "id": id, "existed": existed, "flushed": flushed }))
            }
            Command::Clear => {
                drop(service);
                let removed = repo.clear_all()?;
                log::info!("cleared {removed} interview keys");
                print_json(&json!({ "removed": removed }))
            }
            Command::Prune { days } => {
                let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(days));
                let removed = repo.prune_backups(cutoff)?;
                log::info!("pruned {} backups saved before {cutoff}", removed.len());
                print_json(&json!({ "cutoff": cutoff, "removed": removed }))
            }
        }
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
