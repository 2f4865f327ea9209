pub mod autosave;
pub mod backup;
pub mod namespace;
pub mod reconcile;
pub mod snapshot;

pub use autosave::{AnswerDraft, DraftAutosave};
pub use backup::BackupWriter;
pub use namespace::{Entry, Namespace, Repository, AUTOSAVE_KEY, PRIMARY_KEY};
pub use reconcile::{merge_candidate, reconcile, DecodeFailure, MergeOutcome, ReconcileReport};
pub use snapshot::{
    decode_candidate, decode_primary, encode_candidate, encode_primary, CandidateSnapshot,
    DecodedPrimary, PrimarySnapshot, SNAPSHOT_VERSION,
};
