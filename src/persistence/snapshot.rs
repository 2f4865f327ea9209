//! Versioned snapshot schema shared by every durable namespace.
//!
//! Decoding runs the raw JSON through a chain of pure migrations
//! (`v1 -> v2 -> v3`) before deserialising, so everything downstream only
//! ever sees the current shape.
//!
//! * v1: a bare candidate object (legacy backups, optional `timestamp`), or
//!   for the primary snapshot an object with a `candidates` field and no
//!   `version`.
//! * v2: the `{ version, savedAt, ... }` envelope, fields as written.
//! * v3: the envelope with every candidate normalised.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::DecodeError;
use crate::models::{Candidate, Difficulty, ViewState};
use crate::store::CandidateStore;

pub const SNAPSHOT_VERSION: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub candidate: Candidate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrimarySnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub active_candidate_id: Option<String>,
    #[serde(default)]
    pub view: ViewState,
    #[serde(default)]
    pub deleted_candidate_ids: Vec<String>,
}

/// Result of decoding the primary snapshot. Entries that could not be
/// decoded are counted, not fatal.
#[derive(Debug)]
pub struct DecodedPrimary {
    pub store: CandidateStore,
    pub saved_at: DateTime<Utc>,
    pub skipped: usize,
}

pub fn encode_candidate(candidate: &Candidate, now: DateTime<Utc>) -> Result<Vec<u8>, serde_json::Error> {
    let snapshot = json!({
        "version": SNAPSHOT_VERSION,
        "savedAt": now,
        "candidate": candidate,
    });
    serde_json::to_vec(&snapshot)
}

pub fn encode_primary(store: &CandidateStore, now: DateTime<Utc>) -> Result<Vec<u8>, serde_json::Error> {
    let snapshot = json!({
        "version": SNAPSHOT_VERSION,
        "savedAt": now,
        "candidates": store.candidates(),
        "activeCandidateId": store.active_candidate_id(),
        "view": store.view(),
        "deletedCandidateIds": store.tombstones(),
    });
    serde_json::to_vec(&snapshot)
}

pub fn decode_candidate(bytes: &[u8]) -> Result<CandidateSnapshot, DecodeError> {
    let raw: Value = serde_json::from_slice(bytes)?;
    let Value::Object(mut object) = raw else {
        return Err(DecodeError::Shape("candidate snapshot is not an object".into()));
    };

    let mut version = detect_version(&object)?;
    if version == 1 {
        object = candidate_v1_to_v2(object);
        version = 2;
    }
    if version == 2 {
        object = candidate_v2_to_v3(object)?;
    }

    match object.get("candidate") {
        Some(Value::Object(candidate)) if has_id(candidate) => {}
        Some(Value::Object(_)) => return Err(DecodeError::MissingId),
        _ => return Err(DecodeError::Shape("envelope has no candidate object".into())),
    }
    Ok(serde_json::from_value(Value::Object(object))?)
}

pub fn decode_primary(bytes: &[u8]) -> Result<DecodedPrimary, DecodeError> {
    let raw: Value = serde_json::from_slice(bytes)?;
    let Value::Object(mut object) = raw else {
        return Err(DecodeError::Shape("primary snapshot is not an object".into()));
    };

    let mut version = detect_version(&object)?;
    if version == 1 {
        object = primary_v1_to_v2(object);
        version = 2;
    }
    if version == 2 {
        object = primary_v2_to_v3(object);
    }

    // Decode candidates one by one so a single bad entry does not sink the rest.
    let raw_candidates = match object.remove("candidates") {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    object.insert("candidates".into(), Value::Array(Vec::new()));
    let envelope: PrimarySnapshot = serde_json::from_value(Value::Object(object))?;

    let mut candidates = Vec::with_capacity(raw_candidates.len());
    let mut skipped = 0;
    for item in raw_candidates {
        let decoded = match &item {
            Value::Object(c) if has_id(c) => serde_json::from_value::<Candidate>(item).ok(),
            _ => None,
        };
        match decoded {
            Some(candidate) => candidates.push(candidate),
            None => skipped += 1,
        }
    }

    Ok(DecodedPrimary {
        store: CandidateStore::from_parts(
            candidates,
            envelope.active_candidate_id,
            envelope.view,
            envelope.deleted_candidate_ids,
        ),
        saved_at: envelope.saved_at,
        skipped,
    })
}

fn detect_version(object: &Map<String, Value>) -> Result<u32, DecodeError> {
    match object.get("version") {
        None | Some(Value::Null) => Ok(1),
        Some(Value::Number(n)) => {
            let version = n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| DecodeError::Shape(format!("invalid version {n}")))?;
            match version {
                0 | 1 => Ok(1),
                v if v > SNAPSHOT_VERSION => Err(DecodeError::UnsupportedVersion(v)),
                v => Ok(v),
            }
        }
        Some(other) => Err(DecodeError::Shape(format!("invalid version {other}"))),
    }
}

fn has_id(candidate: &Map<String, Value>) -> bool {
    candidate
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.is_empty())
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// `timestamp` in legacy backups is either an RFC 3339 string or epoch millis.
fn parse_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

fn candidate_v1_to_v2(mut candidate: Map<String, Value>) -> Map<String, Value> {
    let saved_at = candidate
        .remove("timestamp")
        .as_ref()
        .and_then(parse_instant)
        .or_else(|| candidate.get("updatedAt").and_then(parse_instant))
        .unwrap_or_else(epoch);

    let mut envelope = Map::new();
    envelope.insert("version".into(), json!(2));
    envelope.insert("savedAt".into(), json!(saved_at));
    envelope.insert("candidate".into(), Value::Object(candidate));
    envelope
}

fn candidate_v2_to_v3(mut envelope: Map<String, Value>) -> Result<Map<String, Value>, DecodeError> {
    let saved_at = saved_at_of(&envelope);
    let candidate = match envelope.remove("candidate") {
        Some(Value::Object(candidate)) => candidate,
        _ => return Err(DecodeError::Shape("envelope has no candidate object".into())),
    };
    envelope.insert("version".into(), json!(SNAPSHOT_VERSION));
    envelope.insert("savedAt".into(), json!(saved_at));
    envelope.insert("candidate".into(), Value::Object(normalize_candidate(candidate, saved_at)));
    Ok(envelope)
}

fn primary_v1_to_v2(mut state: Map<String, Value>) -> Map<String, Value> {
    // older saves nest the list one level down: { candidates: { candidates: [...] } }
    if matches!(state.get("candidates"), Some(Value::Object(_))) {
        if let Some(Value::Object(slice)) = state.remove("candidates") {
            state.extend(slice);
        }
    }

    let active_candidate_id = state
        .remove("activeCandidate")
        .and_then(|active| active.get("id").cloned())
        .unwrap_or(Value::Null);
    let view = json!({
        "selectedCandidateId": state.remove("selectedCandidateId").unwrap_or(Value::Null),
        "searchTerm": state.remove("searchTerm").unwrap_or_else(|| json!("")),
        "sortBy": state.remove("sortBy").unwrap_or_else(|| json!("score")),
        "sortOrder": state.remove("sortOrder").unwrap_or_else(|| json!("desc")),
    });

    let mut envelope = Map::new();
    envelope.insert("version".into(), json!(2));
    envelope.insert(
        "savedAt".into(),
        json!(state.get("timestamp").and_then(parse_instant).unwrap_or_else(epoch)),
    );
    envelope.insert("candidates".into(), state.remove("candidates").unwrap_or(Value::Null));
    envelope.insert("activeCandidateId".into(), active_candidate_id);
    envelope.insert("view".into(), view);
    envelope.insert(
        "deletedCandidateIds".into(),
        state.remove("deletedCandidateIds").unwrap_or(Value::Null),
    );
    envelope
}

fn primary_v2_to_v3(mut envelope: Map<String, Value>) -> Map<String, Value> {
    let saved_at = saved_at_of(&envelope);
    let candidates = match envelope.remove("candidates") {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(candidate) => Value::Object(normalize_candidate(candidate, saved_at)),
                other => other,
            })
            .collect(),
        _ => Vec::new(),
    };
    let deleted: Vec<Value> = match envelope.remove("deletedCandidateIds") {
        Some(Value::Array(ids)) => ids.into_iter().filter(Value::is_string).collect(),
        _ => Vec::new(),
    };
    if !matches!(envelope.get("view"), Some(Value::Object(_))) {
        envelope.insert("view".into(), json!({}));
    }
    if let Some(Value::Object(view)) = envelope.get_mut("view") {
        for (field, fallback) in [("sortBy", json!("score")), ("sortOrder", json!("desc"))] {
            if !view.get(field).is_some_and(Value::is_string) {
                view.insert(field.into(), fallback);
            }
        }
    }

    envelope.insert("version".into(), json!(SNAPSHOT_VERSION));
    envelope.insert("savedAt".into(), json!(saved_at));
    envelope.insert("candidates".into(), Value::Array(candidates));
    envelope.insert("deletedCandidateIds".into(), Value::Array(deleted));
    envelope
}

fn saved_at_of(envelope: &Map<String, Value>) -> DateTime<Utc> {
    envelope
        .get("savedAt")
        .and_then(parse_instant)
        .unwrap_or_else(epoch)
}

/// Backfills every missing field with its default and coerces collection
/// fields that are not arrays.
fn normalize_candidate(mut c: Map<String, Value>, saved_at: DateTime<Utc>) -> Map<String, Value> {
    for field in ["name", "email", "phone", "resumeText", "fileName"] {
        if !c.get(field).is_some_and(Value::is_string) {
            c.insert(field.into(), json!(""));
        }
    }
    if !c.get("status").is_some_and(Value::is_string) {
        c.insert("status".into(), json!("info_collection"));
    }
    for field in ["createdAt", "updatedAt"] {
        if !c.get(field).is_some_and(Value::is_string) {
            c.insert(field.into(), json!(saved_at));
        }
    }
    for field in ["interviewStartedAt", "interviewCompletedAt", "summary"] {
        c.entry(field).or_insert(Value::Null);
    }
    for field in ["skills", "chatHistory", "questions"] {
        if !c.get(field).is_some_and(Value::is_array) {
            c.insert(field.into(), json!([]));
        }
    }
    if !c.get("currentQuestionIndex").is_some_and(Value::is_u64) {
        c.insert("currentQuestionIndex".into(), json!(0));
    }

    if let Some(Value::Array(questions)) = c.get_mut("questions") {
        for question in questions.iter_mut() {
            if let Value::Object(q) = question {
                let difficulty = q
                    .get("difficulty")
                    .and_then(Value::as_str)
                    .and_then(Difficulty::parse);
                if !q.get("time").is_some_and(Value::is_u64) {
                    if let Some(d) = difficulty {
                        q.insert("time".into(), json!(d.time_limit_secs()));
                    }
                }
            }
        }
    }

    let (cap_sum, score_sum) = match c.get("questions") {
        Some(Value::Array(questions)) => questions.iter().fold((0u64, 0u64), |(cap, score), q| {
            let q_cap = q
                .get("difficulty")
                .and_then(Value::as_str)
                .and_then(Difficulty::parse)
                .map(|d| u64::from(d.score_cap()))
                .unwrap_or(0);
            let q_score = q.get("score").and_then(Value::as_u64).unwrap_or(0);
            (cap + q_cap, score + q_score)
        }),
        _ => (0, 0),
    };
    if !c.get("maxScore").is_some_and(Value::is_u64) {
        c.insert("maxScore".into(), json!(cap_sum));
    }
    if !c.get("totalScore").is_some_and(Value::is_u64) {
        c.insert("totalScore".into(), json!(score_sum));
    }
    c
}
