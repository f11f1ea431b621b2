//! Service values injected into chart rendering.
//!
//! Commands run outside of a real project build (plain `helm` commands) still
//! render charts that reference `.Values.deckhand`, so stub values are
//! populated before the business logic runs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::DeckhandError;

pub const STUB_PROJECT: &str = "PROJECT";
pub const STUB_REPO: &str = "REPO";
pub const STUB_COMMIT_HASH: &str = "COMMIT_HASH";

#[derive(Debug, Serialize)]
struct CommitDate {
    human: String,
    unix: i64,
}

#[derive(Debug, Serialize)]
struct Commit {
    hash: String,
    date: CommitDate,
}

#[derive(Debug, Serialize)]
struct DeckhandValues {
    name: String,
    repo: String,
    namespace: String,
    is_stub: bool,
    commit: Commit,
}

/// Build the stub values for `namespace`.
///
/// The same block is exposed both at `.Values.deckhand` and at
/// `.Values.global.deckhand` so subcharts see it too.
pub fn stub_service_values(namespace: &str) -> Result<Value, DeckhandError> {
    let commit_date = DateTime::<Utc>::default();
    let values = serde_json::to_value(DeckhandValues {
        name: STUB_PROJECT.to_string(),
        repo: STUB_REPO.to_string(),
        namespace: namespace.to_string(),
        is_stub: true,
        commit: Commit {
            hash: STUB_COMMIT_HASH.to_string(),
            date: CommitDate {
                human: commit_date.to_rfc3339(),
                unix: commit_date.timestamp(),
            },
        },
    })?;

    Ok(json!({
        "deckhand": values.clone(),
        "global": { "deckhand": values },
    }))
}
