//! Snapshot and event types for the analysis synchronization layer.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::analysis::AnalysisResult;

/// Request-lifecycle state of the snapshot.
///
/// `Idle -> Pending -> {Idle, Error}`. There is no separate success state:
/// idle-with-a-result and idle-with-no-result differ only by whether
/// `result` is present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Pending,
    Error,
}

/// Why the last request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// The service throttled the account; distinct so callers can render
    /// a "try later / upgrade" affordance instead of a generic error.
    RateLimited,
    /// Transport failure, non-2xx response, or unparseable body.
    RequestFailed,
}

/// Failure detail recorded in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub kind: FailureKind,
    /// Best-effort human-readable message extracted from the response.
    pub message: String,
}

/// The single source of truth for "the last analysis outcome".
///
/// Owned exclusively by the sync manager; consumers receive clones.
/// `error` is `Some` iff `status == Error`. A failed refresh only changes
/// the status/error portion; `result` and `fetched_at` keep the last good
/// value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub result: Option<AnalysisResult>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub status: SyncStatus,
    pub error: Option<SyncFailure>,
}

impl AnalysisSnapshot {
    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.status == SyncStatus::Pending
    }
}

/// Broadcast notification emitted by the sync manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum AnalysisEvent {
    /// A new result was stored.
    Updated {
        result: AnalysisResult,
        fetched_at: DateTime<Utc>,
    },
    /// The snapshot and durable state were wiped.
    Cleared,
}
