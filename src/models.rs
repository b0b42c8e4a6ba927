//! Records persisted by the offline engine.
//!
//! All structs use camelCase serialization so the stored JSON and the
//! payloads posted to the monitoring API share one field naming.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Automatic retries stop once a row has been attempted this many times.
pub const MAX_SYNC_ATTEMPTS: u32 = 3;

/// Priority assigned by `enqueue` when the caller does not choose one.
pub const DEFAULT_PRIORITY: u8 = 5;

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;

/// Fresh local row key.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Time-seeded deduplication token, e.g. `1700000000000-9f2c01ab77e4`.
pub fn generate_client_submission_id(now_ms: u64) -> String {
    let mut suffix = [0u8; 6];
    rand::rngs::OsRng.fill_bytes(&mut suffix);
    format!("{}-{}", now_ms, hex::encode(suffix))
}

/// Kind of field report. Determines the endpoint the row is posted to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionType {
    PollingUnitInfo,
    OfficerArrival,
    ResultTracking,
    IncidentReport,
}

impl SubmissionType {
    pub const ALL: [SubmissionType; 4] = [
        SubmissionType::PollingUnitInfo,
        SubmissionType::OfficerArrival,
        SubmissionType::ResultTracking,
        SubmissionType::IncidentReport,
    ];

    /// API path this kind of submission is posted to.
    pub fn endpoint(&self) -> &'static str {
        match self {
            SubmissionType::PollingUnitInfo => "/monitoring/polling-unit",
            SubmissionType::OfficerArrival => "/monitoring/officer-arrival",
            SubmissionType::ResultTracking => "/monitoring/result-tracking",
            SubmissionType::IncidentReport => "/monitoring/incident-report",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionType::PollingUnitInfo => "polling_unit_info",
            SubmissionType::OfficerArrival => "officer_arrival",
            SubmissionType::ResultTracking => "result_tracking",
            SubmissionType::IncidentReport => "incident_report",
        }
    }
}

impl fmt::Display for SubmissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SubmissionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubmissionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown submission type: {s}"))
    }
}

/// Lifecycle state of a queued submission.
///
/// `Draft` is never stored on a queue row; drafts live in their own collection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Draft,
    Pending,
    Syncing,
    Synced,
    Failed,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Draft => "draft",
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Syncing => "syncing",
            SubmissionStatus::Synced => "synced",
            SubmissionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(SubmissionStatus::Draft),
            "pending" => Ok(SubmissionStatus::Pending),
            "syncing" => Ok(SubmissionStatus::Syncing),
            "synced" => Ok(SubmissionStatus::Synced),
            "failed" => Ok(SubmissionStatus::Failed),
            _ => Err(format!("unknown submission status: {s}")),
        }
    }
}

/// A durable, retryable unit of work in the sync queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueuedSubmission {
    /// Local row key.
    pub id: String,
    /// Deduplication token sent to the server; stable across retries.
    pub client_submission_id: String,
    #[serde(rename = "type")]
    pub submission_type: SubmissionType,
    pub election_id: String,
    pub polling_unit_code: String,
    /// Form payload. Opaque to the engine.
    pub data: Value,
    pub status: SubmissionStatus,
    /// 1..=10, higher syncs first.
    pub priority: u8,
    pub created_at: u64,
    pub updated_at: u64,
    pub synced_at: Option<u64>,
    pub last_sync_attempt: Option<u64>,
    pub sync_attempts: u32,
    /// Last failure message. Overwritten, never cleared.
    pub error: Option<String>,
    pub server_submission_id: Option<String>,
}

impl QueuedSubmission {
    /// Whether the next sync pass should pick this row up.
    pub fn is_eligible(&self) -> bool {
        match self.status {
            SubmissionStatus::Pending => true,
            SubmissionStatus::Failed => self.sync_attempts < MAX_SYNC_ATTEMPTS,
            _ => false,
        }
    }

    /// Failed and out of automatic retries; needs a manual retry.
    pub fn is_exhausted(&self) -> bool {
        self.status == SubmissionStatus::Failed && self.sync_attempts >= MAX_SYNC_ATTEMPTS
    }

    /// Body posted to the server: the form data plus the routing context.
    ///
    /// Context fields win over same-named keys inside `data`. A non-object
    /// payload is nested under `data`.
    pub fn payload(&self) -> Value {
        let mut body = match &self.data {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other.clone());
                map
            }
        };
        body.insert(
            "clientSubmissionId".to_string(),
            Value::String(self.client_submission_id.clone()),
        );
        body.insert(
            "electionId".to_string(),
            Value::String(self.election_id.clone()),
        );
        body.insert(
            "pollingUnitCode".to_string(),
            Value::String(self.polling_unit_code.clone()),
        );
        Value::Object(body)
    }
}

/// Scheduling order: priority descending, then oldest first.
pub fn queue_order(a: &QueuedSubmission, b: &QueuedSubmission) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
}

/// An auto-saved, not yet submitted form. One per (form type, election).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DraftSubmission {
    pub id: String,
    pub form_type: String,
    pub election_id: String,
    pub data: Value,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Point-in-time counts for queue badges.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub syncing: usize,
    pub synced: usize,
    pub failed: usize,
    /// Number of stored drafts (not queue rows).
    pub draft: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    pub id: String,
    pub error: String,
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub synced: usize,
    pub failed: usize,
    pub errors: Vec<SyncFailure>,
}
