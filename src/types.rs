use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::ObjectReference;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Suffix appended to a stream ID claimed by more than one agent.
pub const DUPLICATE_MARKER: &str = "****";

/// Status document served by a Manifest Agent on `/status`.
///
/// Only `stream_id` drives reconciliation; the rest is kept for logging.
/// Durations are Go `time.Duration` values, i.e. nanoseconds.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentStatus {
    pub start_time: DateTime<Utc>,
    #[serde(rename = "MpdURL", default)]
    pub mpd_url: String,
    #[serde(rename = "StreamID", default)]
    pub stream_id: String,
    #[serde(rename = "ISID", default)]
    pub isid: u64,
    #[serde(default)]
    pub mpd_last_requested_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub mpd_last_received_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub mpd_poll_interval_max: i64,
    #[serde(default)]
    pub mpd_poll_interval_min: i64,
    #[serde(default)]
    pub mpd_live_point: Option<DateTime<Utc>>,
    #[serde(default)]
    pub mpd_last_publish_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub mpd_poll_success_count: i64,
    #[serde(default)]
    pub mpd_poll_failure_count: i64,
    #[serde(default)]
    pub mpd_poll_last_error: String,
    #[serde(default)]
    pub mpd_live_point_drift: i64,
    #[serde(default)]
    pub mpd_drift_correct: i64,
    #[serde(default)]
    pub active_recordings: i64,
    #[serde(default)]
    pub active_recordings_with_err: i64,
    #[serde(default)]
    pub active_batches: i64,
    #[serde(default)]
    pub mpd_dropped: i64,
    #[serde(default)]
    pub content_dropped: i64,
}

impl AgentStatus {
    pub fn is_idle(&self) -> bool {
        self.stream_id.is_empty()
    }
}

/// Endpoint addresses that can be attributed to a pod, keyed by IP.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEndpoints {
    pub pods: BTreeMap<String, ObjectReference>,
    pub port: i32,
}

/// Outcome of inspecting a single agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodState {
    Owns(String),
    Duplicate(String),
    Idle,
    Down,
    StatusUnknown,
}

impl fmt::Display for PodState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PodState::Owns(stream) => write!(f, "{}", stream),
            PodState::Duplicate(stream) => write!(f, "{}{}", stream, DUPLICATE_MARKER),
            PodState::Idle => write!(f, "Idle"),
            PodState::Down => write!(f, "Down"),
            PodState::StatusUnknown => write!(f, "Status Unknown"),
        }
    }
}

impl Serialize for PodState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Pod name to state, built fresh on every pass.
pub type ReconciliationResult = BTreeMap<String, PodState>;

/// Signal asking the trace loop to run another pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Tick,
    EndpointsChanged,
}
