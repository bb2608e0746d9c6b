//! Core types shared by the provdash crates.
//!
//! Everything here mirrors the backend's JSON wire shapes. The backend has
//! historically serialized some of this data two ways (playbook results as a
//! list or a name-keyed map, groups as strings or objects, timestamps with
//! or without an offset), so decoding is deliberately lenient.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use smallvec::SmallVec;

/// Overall lifecycle status of one managed instance.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    New,
    Provisioning,
    Provisioned,
    Failed,
    PartialFailure,
    Retrying,
    Skipped,
    Orphaned,
    #[default]
    #[serde(other)]
    Unknown,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::New => "new",
            InstanceStatus::Provisioning => "provisioning",
            InstanceStatus::Provisioned => "provisioned",
            InstanceStatus::Failed => "failed",
            InstanceStatus::PartialFailure => "partial_failure",
            InstanceStatus::Retrying => "retrying",
            InstanceStatus::Skipped => "skipped",
            InstanceStatus::Orphaned => "orphaned",
            InstanceStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one playbook run against an instance.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybookStatus {
    Pending,
    Running,
    Success,
    Failed,
    Timeout,
    #[default]
    #[serde(other)]
    Unknown,
}

impl PlaybookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybookStatus::Pending => "pending",
            PlaybookStatus::Running => "running",
            PlaybookStatus::Success => "success",
            PlaybookStatus::Failed => "failed",
            PlaybookStatus::Timeout => "timeout",
            PlaybookStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PlaybookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Group membership: either a bare name or an object carrying one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum GroupRef {
    Name(String),
    Object { name: String },
}

impl GroupRef {
    pub fn name(&self) -> &str {
        match self {
            GroupRef::Name(s) => s,
            GroupRef::Object { name } => name,
        }
    }
}

/// Outcome of one playbook run, replaced wholesale on every re-fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlaybookResult {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub status: PlaybookStatus,
    #[serde(default, with = "ts")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "ts")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_sec: Option<f64>,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub output: Option<String>,
}

/// One managed instance as reported by the backend. The client never mutates
/// this locally; a new value replaces the old on re-fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    #[serde(alias = "id")]
    pub instance_id: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub detector: Option<String>,
    #[serde(default)]
    pub groups: SmallVec<[GroupRef; 4]>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default, with = "ts")]
    pub detected_at: Option<DateTime<Utc>>,
    #[serde(default, with = "ts")]
    pub last_seen_at: Option<DateTime<Utc>>,
    #[serde(default, with = "ts")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, with = "ts")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub playbooks: SmallVec<[String; 4]>,
    #[serde(default, deserialize_with = "de_playbook_results")]
    pub playbook_results: Vec<PlaybookResult>,
    #[serde(default, alias = "status")]
    pub overall_status: InstanceStatus,
    #[serde(default)]
    pub current_playbook: Option<String>,
}

impl Instance {
    pub fn playbook_result(&self, name: &str) -> Option<&PlaybookResult> {
        self.playbook_results.iter().find(|r| r.name == name)
    }

    pub fn has_results(&self) -> bool {
        !self.playbook_results.is_empty()
    }
}

/// Aggregate counters served by `/api/stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Stats {
    #[serde(default)]
    pub total_instances: u64,
    #[serde(default)]
    pub successful: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub pending: u64,
    #[serde(default)]
    pub uptime_seconds: Option<f64>,
    #[serde(default)]
    pub uptime_human: Option<String>,
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

/// A detector entry from `/api/config`: a named mapping of options, or just
/// a label when the backend stringifies it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DetectorInfo {
    Named {
        name: String,
        #[serde(default)]
        options: serde_json::Map<String, serde_json::Value>,
    },
    Label(String),
}

impl DetectorInfo {
    pub fn name(&self) -> &str {
        match self {
            DetectorInfo::Named { name, .. } => name,
            DetectorInfo::Label(s) => s,
        }
    }

    pub fn options(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        match self {
            DetectorInfo::Named { options, .. } => Some(options),
            DetectorInfo::Label(_) => None,
        }
    }
}

/// Static daemon configuration served by `/api/config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    #[serde(default)]
    pub state_file: Option<String>,
    #[serde(default)]
    pub log_dir: Option<String>,
    #[serde(default)]
    pub static_inventory: Option<String>,
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub rules_count: Option<usize>,
    #[serde(default)]
    pub detectors: Vec<DetectorInfo>,
    #[serde(default = "default_true")]
    pub ui: bool,
}

fn default_true() -> bool {
    true
}

/// Payload for creating an instance via `POST /api/instances`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewInstance {
    pub instance_id: String,
    pub ip_address: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub playbooks: Vec<String>,
}

/// One consistent read of instances + stats + config. A snapshot is only
/// ever replaced as a whole; a failed refresh leaves the prior one in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    #[serde(default)]
    pub instances: Vec<Instance>,
    #[serde(default)]
    pub stats: Stats,
    #[serde(default)]
    pub config: BackendConfig,
    #[serde(default, with = "ts")]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.fetched_at.is_none()
    }
}

/// Parse a backend timestamp. RFC 3339 first; the backend's Python side
/// also emits naive `isoformat()` strings with no offset, read as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|n| Utc.from_utc_datetime(&n))
}

/// serde adapter for optional backend timestamps. Unparseable values decode
/// to `None` rather than failing the whole payload.
pub mod ts {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(v: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match v {
            Some(dt) => s.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(d)?;
        Ok(raw
            .as_deref()
            .filter(|s| !s.is_empty())
            .and_then(super::parse_timestamp))
    }
}

fn de_playbook_results<'de, D>(d: D) -> Result<Vec<PlaybookResult>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ResultsVisitor;

    impl<'de> Visitor<'de> for ResultsVisitor {
        type Value = Vec<PlaybookResult>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a sequence or name-keyed mapping of playbook results")
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Vec::new())
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut out = Vec::new();
            while let Some(pb) = seq.next_element::<PlaybookResult>()? {
                out.push(pb);
            }
            Ok(out)
        }

        // Map entries arrive in document order, which is the reported order
        // the log viewer relies on.
        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut out = Vec::new();
            while let Some((name, mut pb)) = map.next_entry::<String, PlaybookResult>()? {
                if pb.name.is_empty() {
                    pb.name = name;
                }
                out.push(pb);
            }
            Ok(out)
        }
    }

    d.deserialize_any(ResultsVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_list_shaped_playbook_results() {
        let raw = r#"{
            "instance_id": "web-01",
            "ip_address": "10.0.0.4",
            "overall_status": "partial_failure",
            "playbook_results": [
                {"name": "base", "status": "success", "duration_sec": 12.5},
                {"name": "deploy", "status": "failed", "error": "unreachable"}
            ]
        }"#;
        let inst: Instance = serde_json::from_str(raw).unwrap();
        assert_eq!(inst.overall_status, InstanceStatus::PartialFailure);
        let names: Vec<_> = inst.playbook_results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["base", "deploy"]);
        assert_eq!(inst.playbook_result("deploy").unwrap().status, PlaybookStatus::Failed);
    }

    #[test]
    fn decodes_map_shaped_playbook_results_in_document_order() {
        let raw = r#"{
            "instance_id": "db-01",
            "playbook_results": {
                "zz-last": {"status": "pending"},
                "aa-first": {"status": "running"}
            }
        }"#;
        let inst: Instance = serde_json::from_str(raw).unwrap();
        let names: Vec<_> = inst.playbook_results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["zz-last", "aa-first"]);
    }

    #[test]
    fn parses_naive_and_offset_timestamps() {
        assert!(parse_timestamp("2024-03-01T12:30:05.123456").is_some());
        assert!(parse_timestamp("2024-03-01T12:30:05Z").is_some());
        assert!(parse_timestamp("2024-03-01T12:30:05+02:00").is_some());
        assert!(parse_timestamp("not a time").is_none());
    }

    #[test]
    fn lenient_timestamp_field_decoding() {
        let inst: Instance =
            serde_json::from_str(r#"{"instance_id": "a", "updated_at": "garbage"}"#).unwrap();
        assert!(inst.updated_at.is_none());
    }

    #[test]
    fn unknown_statuses_fall_back() {
        let inst: Instance =
            serde_json::from_str(r#"{"instance_id": "a", "overall_status": "exploded"}"#).unwrap();
        assert_eq!(inst.overall_status, InstanceStatus::Unknown);
        let pb: PlaybookResult = serde_json::from_str(r#"{"status": "??"}"#).unwrap();
        assert_eq!(pb.status, PlaybookStatus::Unknown);
    }

    #[test]
    fn groups_decode_as_strings_or_objects() {
        let inst: Instance = serde_json::from_str(
            r#"{"instance_id": "a", "groups": ["web", {"name": "db"}]}"#,
        )
        .unwrap();
        let names: Vec<_> = inst.groups.iter().map(|g| g.name()).collect();
        assert_eq!(names, vec!["web", "db"]);
    }

    #[test]
    fn detectors_decode_as_labels_or_named_objects() {
        let cfg: BackendConfig = serde_json::from_str(
            r#"{"detectors": ["static", {"name": "aws", "options": {"region": "eu-1"}}], "ui": false}"#,
        )
        .unwrap();
        assert_eq!(cfg.detectors[0].name(), "static");
        assert_eq!(cfg.detectors[1].name(), "aws");
        assert_eq!(
            cfg.detectors[1].options().unwrap().get("region").unwrap(),
            "eu-1"
        );
        assert!(!cfg.ui);
    }

    #[test]
    fn stats_tolerate_missing_counters() {
        let stats: Stats = serde_json::from_str(r#"{"total_instances": 5}"#).unwrap();
        assert_eq!(stats.total_instances, 5);
        assert_eq!(stats.failed, 0);
        assert!(stats.uptime_seconds.is_none());
    }
}
