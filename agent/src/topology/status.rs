//! Strict parsing of the per-rank status snapshot reported by the native
//! monitor. A snapshot is either fully well-formed or rejected wholesale.

use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Reason a rank-status snapshot was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("snapshot is not an object")]
    NotAnObject,

    #[error("entry for rank `{0}` is not an object")]
    EntryNotAnObject(String),

    #[error("entry for rank `{rank}` is missing field `{field}`")]
    MissingField { rank: String, field: &'static str },

    #[error("field `{field}` for rank `{rank}` is not an integer")]
    NotAnInteger { rank: String, field: &'static str },
}

/// Process facts for a single monitored rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankEntry {
    pub pid: i64,
    pub status: i64,
    pub global_rank: i64,
}

/// Validated snapshot of every locally monitored rank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankStatus {
    entries: BTreeMap<String, RankEntry>,
}

impl RankStatus {
    /// Parse a raw subsystem snapshot, fail-closed.
    ///
    /// Accepts only a JSON object whose every value is an object carrying
    /// integer `pid`, `status`, and `global_rank`. Any deviation rejects
    /// the whole snapshot with a structured reason.
    pub fn parse(snapshot: &Value) -> Result<Self, SnapshotError> {
        let map = snapshot.as_object().ok_or(SnapshotError::NotAnObject)?;

        let mut entries = BTreeMap::new();
        for (rank, value) in map {
            let info = value
                .as_object()
                .ok_or_else(|| SnapshotError::EntryNotAnObject(rank.clone()))?;
            entries.insert(
                rank.clone(),
                RankEntry {
                    pid: int_field(info, rank, "pid")?,
                    status: int_field(info, rank, "status")?,
                    global_rank: int_field(info, rank, "global_rank")?,
                },
            );
        }

        Ok(Self { entries })
    }

    pub fn get(&self, rank: &str) -> Option<&RankEntry> {
        self.entries.get(rank)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RankEntry)> {
        self.entries.iter()
    }
}

fn int_field(
    info: &serde_json::Map<String, Value>,
    rank: &str,
    field: &'static str,
) -> Result<i64, SnapshotError> {
    let value = info.get(field).ok_or_else(|| SnapshotError::MissingField {
        rank: rank.to_string(),
        field,
    })?;
    value.as_i64().ok_or_else(|| SnapshotError::NotAnInteger {
        rank: rank.to_string(),
        field,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_snapshot() -> Value {
        json!({
            "1": {"pid": 100, "status": 0, "global_rank": 1},
            "2": {"pid": 200, "status": 1, "global_rank": 2},
        })
    }

    #[test]
    fn test_valid_snapshot_accepted() {
        let status = RankStatus::parse(&valid_snapshot()).unwrap();
        assert_eq!(status.len(), 2);
        assert_eq!(status.get("1").unwrap().pid, 100);
        assert_eq!(status.get("2").unwrap().global_rank, 2);
    }

    #[test]
    fn test_non_object_snapshot_rejected() {
        let err = RankStatus::parse(&json!([1, 2, 3])).unwrap_err();
        assert_eq!(err, SnapshotError::NotAnObject);
    }

    #[test]
    fn test_non_object_entry_rejected() {
        let err = RankStatus::parse(&json!({"rank1": [1, 2, 3]})).unwrap_err();
        assert_eq!(err, SnapshotError::EntryNotAnObject("rank1".to_string()));
    }

    #[test]
    fn test_missing_field_rejected() {
        let err = RankStatus::parse(&json!({"rank1": {"pid": 1, "status": 0}})).unwrap_err();
        assert_eq!(
            err,
            SnapshotError::MissingField {
                rank: "rank1".to_string(),
                field: "global_rank",
            }
        );
    }

    #[test]
    fn test_non_integer_fields_rejected() {
        for field in ["pid", "status", "global_rank"] {
            let mut entry = json!({"pid": 1, "status": 0, "global_rank": 1});
            entry[field] = json!("not_an_int");
            let err = RankStatus::parse(&json!({ "rank1": entry })).unwrap_err();
            assert_eq!(
                err,
                SnapshotError::NotAnInteger {
                    rank: "rank1".to_string(),
                    field,
                }
            );
        }
    }

    #[test]
    fn test_float_field_rejected() {
        let err =
            RankStatus::parse(&json!({"1": {"pid": 1.5, "status": 0, "global_rank": 1}}))
                .unwrap_err();
        assert!(matches!(err, SnapshotError::NotAnInteger { .. }));
    }

    #[test]
    fn test_validity_is_monotonic() {
        // Corrupting any single field flips a valid snapshot to invalid.
        assert!(RankStatus::parse(&valid_snapshot()).is_ok());

        for field in ["pid", "status", "global_rank"] {
            let mut snapshot = valid_snapshot();
            snapshot["1"][field] = json!(true);
            assert!(RankStatus::parse(&snapshot).is_err());

            let mut snapshot = valid_snapshot();
            snapshot["2"].as_object_mut().unwrap().remove(field);
            assert!(RankStatus::parse(&snapshot).is_err());
        }
    }

    #[test]
    fn test_empty_snapshot_is_valid() {
        let status = RankStatus::parse(&json!({})).unwrap();
        assert!(status.is_empty());
    }
}
