//! Types for the checkpoint module.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// On-disk checkpoint document.
///
/// `processed_files` holds item keys (`<id>_<filename>`) confirmed present at
/// the destination. `last_sync` is kept as an opaque string so files written
/// with naive ISO timestamps still load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    #[serde(default)]
    pub processed_files: BTreeSet<String>,
    #[serde(default)]
    pub last_sync: Option<String>,
}

impl CheckpointState {
    pub fn contains(&self, key: &str) -> bool {
        self.processed_files.contains(key)
    }

    /// Record a key as synced. Returns `false` if it was already present.
    pub fn insert(&mut self, key: &str) -> bool {
        if self.processed_files.contains(key) {
            return false;
        }
        self.processed_files.insert(key.to_string())
    }

    pub fn len(&self) -> usize {
        self.processed_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed_files.is_empty()
    }

    /// Copy of this state stamped with a fresh `last_sync`.
    pub(crate) fn stamped(&self, now: DateTime<Utc>) -> Self {
        Self {
            processed_files: self.processed_files.clone(),
            last_sync: Some(now.to_rfc3339()),
        }
    }

    /// Parse `last_sync` when it is RFC 3339.
    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.last_sync
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_insert_is_idempotent() {
        let mut state = CheckpointState::default();
        assert!(state.insert("A_photo.jpg"));
        assert!(!state.insert("A_photo.jpg"));
        assert_eq!(state.len(), 1);
        assert!(state.contains("A_photo.jpg"));
    }

    #[test]
    fn test_deserialize_foreign_timestamp_format() {
        let json = r#"{
            "processed_files": ["1_a.jpg", "2_b.heic"],
            "last_sync": "2024-03-01T10:11:12.345678"
        }"#;
        let state: CheckpointState = serde_json::from_str(json).unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(
            state.last_sync.as_deref(),
            Some("2024-03-01T10:11:12.345678")
        );
        assert!(state.last_sync_at().is_none());
    }

    #[test]
    fn test_deserialize_missing_fields() {
        let state: CheckpointState = serde_json::from_str("{}").unwrap();
        assert!(state.is_empty());
        assert!(state.last_sync.is_none());
    }

    #[test]
    fn test_stamped_sets_rfc3339() {
        let mut state = CheckpointState::default();
        state.insert("k");
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 8, 30, 0).unwrap();
        let stamped = state.stamped(now);
        assert_eq!(stamped.last_sync_at(), Some(now));
        assert!(stamped.contains("k"));
    }

    #[test]
    fn test_serialized_field_names() {
        let mut state = CheckpointState::default();
        state.insert("b");
        state.insert("a");
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["processed_files"], serde_json::json!(["a", "b"]));
        assert!(value.get("last_sync").is_some());
    }
}
