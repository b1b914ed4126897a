//! ActiveFlagMap and its stored-string codec.
//!
//! The flag store only understands opaque strings, so the map travels as a JSON object
//! `{ "<project id>": true | false, ... }`. `encode` and `decode` are the only place that
//! touches that format. `decode` never fails past this boundary: malformed input comes back
//! as [`Decoded::Malformed`] and callers fall back to an empty map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::project::Project;

/// Stored value meaning "no flags yet".
pub const EMPTY_MAP_JSON: &str = "{}";

/// Project id -> active flag. An absent key means "unknown", not `false`.
///
/// Ordered so that encoding is deterministic; order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActiveFlagMap(BTreeMap<String, bool>);

impl ActiveFlagMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, project_id: &str) -> Option<bool> {
        self.0.get(project_id).copied()
    }

    pub fn contains(&self, project_id: &str) -> bool {
        self.0.contains_key(project_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Copy of this map with `project_id` set to `value`. Every other entry is untouched.
    pub fn with_flag(&self, project_id: &str, value: bool) -> ActiveFlagMap {
        let mut next = self.clone();
        next.0.insert(project_id.to_string(), value);
        next
    }

    /// Inserts `false` for every project without an entry and returns the ids added.
    /// Existing entries, including ids no longer in `projects`, are never touched.
    pub fn fill_missing(&mut self, projects: &[Project]) -> Vec<String> {
        let mut added = Vec::new();
        for p in projects {
            if !self.0.contains_key(&p.id) {
                self.0.insert(p.id.clone(), false);
                added.push(p.id.clone());
            }
        }
        added
    }
}

impl FromIterator<(String, bool)> for ActiveFlagMap {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Outcome of decoding a stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Nothing stored yet (absent, empty or whitespace).
    Absent,
    Map(ActiveFlagMap),
    /// Content that is not a JSON object of booleans. Treat as an empty map.
    Malformed { reason: String },
}

impl Decoded {
    /// The map to continue with: the decoded map, or empty for absent and malformed input.
    pub fn into_map_or_empty(self) -> ActiveFlagMap {
        match self {
            Decoded::Map(map) => map,
            Decoded::Absent | Decoded::Malformed { .. } => ActiveFlagMap::new(),
        }
    }

    pub fn malformed_reason(&self) -> Option<&str> {
        match self {
            Decoded::Malformed { reason } => Some(reason),
            _ => None,
        }
    }
}

pub fn encode(map: &ActiveFlagMap) -> String {
    // A string -> bool map has no unserializable values.
    serde_json::to_string(map).unwrap_or_else(|_| EMPTY_MAP_JSON.to_string())
}

pub fn decode(raw: &str) -> Decoded {
    if raw.trim().is_empty() {
        return Decoded::Absent;
    }
    match serde_json::from_str::<ActiveFlagMap>(raw) {
        Ok(map) => Decoded::Map(map),
        Err(e) => Decoded::Malformed {
            reason: e.to_string(),
        },
    }
}

/// Decodes an optional stored value; `None` is the same as an empty slot.
pub fn decode_stored(raw: Option<&str>) -> Decoded {
    raw.map(decode).unwrap_or(Decoded::Absent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, bool)]) -> ActiveFlagMap {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn decode_object_of_booleans() {
        assert_eq!(
            decode(r#"{"A":true,"B":false}"#),
            Decoded::Map(map(&[("A", true), ("B", false)]))
        );
    }

    #[test]
    fn decode_empty_and_missing_are_absent() {
        assert_eq!(decode(""), Decoded::Absent);
        assert_eq!(decode("   \n"), Decoded::Absent);
        assert_eq!(decode_stored(None), Decoded::Absent);
        assert_eq!(decode(EMPTY_MAP_JSON), Decoded::Map(ActiveFlagMap::new()));
    }

    #[test]
    fn decode_rejects_non_maps() {
        let rejected = [
            "not json",
            "[true]",
            "42",
            "null",
            r#"{"A":"yes"}"#,
            r#"{"A":1}"#,
            r#"{"A":true"#,
        ];
        for raw in rejected {
            let d = decode(raw);
            assert!(d.malformed_reason().is_some(), "expected malformed for {raw:?}");
            assert!(d.into_map_or_empty().is_empty());
        }
    }

    #[test]
    fn encode_is_a_plain_json_object() {
        let m = map(&[("B", false), ("A", true)]);
        assert_eq!(encode(&m), r#"{"A":true,"B":false}"#);
        assert_eq!(encode(&ActiveFlagMap::new()), EMPTY_MAP_JSON);
    }

    #[test]
    fn with_flag_changes_only_one_key() {
        let before = map(&[("A", true), ("B", false), ("C", true)]);
        let after = before.with_flag("A", false);
        assert_eq!(after, map(&[("A", false), ("B", false), ("C", true)]));
        assert_eq!(before.get("A"), Some(true));
    }

    #[test]
    fn fill_missing_keeps_stale_ids() {
        let mut m = map(&[("A", true), ("gone", true)]);
        let added = m.fill_missing(&[Project::new("A", "Alpha"), Project::new("B", "Beta")]);
        assert_eq!(added, vec!["B".to_string()]);
        assert_eq!(m, map(&[("A", true), ("B", false), ("gone", true)]));
        assert!(m.fill_missing(&[Project::new("A", "Alpha")]).is_empty());
    }
}
