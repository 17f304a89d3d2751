// Diff-by-id reconciliation of record collections
//
// Given the records a project currently holds and the records arriving from
// an archive, partition the incoming side into added / updated / conflicted /
// skipped. The functions here never touch storage; the archive service decides
// what to write back.

use crate::types::Record;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Field used to match records when no other key is given
pub const DEFAULT_KEY: &str = "id";

/// Comparable form of a record's identifying value.
///
/// Integers order before strings, strings before anything else. `1` and `"1"`
/// are different keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordKey {
    Int(i64),
    Text(String),
    /// Any other JSON value, held as its canonical JSON text
    Other(String),
}

impl RecordKey {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s.clone()),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Other(n.to_string()),
            },
            other => Self::Other(other.to_string()),
        }
    }

    /// Key of `record` under field `key`, if present
    pub fn of(record: &Record, key: &str) -> Option<Self> {
        record.get(key).map(Self::from_value)
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Text(s) => Value::String(s.clone()),
            Self::Other(json) => {
                serde_json::from_str(json).unwrap_or_else(|_| Value::String(json.clone()))
            }
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{}", i),
            Self::Text(s) | Self::Other(s) => f.write_str(s),
        }
    }
}

impl Serialize for RecordKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Which input collection a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Current,
    Incoming,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Current => f.write_str("current"),
            Side::Incoming => f.write_str("incoming"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("{side} record at position {index} has no `{key}` field")]
    MissingKey {
        side: Side,
        index: usize,
        key: String,
    },
}

/// A key present on both sides with differing content
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    pub id: RecordKey,
    pub current: Record,
    pub incoming: Record,
    /// Names of the fields whose values differ, sorted
    pub fields: Vec<String>,
}

/// Partition of an incoming collection relative to a current one.
///
/// `updated` and `conflicted` are produced by the same condition: `updated`
/// holds the incoming value, `conflicted` holds both sides plus the changed
/// fields. Every group is ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reconciliation {
    pub added: Vec<Record>,
    pub updated: Vec<Record>,
    pub conflicted: Vec<Conflict>,
    pub skipped: Vec<Record>,
}

/// Group sizes of a reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub added: usize,
    pub updated: usize,
    pub conflicted: usize,
    pub skipped: usize,
}

/// What a merge persists from a reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Persist only `added`; differing records are left for manual resolution
    #[default]
    AddOnly,
    /// Persist `added` and overwrite with `updated`
    PreferIncoming,
}

impl std::str::FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add_only" => Ok(Self::AddOnly),
            "prefer_incoming" => Ok(Self::PreferIncoming),
            other => Err(format!("unknown merge strategy: {}", other)),
        }
    }
}

impl Reconciliation {
    pub fn summary(&self) -> ReconcileSummary {
        ReconcileSummary {
            added: self.added.len(),
            updated: self.updated.len(),
            conflicted: self.conflicted.len(),
            skipped: self.skipped.len(),
        }
    }

    /// True when the incoming side brings nothing new or different
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty()
    }

    /// Records to persist under `strategy`, in key order within each group
    pub fn write_back(&self, strategy: MergeStrategy) -> Vec<&Record> {
        match strategy {
            MergeStrategy::AddOnly => self.added.iter().collect(),
            MergeStrategy::PreferIncoming => {
                self.added.iter().chain(self.updated.iter()).collect()
            }
        }
    }
}

/// Reconcile `incoming` against `current`, matching records on field `key`.
///
/// Neither input is modified. If a collection repeats a key, its last
/// occurrence is the one considered.
pub fn reconcile(
    current: &[Record],
    incoming: &[Record],
    key: &str,
) -> Result<Reconciliation, ReconcileError> {
    let current_by_key = index_by_key(current, key, Side::Current)?;
    let incoming_by_key = index_by_key(incoming, key, Side::Incoming)?;

    let mut result = Reconciliation::default();
    for (id, record) in incoming_by_key {
        match current_by_key.get(&id) {
            None => result.added.push(record.clone()),
            Some(existing) if *existing == record => result.skipped.push((*existing).clone()),
            Some(existing) => {
                result.updated.push(record.clone());
                result.conflicted.push(Conflict {
                    fields: changed_fields(existing, record),
                    current: (*existing).clone(),
                    incoming: record.clone(),
                    id,
                });
            }
        }
    }

    Ok(result)
}

/// Reconcile on the default `id` field
pub fn reconcile_by_id(
    current: &[Record],
    incoming: &[Record],
) -> Result<Reconciliation, ReconcileError> {
    reconcile(current, incoming, DEFAULT_KEY)
}

fn index_by_key<'a>(
    records: &'a [Record],
    key: &str,
    side: Side,
) -> Result<BTreeMap<RecordKey, &'a Record>, ReconcileError> {
    let mut by_key = BTreeMap::new();
    for (index, record) in records.iter().enumerate() {
        let id = RecordKey::of(record, key).ok_or_else(|| ReconcileError::MissingKey {
            side,
            index,
            key: key.to_string(),
        })?;
        by_key.insert(id, record);
    }
    Ok(by_key)
}

fn changed_fields(current: &Record, incoming: &Record) -> Vec<String> {
    let mut fields: Vec<String> = current
        .keys()
        .chain(incoming.keys())
        .filter(|field| current.get(*field) != incoming.get(*field))
        .cloned()
        .collect();
    fields.sort();
    fields.dedup();
    fields
}
