use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A stored record as an opaque JSON object
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Identifier of a project, assigned from a store sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub u64);

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ProjectId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Content-addressed blob hash (SHA-256)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobHash(pub String);

impl BlobHash {
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let hash = Sha256::digest(data);
        Self(hex::encode(hash))
    }
}

impl std::fmt::Display for BlobHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A project groups tasks, rules, templates, embeddings, docs and history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub description: Option<String>,
    pub origin: String,
    pub created_at: DateTime<Utc>,
}

/// Task lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Done,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => f.write_str("pending"),
            TaskStatus::Done => f.write_str("done"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub project_id: Option<ProjectId>,
    pub command: String,
    #[serde(default)]
    pub context: String,
    /// Rules applied when the task was created
    #[serde(default)]
    pub rules: Vec<serde_json::Value>,
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub project_id: Option<ProjectId>,
    #[serde(rename = "type")]
    pub rule_type: String,
    pub value: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: u64,
    pub project_id: Option<ProjectId>,
    pub name: String,
    pub repo_url: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub id: u64,
    pub project_id: ProjectId,
    #[serde(default)]
    pub task_id: Option<String>,
    pub model: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub description: Option<String>,
    pub entity_type: String,
    pub entity_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doc {
    pub id: u64,
    pub project_id: ProjectId,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Versioned payload of a doc
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocData {
    #[serde(rename = "type")]
    pub doc_type: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocVersion {
    pub doc_id: u64,
    pub project_id: ProjectId,
    pub version: u32,
    pub data: DocData,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A row of the per-project history trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: u64,
    pub project_id: ProjectId,
    pub user_id: Option<String>,
    pub action: String,
    #[serde(default)]
    pub details: serde_json::Value,
    #[serde(default)]
    pub diff: Option<serde_json::Value>,
    #[serde(default)]
    pub resolved_by: Option<String>,
    #[serde(default)]
    pub conflict_details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Saved context for a task id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub task_id: String,
    pub data: String,
    pub project_id: Option<ProjectId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(pub Uuid);

impl SnapshotId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index entry for a project archive kept in the blob store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub id: SnapshotId,
    pub project_id: ProjectId,
    pub archive: BlobHash,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub reason: String,
    pub counts: BTreeMap<EntityKind, usize>,
}

/// The record kinds carried by a project archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Tasks,
    Rules,
    Templates,
    Embeddings,
    Docs,
    History,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Tasks,
        EntityKind::Rules,
        EntityKind::Templates,
        EntityKind::Embeddings,
        EntityKind::Docs,
        EntityKind::History,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Tasks => "tasks",
            EntityKind::Rules => "rules",
            EntityKind::Templates => "templates",
            EntityKind::Embeddings => "embeddings",
            EntityKind::Docs => "docs",
            EntityKind::History => "history",
        }
    }

    /// Name of the JSON file holding this kind inside an archive
    pub fn file_name(self) -> &'static str {
        match self {
            EntityKind::Tasks => "tasks.json",
            EntityKind::Rules => "rules.json",
            EntityKind::Templates => "templates.json",
            EntityKind::Embeddings => "embeddings.json",
            EntityKind::Docs => "docs.json",
            EntityKind::History => "history.json",
        }
    }

    /// Check that `record` reads as this kind's typed model
    pub fn check_record(self, record: &Record) -> Result<(), serde_json::Error> {
        fn check<E: Entity>(record: &Record) -> Result<(), serde_json::Error> {
            serde_json::from_value::<E>(serde_json::Value::Object(record.clone())).map(drop)
        }
        match self {
            EntityKind::Tasks => check::<Task>(record),
            EntityKind::Rules => check::<Rule>(record),
            EntityKind::Templates => check::<Template>(record),
            EntityKind::Embeddings => check::<Embedding>(record),
            EntityKind::Docs => check::<Doc>(record),
            EntityKind::History => check::<HistoryEntry>(record),
        }
    }

    /// Whether ids of this kind come from a numeric sequence
    pub fn has_numeric_ids(self) -> bool {
        !matches!(self, EntityKind::Tasks | EntityKind::Rules)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown entity kind: {}", s))
    }
}

/// A typed record stored per project scope
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync {
    const KIND: EntityKind;

    /// Value of the identifying `id` field
    fn id_value(&self) -> serde_json::Value;

    /// Owning project, `None` for the global scope
    fn scope(&self) -> Option<ProjectId>;
}

impl Entity for Task {
    const KIND: EntityKind = EntityKind::Tasks;

    fn id_value(&self) -> serde_json::Value {
        self.id.clone().into()
    }

    fn scope(&self) -> Option<ProjectId> {
        self.project_id
    }
}

impl Entity for Rule {
    const KIND: EntityKind = EntityKind::Rules;

    fn id_value(&self) -> serde_json::Value {
        self.id.clone().into()
    }

    fn scope(&self) -> Option<ProjectId> {
        self.project_id
    }
}

impl Entity for Template {
    const KIND: EntityKind = EntityKind::Templates;

    fn id_value(&self) -> serde_json::Value {
        self.id.into()
    }

    fn scope(&self) -> Option<ProjectId> {
        self.project_id
    }
}

impl Entity for Embedding {
    const KIND: EntityKind = EntityKind::Embeddings;

    fn id_value(&self) -> serde_json::Value {
        self.id.into()
    }

    fn scope(&self) -> Option<ProjectId> {
        Some(self.project_id)
    }
}

impl Entity for Doc {
    const KIND: EntityKind = EntityKind::Docs;

    fn id_value(&self) -> serde_json::Value {
        self.id.into()
    }

    fn scope(&self) -> Option<ProjectId> {
        Some(self.project_id)
    }
}

impl Entity for HistoryEntry {
    const KIND: EntityKind = EntityKind::History;

    fn id_value(&self) -> serde_json::Value {
        self.id.into()
    }

    fn scope(&self) -> Option<ProjectId> {
        Some(self.project_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_round_trips_through_name() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
            assert!(kind.file_name().starts_with(kind.as_str()));
        }
        assert!("widgets".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_rule_serializes_type_field() {
        let rule = Rule {
            id: "r1".to_string(),
            project_id: Some(ProjectId(3)),
            rule_type: "priority".to_string(),
            value: "high".to_string(),
            description: None,
        };
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["type"], "priority");
        assert_eq!(json["project_id"], 3);
    }

    #[test]
    fn test_blob_hash_is_sha256_hex() {
        let hash = BlobHash::from_bytes(b"abc");
        assert_eq!(
            hash.0,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
