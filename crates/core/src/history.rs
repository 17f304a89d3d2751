// Per-project history trail

use crate::reconcile::{MergeStrategy, ReconcileSummary};
use crate::storage::StoreTxn;
use crate::types::{EntityKind, HistoryEntry, ProjectId, SnapshotId};
use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Actions recorded in a project's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryAction {
    CreateProject {
        name: String,
        origin: String,
    },
    Export {
        archive_path: String,
    },
    Import {
        source_origin: Option<String>,
        records: usize,
    },
    Merge {
        strategy: MergeStrategy,
        summary: BTreeMap<EntityKind, ReconcileSummary>,
    },
    Snapshot {
        snapshot_id: SnapshotId,
        reason: String,
    },
    Rollback {
        snapshot_id: SnapshotId,
    },
    DocRollback {
        doc_id: u64,
        version: u32,
    },
    TaskCreated {
        task_id: String,
    },
    TaskCompleted {
        task_id: String,
    },
    Release {
        version: Option<String>,
        snapshot_id: SnapshotId,
    },
    EpicCompleted {
        epic_id: String,
        snapshot_id: SnapshotId,
    },
}

impl HistoryAction {
    /// Value stored in the entry's `action` column
    pub fn name(&self) -> &'static str {
        match self {
            HistoryAction::CreateProject { .. } => "create_project",
            HistoryAction::Export { .. } => "export",
            HistoryAction::Import { .. } => "import",
            HistoryAction::Merge { .. } => "merge",
            HistoryAction::Snapshot { .. } => "snapshot",
            HistoryAction::Rollback { .. } => "rollback",
            HistoryAction::DocRollback { .. } => "doc_rollback",
            HistoryAction::TaskCreated { .. } => "task_created",
            HistoryAction::TaskCompleted { .. } => "task_completed",
            HistoryAction::Release { .. } => "release",
            HistoryAction::EpicCompleted { .. } => "epic_completed",
        }
    }
}

/// Append a history entry inside an open transaction
pub fn append(
    txn: &StoreTxn<'_>,
    project: ProjectId,
    user_id: Option<&str>,
    action: HistoryAction,
) -> Result<HistoryEntry> {
    append_entry(txn, project, user_id, action, None, None)
}

/// Append a merge entry carrying the diff and conflict details
pub fn append_merge(
    txn: &StoreTxn<'_>,
    project: ProjectId,
    user_id: Option<&str>,
    action: HistoryAction,
    diff: serde_json::Value,
    conflict_details: serde_json::Value,
) -> Result<HistoryEntry> {
    append_entry(
        txn,
        project,
        user_id,
        action,
        Some(diff),
        Some(conflict_details),
    )
}

fn append_entry(
    txn: &StoreTxn<'_>,
    project: ProjectId,
    user_id: Option<&str>,
    action: HistoryAction,
    diff: Option<serde_json::Value>,
    conflict_details: Option<serde_json::Value>,
) -> Result<HistoryEntry> {
    let entry = HistoryEntry {
        id: txn.next_id(EntityKind::History)?,
        project_id: project,
        user_id: user_id.map(str::to_string),
        action: action.name().to_string(),
        details: serde_json::to_value(&action)?,
        diff,
        resolved_by: None,
        conflict_details,
        created_at: Utc::now(),
    };
    txn.put(&entry)?;

    tracing::info!(
        project_id = %project,
        action = %entry.action,
        user = user_id.unwrap_or("system"),
        "History recorded"
    );
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ProjectStore;
    use tempfile::TempDir;

    #[test]
    fn test_append_assigns_sequential_ids() {
        let dir = TempDir::new().unwrap();
        let store = ProjectStore::new(dir.path().join("index.redb")).unwrap();
        let project = store.create_project("p", None, "o").unwrap();

        let first = store
            .write(|txn| {
                append(
                    txn,
                    project.id,
                    Some("alice"),
                    HistoryAction::Export {
                        archive_path: "archive/1/export.zip".to_string(),
                    },
                )
            })
            .unwrap();
        let second = store
            .write(|txn| {
                append(
                    txn,
                    project.id,
                    None,
                    HistoryAction::TaskCreated {
                        task_id: "t1".to_string(),
                    },
                )
            })
            .unwrap();

        assert_eq!(second.id, first.id + 1);
        assert_eq!(first.action, "export");
        assert_eq!(first.details["archive_path"], "archive/1/export.zip");
        assert_eq!(first.user_id.as_deref(), Some("alice"));

        let history: Vec<HistoryEntry> = store.list(Some(project.id)).unwrap();
        assert_eq!(history.len(), 2);
    }
}
