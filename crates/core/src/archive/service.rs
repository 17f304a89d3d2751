use super::ProjectArchive;
use crate::error::CacdError;
use crate::history::{self, HistoryAction};
use crate::memory_bank::MemoryBank;
use crate::notify::NotificationHub;
use crate::reconcile::{reconcile_by_id, MergeStrategy, ReconcileSummary, Reconciliation};
use crate::storage::{ArchiveStore, ProjectStore};
use crate::types::{EntityKind, Project, ProjectId, Record, SnapshotId, SnapshotMeta};
use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// An archive written to the export directory
#[derive(Debug, Clone)]
pub struct ExportedArchive {
    pub project_id: ProjectId,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MergeOptions {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub strategy: MergeStrategy,
}

/// Outcome of a merge: the per-kind diff and, unless dry run, what was written
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub project_id: ProjectId,
    pub dry_run: bool,
    pub strategy: MergeStrategy,
    pub diff: BTreeMap<EntityKind, Reconciliation>,
    pub applied: BTreeMap<EntityKind, usize>,
}

impl MergeReport {
    pub fn summary(&self) -> BTreeMap<EntityKind, ReconcileSummary> {
        self.diff
            .iter()
            .map(|(kind, reconciliation)| (*kind, reconciliation.summary()))
            .collect()
    }

    pub fn is_noop(&self) -> bool {
        self.diff.values().all(Reconciliation::is_noop)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    pub project_id: ProjectId,
    pub snapshot_id: SnapshotId,
    pub restored: BTreeMap<EntityKind, usize>,
}

/// Export, import, merge, snapshot and rollback of whole projects
pub struct ArchiveService {
    store: ProjectStore,
    archives: Arc<dyn ArchiveStore>,
    export_dir: PathBuf,
    hub: Arc<NotificationHub>,
}

impl ArchiveService {
    pub fn new(
        store: ProjectStore,
        archives: Arc<dyn ArchiveStore>,
        export_dir: PathBuf,
        hub: Arc<NotificationHub>,
    ) -> Self {
        Self {
            store,
            archives,
            export_dir,
            hub,
        }
    }

    /// Current content of a project as an archive
    pub fn build_archive(&self, project: &Project) -> Result<ProjectArchive> {
        let mut records = BTreeMap::new();
        for kind in EntityKind::ALL {
            records.insert(kind, self.store.list_records(kind, Some(project.id))?);
        }
        Ok(ProjectArchive {
            manifest: Some(super::ArchiveManifest::for_project(project)),
            records,
        })
    }

    /// Write `<export_dir>/<project>/export_<timestamp>.zip`
    pub async fn export(&self, project_id: ProjectId, user_id: Option<&str>) -> Result<ExportedArchive> {
        let project = self.store.require_project(project_id)?;
        let bytes = self.build_archive(&project)?.to_zip()?;

        let dir = self.export_dir.join(project_id.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .context("Failed to create export directory")?;
        let path = dir.join(format!("export_{}.zip", Utc::now().format("%Y-%m-%d_%H-%M")));
        tokio::fs::write(&path, &bytes)
            .await
            .context("Failed to write export archive")?;

        let archive_path = path.display().to_string();
        self.store.write(|txn| {
            history::append(
                txn,
                project_id,
                user_id,
                HistoryAction::Export {
                    archive_path: archive_path.clone(),
                },
            )
        })?;

        tracing::info!(project_id = %project_id, path = %archive_path, size = bytes.len(), "Exported project");
        self.hub
            .message(format!("Project {} exported to {}", project.name, archive_path));

        Ok(ExportedArchive {
            project_id,
            path,
            bytes,
        })
    }

    /// Create a new project at `new_origin` holding the archive's records
    pub fn import(
        &self,
        bytes: &[u8],
        new_origin: &str,
        new_name: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<Project> {
        let archive = ProjectArchive::from_zip(bytes)?;
        let description = archive.manifest.as_ref().and_then(|m| m.description.clone());
        let source_origin = archive.manifest.as_ref().map(|m| m.origin.clone());
        let name = new_name.unwrap_or(new_origin);

        if self.store.find_project_by_origin(new_origin)?.is_some() {
            return Err(CacdError::conflict(format!("project origin '{}'", new_origin)).into());
        }

        let project = self.store.write(|txn| {
            let project = txn.create_project(name, description, new_origin, false)?;
            let archive = archive.rehomed(project.id);
            archive.validate()?;

            let mut inserted = 0;
            for kind in EntityKind::ALL {
                for record in archive.records(kind) {
                    txn.put_record(kind, Some(project.id), record)?;
                    inserted += 1;
                }
            }

            history::append(
                txn,
                project.id,
                user_id,
                HistoryAction::Import {
                    source_origin,
                    records: inserted,
                },
            )?;
            Ok(project)
        })?;

        self.hub.message(format!(
            "Project {} imported at {}",
            project.name, project.origin
        ));
        Ok(project)
    }

    /// Reconcile an archive against a project and apply the strategy's write-back
    pub fn merge(
        &self,
        project_id: ProjectId,
        bytes: &[u8],
        options: MergeOptions,
        user_id: Option<&str>,
    ) -> Result<MergeReport> {
        let project = self.store.require_project(project_id)?;
        let incoming = ProjectArchive::from_zip(bytes)?.rehomed(project_id);
        incoming.validate()?;

        if options.dry_run {
            let diff = diff_archive(&incoming, |kind| {
                self.store.list_records(kind, Some(project_id))
            })?;
            return Ok(MergeReport {
                project_id,
                dry_run: true,
                strategy: options.strategy,
                diff,
                applied: BTreeMap::new(),
            });
        }

        let report = self.store.write(|txn| {
            let diff = diff_archive(&incoming, |kind| txn.list_records(kind, Some(project_id)))?;

            let mut applied = BTreeMap::new();
            for (kind, reconciliation) in &diff {
                let records = reconciliation.write_back(options.strategy);
                for record in &records {
                    txn.put_record(*kind, Some(project_id), record)?;
                }
                applied.insert(*kind, records.len());
            }

            let report = MergeReport {
                project_id,
                dry_run: false,
                strategy: options.strategy,
                diff,
                applied,
            };
            let summary = report.summary();
            history::append_merge(
                txn,
                project_id,
                user_id,
                HistoryAction::Merge {
                    strategy: options.strategy,
                    summary: summary.clone(),
                },
                serde_json::to_value(&summary)?,
                conflict_details(&report.diff),
            )?;
            Ok(report)
        })?;

        tracing::info!(
            project_id = %project_id,
            strategy = ?options.strategy,
            applied = report.applied.values().sum::<usize>(),
            "Merged archive"
        );
        self.hub
            .message(format!("Archive merged into project {}", project.name));
        Ok(report)
    }

    /// Dry-run merge
    pub fn preview_merge(&self, project_id: ProjectId, bytes: &[u8]) -> Result<MergeReport> {
        self.merge(
            project_id,
            bytes,
            MergeOptions {
                dry_run: true,
                strategy: MergeStrategy::default(),
            },
            None,
        )
    }

    /// Store the project's current archive in the blob store
    pub async fn snapshot(
        &self,
        project_id: ProjectId,
        user_id: Option<&str>,
        reason: &str,
    ) -> Result<SnapshotMeta> {
        let project = self.store.require_project(project_id)?;
        let archive = self.build_archive(&project)?;
        let bytes = archive.to_zip()?;
        let size = bytes.len() as u64;
        let hash = self.archives.put(project_id, Bytes::from(bytes)).await?;

        let meta = SnapshotMeta {
            id: SnapshotId::new(),
            project_id,
            archive: hash,
            size,
            created_at: Utc::now(),
            created_by: user_id.map(str::to_string),
            reason: reason.to_string(),
            counts: archive.counts(),
        };
        self.store.write(|txn| {
            txn.put_snapshot(&meta)?;
            history::append(
                txn,
                project_id,
                user_id,
                HistoryAction::Snapshot {
                    snapshot_id: meta.id,
                    reason: reason.to_string(),
                },
            )
        })?;

        tracing::info!(project_id = %project_id, snapshot_id = %meta.id, size, "Snapshot taken");
        Ok(meta)
    }

    pub fn list_snapshots(&self, project_id: ProjectId) -> Result<Vec<SnapshotMeta>> {
        self.store.require_project(project_id)?;
        self.store.list_snapshots(project_id)
    }

    /// Replace every kind except history with the snapshot's content
    pub async fn rollback(
        &self,
        project_id: ProjectId,
        snapshot_id: SnapshotId,
        user_id: Option<&str>,
    ) -> Result<RollbackReport> {
        let project = self.store.require_project(project_id)?;
        let meta = self
            .store
            .get_snapshot(&snapshot_id)?
            .filter(|meta| meta.project_id == project_id)
            .ok_or_else(|| CacdError::not_found(format!("snapshot {}", snapshot_id)))?;
        let bytes = self
            .archives
            .get(project_id, &meta.archive)
            .await?
            .ok_or_else(|| CacdError::not_found(format!("archive of snapshot {}", snapshot_id)))?;
        let archive = ProjectArchive::from_zip(&bytes)?.rehomed(project_id);
        archive.validate()?;

        let restored = self.store.write(|txn| {
            let mut restored = BTreeMap::new();
            for kind in EntityKind::ALL {
                if kind == EntityKind::History {
                    continue;
                }
                txn.clear_scope(kind, Some(project_id))?;
                for record in archive.records(kind) {
                    txn.put_record(kind, Some(project_id), record)?;
                }
                restored.insert(kind, archive.records(kind).len());
            }
            history::append(
                txn,
                project_id,
                user_id,
                HistoryAction::Rollback { snapshot_id },
            )?;
            Ok(restored)
        })?;

        tracing::info!(project_id = %project_id, snapshot_id = %snapshot_id, "Rolled back project");
        self.hub.message(format!(
            "Project {} rolled back to snapshot {}",
            project.name, snapshot_id
        ));

        Ok(RollbackReport {
            project_id,
            snapshot_id,
            restored,
        })
    }

    /// Snapshot a release and log it to the memory bank
    pub async fn release(
        &self,
        project_id: ProjectId,
        version: Option<&str>,
        user_id: Option<&str>,
        bank: &MemoryBank,
    ) -> Result<SnapshotMeta> {
        let label = version.unwrap_or("unversioned");
        let meta = self
            .snapshot(project_id, user_id, &format!("release {}", label))
            .await?;
        self.store.write(|txn| {
            history::append(
                txn,
                project_id,
                user_id,
                HistoryAction::Release {
                    version: version.map(str::to_string),
                    snapshot_id: meta.id,
                },
            )
        })?;

        let line = format!("Release {} of project {} (snapshot {})", label, project_id, meta.id);
        bank.append_audit(user_id, &line)?;
        bank.append_changelog(&format!("release: {}", line))?;
        self.hub.message(line);
        Ok(meta)
    }

    /// Snapshot the completion of an epic and log it to the memory bank
    pub async fn complete_epic(
        &self,
        project_id: ProjectId,
        epic_id: &str,
        user_id: Option<&str>,
        bank: &MemoryBank,
    ) -> Result<SnapshotMeta> {
        let meta = self
            .snapshot(project_id, user_id, &format!("epic {} completed", epic_id))
            .await?;
        self.store.write(|txn| {
            history::append(
                txn,
                project_id,
                user_id,
                HistoryAction::EpicCompleted {
                    epic_id: epic_id.to_string(),
                    snapshot_id: meta.id,
                },
            )
        })?;

        let line = format!(
            "Epic {} completed in project {} (snapshot {})",
            epic_id, project_id, meta.id
        );
        bank.append_audit(user_id, &line)?;
        bank.append_changelog(&format!("epic: {}", line))?;
        self.hub.message(line);
        Ok(meta)
    }
}

fn diff_archive(
    incoming: &ProjectArchive,
    mut current: impl FnMut(EntityKind) -> Result<Vec<Record>>,
) -> Result<BTreeMap<EntityKind, Reconciliation>> {
    let mut diff = BTreeMap::new();
    for kind in EntityKind::ALL {
        let existing = current(kind)?;
        let reconciliation = reconcile_by_id(&existing, incoming.records(kind))
            .with_context(|| format!("Failed to reconcile {}", kind))?;
        diff.insert(kind, reconciliation);
    }
    Ok(diff)
}

/// Ids and differing fields of every conflict, per kind
fn conflict_details(diff: &BTreeMap<EntityKind, Reconciliation>) -> serde_json::Value {
    let details: serde_json::Map<String, serde_json::Value> = diff
        .iter()
        .filter(|(_, reconciliation)| !reconciliation.conflicted.is_empty())
        .map(|(kind, reconciliation)| {
            let conflicts: Vec<serde_json::Value> = reconciliation
                .conflicted
                .iter()
                .map(|conflict| json!({ "id": conflict.id, "fields": conflict.fields }))
                .collect();
            (kind.to_string(), serde_json::Value::Array(conflicts))
        })
        .collect();
    serde_json::Value::Object(details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::find_cacd_error;
    use crate::storage::FilesystemArchiveStore;
    use crate::types::{HistoryEntry, Task, TaskStatus};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: ProjectStore,
        service: ArchiveService,
        bank: MemoryBank,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = ProjectStore::new(dir.path().join("index.redb")).unwrap();
        let archives = FilesystemArchiveStore::new(dir.path().join("blobs")).unwrap();
        let service = ArchiveService::new(
            store.clone(),
            Arc::new(archives),
            dir.path().join("archive"),
            Arc::new(NotificationHub::new(16)),
        );
        let bank = MemoryBank::new(dir.path().join("memory-bank"));
        Fixture {
            _dir: dir,
            store,
            service,
            bank,
        }
    }

    fn task(id: &str, project: ProjectId, command: &str) -> Task {
        Task {
            id: id.to_string(),
            project_id: Some(project),
            command: command.to_string(),
            context: String::new(),
            rules: Vec::new(),
            status: TaskStatus::Pending,
            result: None,
        }
    }

    fn history_actions(store: &ProjectStore, project: ProjectId) -> Vec<String> {
        store
            .list::<HistoryEntry>(Some(project))
            .unwrap()
            .into_iter()
            .map(|entry| entry.action)
            .collect()
    }

    #[tokio::test]
    async fn test_export_import_then_merge_is_noop() {
        let f = fixture();
        let source = f.store.create_project("src", Some("d".into()), "git@src").unwrap();
        f.store.put(&task("t1", source.id, "build")).unwrap();

        let exported = f.service.export(source.id, Some("alice")).await.unwrap();
        assert!(exported.path.exists());
        assert!(exported
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("export_"));

        let imported = f
            .service
            .import(&exported.bytes, "git@copy", None, None)
            .unwrap();
        assert_eq!(imported.name, "git@copy");
        assert_eq!(imported.description.as_deref(), Some("d"));
        let tasks: Vec<Task> = f.store.list(Some(imported.id)).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].project_id, Some(imported.id));

        // Re-export of the imported project merged back holds nothing new
        let again = f.service.build_archive(&imported).unwrap().to_zip().unwrap();
        let report = f
            .service
            .merge(imported.id, &again, MergeOptions::default(), None)
            .unwrap();
        assert!(report.is_noop());
        assert_eq!(report.summary()[&EntityKind::Tasks].skipped, 1);
    }

    #[tokio::test]
    async fn test_import_with_existing_origin_conflicts() {
        let f = fixture();
        let project = f.store.create_project("p", None, "git@p").unwrap();
        let bytes = f.service.build_archive(&project).unwrap().to_zip().unwrap();

        let err = f.service.import(&bytes, "git@p", Some("other"), None).unwrap_err();
        assert!(matches!(find_cacd_error(&err), Some(CacdError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_merge_respects_strategy() {
        let f = fixture();
        let project = f.store.create_project("p", None, "git@p").unwrap();
        f.store.put(&task("t1", project.id, "build")).unwrap();

        let mut archive = f.service.build_archive(&project).unwrap();
        let tasks = archive.records.get_mut(&EntityKind::Tasks).unwrap();
        tasks[0].insert("command".into(), "deploy".into());
        let mut added = tasks[0].clone();
        added.insert("id".into(), "t2".into());
        tasks.push(added);
        let bytes = archive.to_zip().unwrap();

        let preview = f.service.preview_merge(project.id, &bytes).unwrap();
        assert!(preview.dry_run);
        assert_eq!(preview.diff[&EntityKind::Tasks].conflicted[0].fields, vec!["command"]);
        assert_eq!(f.store.list::<Task>(Some(project.id)).unwrap().len(), 1);

        let report = f
            .service
            .merge(project.id, &bytes, MergeOptions::default(), Some("bob"))
            .unwrap();
        assert_eq!(report.applied[&EntityKind::Tasks], 1);
        let t1: Task = f.store.get(Some(project.id), "t1").unwrap().unwrap();
        assert_eq!(t1.command, "build");

        let report = f
            .service
            .merge(
                project.id,
                &bytes,
                MergeOptions {
                    dry_run: false,
                    strategy: MergeStrategy::PreferIncoming,
                },
                None,
            )
            .unwrap();
        assert_eq!(report.applied[&EntityKind::Tasks], 1);
        let t1: Task = f.store.get(Some(project.id), "t1").unwrap().unwrap();
        assert_eq!(t1.command, "deploy");

        let history: Vec<HistoryEntry> = f.store.list(Some(project.id)).unwrap();
        let first_merge = history.iter().find(|h| h.action == "merge").unwrap();
        assert_eq!(first_merge.user_id.as_deref(), Some("bob"));
        assert_eq!(
            first_merge.conflict_details.as_ref().unwrap()["tasks"][0]["id"],
            "t1"
        );
    }

    fn tasks_zip(json: &str) -> Vec<u8> {
        crate::archive::bundle::write_zip(vec![crate::archive::BundleEntry::new("tasks.json", json)])
            .unwrap()
    }

    fn assert_invalid_input(err: &anyhow::Error, needle: &str) {
        assert!(matches!(find_cacd_error(err), Some(CacdError::InvalidInput(_))));
        assert!(err.to_string().contains(needle), "{}", err);
    }

    #[tokio::test]
    async fn test_merge_rejects_records_without_id() {
        let f = fixture();
        let project = f.store.create_project("p", None, "git@p").unwrap();
        let bytes = tasks_zip(r#"[{"command": "x", "status": "pending"}]"#);

        let err = f
            .service
            .merge(project.id, &bytes, MergeOptions::default(), None)
            .unwrap_err();
        assert_invalid_input(&err, "tasks.json entry 0");
    }

    #[tokio::test]
    async fn test_merge_with_integer_id_leaves_string_id_task_alone() {
        let f = fixture();
        let project = f.store.create_project("p", None, "git@p").unwrap();
        f.store.put(&task("1", project.id, "keep-me")).unwrap();
        let bytes = tasks_zip(r#"[{"id": 1, "command": "intruder", "status": "pending"}]"#);

        for dry_run in [true, false] {
            let options = MergeOptions {
                dry_run,
                strategy: MergeStrategy::AddOnly,
            };
            let err = f.service.merge(project.id, &bytes, options, None).unwrap_err();
            assert_invalid_input(&err, "tasks.json entry 0");
        }

        let tasks: Vec<Task> = f.store.list(Some(project.id)).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].command, "keep-me");
        assert!(history_actions(&f.store, project.id).is_empty());
    }

    #[tokio::test]
    async fn test_merge_of_raw_integer_key_adds_a_separate_row() {
        let f = fixture();
        let project = f.store.create_project("p", None, "git@p").unwrap();
        f.store.put(&task("1", project.id, "keep-me")).unwrap();

        let mut record = match serde_json::to_value(task("1", project.id, "intruder")).unwrap() {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        record.insert("id".into(), 1.into());

        let current = f.store.list_records(EntityKind::Tasks, Some(project.id)).unwrap();
        let diff = reconcile_by_id(&current, &[record]).unwrap();
        assert_eq!(diff.summary().added, 1);

        f.store
            .write(|txn| {
                for added in diff.write_back(MergeStrategy::AddOnly) {
                    txn.put_record(EntityKind::Tasks, Some(project.id), added)?;
                }
                Ok(())
            })
            .unwrap();

        let stored = f.store.list_records(EntityKind::Tasks, Some(project.id)).unwrap();
        assert_eq!(stored.len(), 2);
        let kept: Task = f.store.get(Some(project.id), "1").unwrap().unwrap();
        assert_eq!(kept.command, "keep-me");
    }

    #[tokio::test]
    async fn test_import_rejects_records_that_break_the_model() {
        let f = fixture();
        let bytes = tasks_zip(r#"[{"id": "t1"}]"#);

        let err = f.service.import(&bytes, "git@new", None, None).unwrap_err();
        assert_invalid_input(&err, "tasks.json entry 0");
        assert!(f.store.find_project_by_origin("git@new").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_then_rollback_restores_records() {
        let f = fixture();
        let project = f.store.create_project("p", None, "git@p").unwrap();
        f.store.put(&task("t1", project.id, "build")).unwrap();

        let meta = f.service.snapshot(project.id, None, "manual").await.unwrap();
        assert_eq!(meta.counts[&EntityKind::Tasks], 1);

        f.store.delete::<Task>(Some(project.id), "t1").unwrap();
        f.store.put(&task("t9", project.id, "stray")).unwrap();

        let report = f.service.rollback(project.id, meta.id, Some("carol")).await.unwrap();
        assert_eq!(report.restored[&EntityKind::Tasks], 1);
        assert!(!report.restored.contains_key(&EntityKind::History));

        let ids: Vec<String> = f
            .store
            .list::<Task>(Some(project.id))
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["t1"]);
        assert_eq!(history_actions(&f.store, project.id), vec!["snapshot", "rollback"]);
        assert_eq!(f.service.list_snapshots(project.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_index_and_history_commit_together() {
        let f = fixture();
        let project = f.store.create_project("p", None, "git@p").unwrap();
        let meta = SnapshotMeta {
            id: SnapshotId::new(),
            project_id: project.id,
            archive: crate::types::BlobHash::from_bytes(b"zip"),
            size: 3,
            created_at: Utc::now(),
            created_by: None,
            reason: "manual".to_string(),
            counts: BTreeMap::new(),
        };

        let result: Result<()> = f.store.write(|txn| {
            txn.put_snapshot(&meta)?;
            anyhow::bail!("history write failed")
        });
        assert!(result.is_err());
        assert!(f.store.get_snapshot(&meta.id).unwrap().is_none());

        let taken = f.service.snapshot(project.id, None, "manual").await.unwrap();
        assert!(f.store.get_snapshot(&taken.id).unwrap().is_some());
        assert_eq!(history_actions(&f.store, project.id), vec!["snapshot"]);
    }

    #[tokio::test]
    async fn test_rollback_to_foreign_snapshot_is_not_found() {
        let f = fixture();
        let a = f.store.create_project("a", None, "o-a").unwrap();
        let b = f.store.create_project("b", None, "o-b").unwrap();
        let meta = f.service.snapshot(a.id, None, "manual").await.unwrap();

        let err = f.service.rollback(b.id, meta.id, None).await.unwrap_err();
        assert!(matches!(find_cacd_error(&err), Some(CacdError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_release_logs_to_memory_bank() {
        let f = fixture();
        let project = f.store.create_project("p", None, "git@p").unwrap();

        let meta = f
            .service
            .release(project.id, Some("1.2.0"), Some("dave"), &f.bank)
            .await
            .unwrap();
        assert_eq!(meta.reason, "release 1.2.0");

        let audit = f.bank.read_text("auditLog.md").unwrap();
        assert!(audit.contains("[dave] Release 1.2.0"));
        let changelog = f.bank.read_text("CHANGELOG.md").unwrap();
        assert!(changelog.contains("release: Release 1.2.0"));
        assert_eq!(history_actions(&f.store, project.id), vec!["snapshot", "release"]);
    }
}
