// Versioned project docs

use crate::error::CacdError;
use crate::history::{self, HistoryAction};
use crate::notify::{ChangeKind, NotificationHub};
use crate::storage::{ProjectStore, StoreTxn};
use crate::types::{Doc, DocData, DocVersion, EntityKind, ProjectId};
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;

/// Insert a new doc together with its first version
pub(crate) fn insert_doc(
    txn: &StoreTxn<'_>,
    project: ProjectId,
    data: DocData,
    user_id: Option<&str>,
) -> Result<Doc> {
    let doc = Doc {
        id: txn.next_id(EntityKind::Docs)?,
        project_id: project,
        doc_type: data.doc_type.clone(),
        content: data.content.clone(),
        created_at: Utc::now(),
    };
    txn.put(&doc)?;
    txn.append_doc_version(project, doc.id, data, user_id.map(str::to_string))?;
    Ok(doc)
}

/// Docs with a version trail: every write appends a version
pub struct DocService {
    store: ProjectStore,
    hub: Arc<NotificationHub>,
}

impl DocService {
    pub fn new(store: ProjectStore, hub: Arc<NotificationHub>) -> Self {
        Self { store, hub }
    }

    pub fn create(
        &self,
        project: ProjectId,
        doc_type: &str,
        content: &str,
        user_id: Option<&str>,
    ) -> Result<Doc> {
        self.store.require_project(project)?;
        let data = DocData {
            doc_type: doc_type.to_string(),
            content: content.to_string(),
        };
        let doc = self
            .store
            .write(|txn| insert_doc(txn, project, data, user_id))?;

        tracing::info!(project_id = %project, doc_id = doc.id, "Created doc");
        self.hub.entity_changed(ChangeKind::Created, &doc);
        Ok(doc)
    }

    pub fn get(&self, project: ProjectId, doc_id: u64) -> Result<Doc> {
        self.store
            .get::<Doc>(Some(project), doc_id)?
            .ok_or_else(|| CacdError::not_found(format!("doc {}", doc_id)).into())
    }

    pub fn list(&self, project: ProjectId) -> Result<Vec<Doc>> {
        self.store.list(Some(project))
    }

    /// Change type and/or content, appending a version
    pub fn update(
        &self,
        project: ProjectId,
        doc_id: u64,
        doc_type: Option<&str>,
        content: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<Doc> {
        let mut doc = self.get(project, doc_id)?;
        if let Some(doc_type) = doc_type {
            doc.doc_type = doc_type.to_string();
        }
        if let Some(content) = content {
            doc.content = content.to_string();
        }

        self.store.write(|txn| {
            txn.put(&doc)?;
            txn.append_doc_version(project, doc_id, data_of(&doc), user_id.map(str::to_string))
        })?;

        self.hub.entity_changed(ChangeKind::Updated, &doc);
        Ok(doc)
    }

    pub fn delete(&self, project: ProjectId, doc_id: u64) -> Result<bool> {
        let removed = self.store.delete::<Doc>(Some(project), doc_id)?;
        if removed {
            self.hub
                .entity_deleted(EntityKind::Docs, Some(project), doc_id.into());
        }
        Ok(removed)
    }

    /// Versions of a doc, newest first
    pub fn versions(&self, project: ProjectId, doc_id: u64) -> Result<Vec<DocVersion>> {
        let versions = self.store.list_doc_versions(project, doc_id)?;
        if versions.is_empty() {
            // Distinguish "no such doc" from a doc that predates versioning
            self.get(project, doc_id)?;
        }
        Ok(versions)
    }

    /// Restore the data of `version` and record it as a new version
    pub fn rollback(
        &self,
        project: ProjectId,
        doc_id: u64,
        version: u32,
        user_id: Option<&str>,
    ) -> Result<Doc> {
        let target = self
            .store
            .get_doc_version(project, doc_id, version)?
            .ok_or_else(|| {
                CacdError::not_found(format!("version {} of doc {}", version, doc_id))
            })?;
        let mut doc = self.get(project, doc_id)?;
        doc.doc_type = target.data.doc_type.clone();
        doc.content = target.data.content.clone();

        self.store.write(|txn| {
            txn.put(&doc)?;
            txn.append_doc_version(project, doc_id, target.data.clone(), user_id.map(str::to_string))?;
            history::append(
                txn,
                project,
                user_id,
                HistoryAction::DocRollback { doc_id, version },
            )
        })?;

        tracing::info!(project_id = %project, doc_id, version, "Rolled back doc");
        self.hub.entity_changed(ChangeKind::Updated, &doc);
        Ok(doc)
    }
}

fn data_of(doc: &Doc) -> DocData {
    DocData {
        doc_type: doc.doc_type.clone(),
        content: doc.content.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::find_cacd_error;
    use tempfile::TempDir;

    fn service() -> (TempDir, ProjectStore, DocService, ProjectId) {
        let dir = TempDir::new().unwrap();
        let store = ProjectStore::new(dir.path().join("index.redb")).unwrap();
        let project = store.create_project("p", None, "o").unwrap();
        let docs = DocService::new(store.clone(), Arc::new(NotificationHub::new(8)));
        (dir, store, docs, project.id)
    }

    #[test]
    fn test_create_writes_first_version() {
        let (_dir, _store, docs, project) = service();
        let doc = docs.create(project, "readme", "hello", Some("u1")).unwrap();

        let versions = docs.versions(project, doc.id).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, 1);
        assert_eq!(versions[0].data.content, "hello");
        assert_eq!(versions[0].user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_update_and_rollback_append_versions() {
        let (_dir, store, docs, project) = service();
        let doc = docs.create(project, "readme", "v1", None).unwrap();
        docs.update(project, doc.id, None, Some("v2"), None).unwrap();

        let restored = docs.rollback(project, doc.id, 1, Some("u2")).unwrap();
        assert_eq!(restored.content, "v1");
        assert_eq!(docs.get(project, doc.id).unwrap().content, "v1");

        let numbers: Vec<u32> = docs
            .versions(project, doc.id)
            .unwrap()
            .iter()
            .map(|v| v.version)
            .collect();
        assert_eq!(numbers, vec![3, 2, 1]);

        let history: Vec<crate::types::HistoryEntry> = store.list(Some(project)).unwrap();
        assert_eq!(history.last().unwrap().action, "doc_rollback");
    }

    #[test]
    fn test_rollback_to_missing_version_is_not_found() {
        let (_dir, _store, docs, project) = service();
        let doc = docs.create(project, "readme", "v1", None).unwrap();

        let err = docs.rollback(project, doc.id, 9, None).unwrap_err();
        assert!(matches!(find_cacd_error(&err), Some(CacdError::NotFound(_))));

        let err = docs.versions(project, 999).unwrap_err();
        assert!(matches!(find_cacd_error(&err), Some(CacdError::NotFound(_))));
    }
}
