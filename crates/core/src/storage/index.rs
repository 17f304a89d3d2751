use crate::error::CacdError;
use crate::reconcile::{RecordKey, DEFAULT_KEY};
use crate::types::{
    ContextEntry, DocVersion, Entity, EntityKind, Project, ProjectId, Record, Rule,
    SnapshotId, SnapshotMeta, Template,
};
use anyhow::{Context, Result};
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use std::path::PathBuf;
use std::sync::Arc;

const PROJECTS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("projects");
const TASKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");
const RULES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("rules");
const TEMPLATES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("templates");
const EMBEDDINGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("embeddings");
const DOCS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("docs");
const HISTORY_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("history");
const DOC_VERSIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("doc_versions");
const CONTEXT_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("context");
const SNAPSHOTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("snapshots");
const SEQUENCES_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequences");

const PROJECTS_SEQUENCE: &str = "projects";
const SEEDED_MARKER: &str = "seeded_defaults";

fn entity_table(kind: EntityKind) -> TableDefinition<'static, &'static str, &'static [u8]> {
    match kind {
        EntityKind::Tasks => TASKS_TABLE,
        EntityKind::Rules => RULES_TABLE,
        EntityKind::Templates => TEMPLATES_TABLE,
        EntityKind::Embeddings => EMBEDDINGS_TABLE,
        EntityKind::Docs => DOCS_TABLE,
        EntityKind::History => HISTORY_TABLE,
    }
}

/// Key prefix of a scope: one per project plus the global scope
fn scope_prefix(scope: Option<ProjectId>) -> String {
    match scope {
        Some(project) => format!("p{:020}/", project.0),
        None => "global/".to_string(),
    }
}

/// Half-open key range covering every key of a prefix ending in `/`
fn prefix_range(prefix: &str) -> (String, String) {
    // '0' is the byte right after '/'
    let end = format!("{}0", prefix.trim_end_matches('/'));
    (prefix.to_string(), end)
}

/// `<scope>/<tag>:<id>`; the tag keeps `1`, `"1"` and `true` on distinct rows
fn record_storage_key(scope: Option<ProjectId>, id: &RecordKey) -> String {
    let prefix = scope_prefix(scope);
    match id {
        RecordKey::Int(n) => format!("{}i:{}", prefix, n),
        RecordKey::Text(s) => format!("{}s:{}", prefix, s),
        RecordKey::Other(json) => format!("{}j:{}", prefix, json),
    }
}

fn doc_versions_prefix(project: ProjectId, doc_id: u64) -> String {
    format!("{}{:020}/", scope_prefix(Some(project)), doc_id)
}

fn record_id(record: &Record) -> Result<RecordKey> {
    RecordKey::of(record, DEFAULT_KEY)
        .ok_or_else(|| CacdError::invalid("record has no `id` field"))
        .map_err(Into::into)
}

fn scan_prefix<T>(table: &T, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let (start, end) = prefix_range(prefix);
    let mut rows = Vec::new();
    for item in table
        .range(start.as_str()..end.as_str())
        .context("Failed to scan table range")?
    {
        let (key, value) = item.context("Failed to read item")?;
        rows.push((key.value().to_string(), value.value().to_vec()));
    }
    Ok(rows)
}

fn decode_records(rows: Vec<(String, Vec<u8>)>) -> Result<Vec<Record>> {
    let mut records = rows
        .into_iter()
        .map(|(_, bytes)| serde_json::from_slice::<Record>(&bytes))
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to deserialize record")?;
    records.sort_by_cached_key(|r| RecordKey::of(r, DEFAULT_KEY));
    Ok(records)
}

fn to_record<E: Entity>(entity: &E) -> Result<Record> {
    match serde_json::to_value(entity).context("Failed to serialize entity")? {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("{} entity did not serialize to an object", E::KIND),
    }
}

fn from_record<E: Entity>(record: Record) -> Result<E> {
    serde_json::from_value(serde_json::Value::Object(record))
        .with_context(|| format!("Failed to deserialize {} record", E::KIND))
}

/// Project store on redb.
///
/// Entity rows are keyed `<scope>/<id>`, so every read and write is confined to
/// one project (or to the global scope).
#[derive(Clone)]
pub struct ProjectStore {
    db: Arc<Database>,
}

impl ProjectStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create index directory")?;
        }

        let db = Database::create(&path).context("Failed to create redb database")?;

        let write_txn = db.begin_write().context("Failed to begin write transaction")?;
        {
            write_txn
                .open_table(PROJECTS_TABLE)
                .context("Failed to open projects table")?;
            for kind in EntityKind::ALL {
                write_txn
                    .open_table(entity_table(kind))
                    .with_context(|| format!("Failed to open {} table", kind))?;
            }
            write_txn
                .open_table(DOC_VERSIONS_TABLE)
                .context("Failed to open doc versions table")?;
            write_txn
                .open_table(CONTEXT_TABLE)
                .context("Failed to open context table")?;
            write_txn
                .open_table(SNAPSHOTS_TABLE)
                .context("Failed to open snapshots table")?;
            write_txn
                .open_table(SEQUENCES_TABLE)
                .context("Failed to open sequences table")?;
        }
        {
            let txn = StoreTxn { txn: &write_txn };
            txn.seed_defaults()?;
        }
        write_txn.commit().context("Failed to commit transaction")?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Run `f` in one write transaction, committing only if it succeeds
    pub fn write<T>(&self, f: impl FnOnce(&StoreTxn<'_>) -> Result<T>) -> Result<T> {
        let write_txn = self.db.begin_write().context("Failed to begin write")?;
        let value = {
            let txn = StoreTxn { txn: &write_txn };
            f(&txn)?
        };
        write_txn.commit().context("Failed to commit")?;
        Ok(value)
    }

    /// Create a project with unique name and origin, seeded with copies of the
    /// global rules and templates
    pub fn create_project(
        &self,
        name: &str,
        description: Option<String>,
        origin: &str,
    ) -> Result<Project> {
        self.write(|txn| txn.create_project(name, description, origin, true))
    }

    pub fn get_project(&self, id: ProjectId) -> Result<Option<Project>> {
        let read_txn = self.db.begin_read().context("Failed to begin read")?;
        let table = read_txn
            .open_table(PROJECTS_TABLE)
            .context("Failed to open table")?;

        match table.get(id.0).context("Failed to get project")? {
            Some(guard) => {
                let project: Project = serde_json::from_slice(guard.value())
                    .context("Failed to deserialize project")?;
                Ok(Some(project))
            }
            None => Ok(None),
        }
    }

    /// Get a project or fail with `NotFound`
    pub fn require_project(&self, id: ProjectId) -> Result<Project> {
        self.get_project(id)?
            .ok_or_else(|| CacdError::not_found(format!("project {}", id)).into())
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let read_txn = self.db.begin_read().context("Failed to begin read")?;
        let table = read_txn
            .open_table(PROJECTS_TABLE)
            .context("Failed to open table")?;

        let mut projects = Vec::new();
        for item in table.iter().context("Failed to iterate projects")? {
            let (_key, value) = item.context("Failed to read item")?;
            let project: Project =
                serde_json::from_slice(value.value()).context("Failed to deserialize project")?;
            projects.push(project);
        }
        Ok(projects)
    }

    pub fn find_project_by_origin(&self, origin: &str) -> Result<Option<Project>> {
        Ok(self
            .list_projects()?
            .into_iter()
            .find(|project| project.origin == origin))
    }

    /// Store a typed entity in its own scope
    pub fn put<E: Entity>(&self, entity: &E) -> Result<()> {
        self.write(|txn| txn.put(entity))
    }

    pub fn get<E: Entity>(
        &self,
        scope: Option<ProjectId>,
        id: impl Into<serde_json::Value>,
    ) -> Result<Option<E>> {
        let key = record_storage_key(scope, &RecordKey::from_value(&id.into()));
        let read_txn = self.db.begin_read().context("Failed to begin read")?;
        let table = read_txn
            .open_table(entity_table(E::KIND))
            .context("Failed to open table")?;

        match table.get(key.as_str()).context("Failed to get entity")? {
            Some(guard) => {
                let entity: E = serde_json::from_slice(guard.value())
                    .with_context(|| format!("Failed to deserialize {} record", E::KIND))?;
                Ok(Some(entity))
            }
            None => Ok(None),
        }
    }

    /// All entities of a kind in a scope, ordered by id
    pub fn list<E: Entity>(&self, scope: Option<ProjectId>) -> Result<Vec<E>> {
        self.list_records(E::KIND, scope)?
            .into_iter()
            .map(from_record)
            .collect()
    }

    /// All records of a kind in a scope as raw JSON objects, ordered by id
    pub fn list_records(&self, kind: EntityKind, scope: Option<ProjectId>) -> Result<Vec<Record>> {
        let read_txn = self.db.begin_read().context("Failed to begin read")?;
        let table = read_txn
            .open_table(entity_table(kind))
            .context("Failed to open table")?;
        decode_records(scan_prefix(&table, &scope_prefix(scope))?)
    }

    /// Delete an entity; returns whether it existed
    pub fn delete<E: Entity>(
        &self,
        scope: Option<ProjectId>,
        id: impl Into<serde_json::Value>,
    ) -> Result<bool> {
        let id = RecordKey::from_value(&id.into());
        self.write(|txn| txn.delete_record(E::KIND, scope, &id))
    }

    /// Allocate the next numeric id of a kind
    pub fn next_id(&self, kind: EntityKind) -> Result<u64> {
        self.write(|txn| txn.next_id(kind))
    }

    pub fn save_context(&self, entry: &ContextEntry) -> Result<()> {
        self.write(|txn| txn.save_context(entry))
    }

    pub fn get_context(&self, task_id: &str) -> Result<Option<ContextEntry>> {
        let read_txn = self.db.begin_read().context("Failed to begin read")?;
        let table = read_txn
            .open_table(CONTEXT_TABLE)
            .context("Failed to open table")?;

        match table.get(task_id).context("Failed to get context")? {
            Some(guard) => {
                let entry: ContextEntry = serde_json::from_slice(guard.value())
                    .context("Failed to deserialize context")?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// Versions of a doc, newest first
    pub fn list_doc_versions(&self, project: ProjectId, doc_id: u64) -> Result<Vec<DocVersion>> {
        let read_txn = self.db.begin_read().context("Failed to begin read")?;
        let table = read_txn
            .open_table(DOC_VERSIONS_TABLE)
            .context("Failed to open table")?;

        let mut versions = scan_prefix(&table, &doc_versions_prefix(project, doc_id))?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice::<DocVersion>(&bytes))
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to deserialize doc version")?;
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(versions)
    }

    pub fn get_doc_version(
        &self,
        project: ProjectId,
        doc_id: u64,
        version: u32,
    ) -> Result<Option<DocVersion>> {
        Ok(self
            .list_doc_versions(project, doc_id)?
            .into_iter()
            .find(|v| v.version == version))
    }

    pub fn get_snapshot(&self, id: &SnapshotId) -> Result<Option<SnapshotMeta>> {
        let read_txn = self.db.begin_read().context("Failed to begin read")?;
        let table = read_txn
            .open_table(SNAPSHOTS_TABLE)
            .context("Failed to open table")?;

        let key = id.to_string();
        match table.get(key.as_str()).context("Failed to get snapshot")? {
            Some(guard) => {
                let meta: SnapshotMeta = serde_json::from_slice(guard.value())
                    .context("Failed to deserialize snapshot")?;
                Ok(Some(meta))
            }
            None => Ok(None),
        }
    }

    /// Snapshots of a project, newest first
    pub fn list_snapshots(&self, project: ProjectId) -> Result<Vec<SnapshotMeta>> {
        let read_txn = self.db.begin_read().context("Failed to begin read")?;
        let table = read_txn
            .open_table(SNAPSHOTS_TABLE)
            .context("Failed to open table")?;

        let mut snapshots = Vec::new();
        for item in table.iter().context("Failed to iterate snapshots")? {
            let (_key, value) = item.context("Failed to read item")?;
            let meta: SnapshotMeta =
                serde_json::from_slice(value.value()).context("Failed to deserialize snapshot")?;
            if meta.project_id == project {
                snapshots.push(meta);
            }
        }
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(snapshots)
    }
}

/// Operations inside one open write transaction
pub struct StoreTxn<'a> {
    txn: &'a WriteTransaction,
}

impl StoreTxn<'_> {
    /// Insert a project; with `seed_globals` the global rules and templates
    /// are copied into it
    pub fn create_project(
        &self,
        name: &str,
        description: Option<String>,
        origin: &str,
        seed_globals: bool,
    ) -> Result<Project> {
        let mut table = self
            .txn
            .open_table(PROJECTS_TABLE)
            .context("Failed to open table")?;

        for item in table.iter().context("Failed to iterate projects")? {
            let (_key, value) = item.context("Failed to read item")?;
            let existing: Project =
                serde_json::from_slice(value.value()).context("Failed to deserialize project")?;
            if existing.name == name {
                return Err(CacdError::conflict(format!("project name '{}'", name)).into());
            }
            if existing.origin == origin {
                return Err(CacdError::conflict(format!("project origin '{}'", origin)).into());
            }
        }

        let project = Project {
            id: ProjectId(self.next_sequence(PROJECTS_SEQUENCE)?),
            name: name.to_string(),
            description,
            origin: origin.to_string(),
            created_at: Utc::now(),
        };

        let value = serde_json::to_vec(&project).context("Failed to serialize project")?;
        table
            .insert(project.id.0, value.as_slice())
            .context("Failed to insert project")?;
        drop(table);

        if !seed_globals {
            tracing::info!(project_id = %project.id, origin = %project.origin, "Created project");
            return Ok(project);
        }

        for rule in self.list::<Rule>(None)? {
            self.put(&Rule {
                id: format!("{}_{}", rule.id, project.id),
                project_id: Some(project.id),
                ..rule
            })?;
        }
        for template in self.list::<Template>(None)? {
            let id = self.next_id(EntityKind::Templates)?;
            self.put(&Template {
                id,
                project_id: Some(project.id),
                ..template
            })?;
        }

        tracing::info!(project_id = %project.id, origin = %project.origin, "Created project");
        Ok(project)
    }

    pub fn put<E: Entity>(&self, entity: &E) -> Result<()> {
        self.put_record(E::KIND, entity.scope(), &to_record(entity)?)
    }

    /// Insert or overwrite a raw record under `scope`
    pub fn put_record(&self, kind: EntityKind, scope: Option<ProjectId>, record: &Record) -> Result<()> {
        let id = record_id(record)?;
        {
            let mut table = self
                .txn
                .open_table(entity_table(kind))
                .context("Failed to open table")?;

            let key = record_storage_key(scope, &id);
            let value = serde_json::to_vec(record).context("Failed to serialize record")?;
            table
                .insert(key.as_str(), value.as_slice())
                .with_context(|| format!("Failed to insert {} record", kind))?;
        }

        if let RecordKey::Int(n) = id {
            if kind.has_numeric_ids() && n > 0 {
                self.bump_sequence(kind.as_str(), n as u64)?;
            }
        }
        Ok(())
    }

    pub fn list<E: Entity>(&self, scope: Option<ProjectId>) -> Result<Vec<E>> {
        self.list_records(E::KIND, scope)?
            .into_iter()
            .map(from_record)
            .collect()
    }

    pub fn list_records(&self, kind: EntityKind, scope: Option<ProjectId>) -> Result<Vec<Record>> {
        let table = self
            .txn
            .open_table(entity_table(kind))
            .context("Failed to open table")?;
        decode_records(scan_prefix(&table, &scope_prefix(scope))?)
    }

    pub fn delete_record(
        &self,
        kind: EntityKind,
        scope: Option<ProjectId>,
        id: &RecordKey,
    ) -> Result<bool> {
        let mut table = self
            .txn
            .open_table(entity_table(kind))
            .context("Failed to open table")?;

        let key = record_storage_key(scope, id);
        let removed = table
            .remove(key.as_str())
            .context("Failed to delete record")?
            .is_some();
        Ok(removed)
    }

    /// Remove every record of a kind in a scope; returns how many were removed
    pub fn clear_scope(&self, kind: EntityKind, scope: Option<ProjectId>) -> Result<usize> {
        let mut table = self
            .txn
            .open_table(entity_table(kind))
            .context("Failed to open table")?;

        let keys: Vec<String> = scan_prefix(&table, &scope_prefix(scope))?
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        for key in &keys {
            table
                .remove(key.as_str())
                .context("Failed to delete record")?;
        }
        Ok(keys.len())
    }

    pub fn next_id(&self, kind: EntityKind) -> Result<u64> {
        self.next_sequence(kind.as_str())
    }

    pub fn save_context(&self, entry: &ContextEntry) -> Result<()> {
        let mut table = self
            .txn
            .open_table(CONTEXT_TABLE)
            .context("Failed to open table")?;

        let value = serde_json::to_vec(entry).context("Failed to serialize context")?;
        table
            .insert(entry.task_id.as_str(), value.as_slice())
            .context("Failed to insert context")?;
        Ok(())
    }

    pub fn put_snapshot(&self, meta: &SnapshotMeta) -> Result<()> {
        let mut table = self
            .txn
            .open_table(SNAPSHOTS_TABLE)
            .context("Failed to open table")?;

        let key = meta.id.to_string();
        let value = serde_json::to_vec(meta).context("Failed to serialize snapshot")?;
        table
            .insert(key.as_str(), value.as_slice())
            .context("Failed to insert snapshot")?;
        Ok(())
    }

    /// Append a doc version with the next version number and return it
    pub fn append_doc_version(
        &self,
        project: ProjectId,
        doc_id: u64,
        data: crate::types::DocData,
        user_id: Option<String>,
    ) -> Result<DocVersion> {
        let mut table = self
            .txn
            .open_table(DOC_VERSIONS_TABLE)
            .context("Failed to open table")?;

        let prefix = doc_versions_prefix(project, doc_id);
        let mut latest = 0;
        for (_, bytes) in scan_prefix(&table, &prefix)? {
            let existing: DocVersion =
                serde_json::from_slice(&bytes).context("Failed to deserialize doc version")?;
            latest = latest.max(existing.version);
        }

        let version = DocVersion {
            doc_id,
            project_id: project,
            version: latest + 1,
            data,
            user_id,
            created_at: Utc::now(),
        };

        let key = format!("{}{:010}", prefix, version.version);
        let value = serde_json::to_vec(&version).context("Failed to serialize doc version")?;
        table
            .insert(key.as_str(), value.as_slice())
            .context("Failed to insert doc version")?;
        Ok(version)
    }

    fn next_sequence(&self, name: &str) -> Result<u64> {
        let mut table = self
            .txn
            .open_table(SEQUENCES_TABLE)
            .context("Failed to open table")?;

        let current = table
            .get(name)
            .context("Failed to read sequence")?
            .map(|guard| guard.value())
            .unwrap_or(0);
        let next = current + 1;
        table
            .insert(name, next)
            .context("Failed to update sequence")?;
        Ok(next)
    }

    fn bump_sequence(&self, name: &str, at_least: u64) -> Result<()> {
        let mut table = self
            .txn
            .open_table(SEQUENCES_TABLE)
            .context("Failed to open table")?;

        let current = table
            .get(name)
            .context("Failed to read sequence")?
            .map(|guard| guard.value())
            .unwrap_or(0);
        if at_least > current {
            table
                .insert(name, at_least)
                .context("Failed to update sequence")?;
        }
        Ok(())
    }

    /// Insert the default global rule and template once per database
    fn seed_defaults(&self) -> Result<()> {
        {
            let table = self
                .txn
                .open_table(SEQUENCES_TABLE)
                .context("Failed to open table")?;
            if table
                .get(SEEDED_MARKER)
                .context("Failed to read seed marker")?
                .is_some()
            {
                return Ok(());
            }
        }

        self.put(&Rule {
            id: "rule_default_priority".to_string(),
            project_id: None,
            rule_type: "priority".to_string(),
            value: "medium".to_string(),
            description: Some("Default priority for new projects".to_string()),
        })?;
        let template_id = self.next_id(EntityKind::Templates)?;
        self.put(&Template {
            id: template_id,
            project_id: None,
            name: "Base README".to_string(),
            repo_url: "https://github.com/example/base-readme".to_string(),
            tags: vec!["readme".to_string(), "docs".to_string()],
        })?;

        let mut table = self
            .txn
            .open_table(SEQUENCES_TABLE)
            .context("Failed to open table")?;
        table
            .insert(SEEDED_MARKER, 1)
            .context("Failed to write seed marker")?;
        tracing::debug!("Seeded default global rule and template");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Doc, DocData, Task, TaskStatus};
    use tempfile::TempDir;

    fn store() -> (TempDir, ProjectStore) {
        let dir = TempDir::new().unwrap();
        let store = ProjectStore::new(dir.path().join("index.redb")).unwrap();
        (dir, store)
    }

    fn task(id: &str, project: Option<ProjectId>) -> Task {
        Task {
            id: id.to_string(),
            project_id: project,
            command: "build".to_string(),
            context: String::new(),
            rules: Vec::new(),
            status: TaskStatus::Pending,
            result: None,
        }
    }

    #[test]
    fn test_create_project_copies_global_defaults() {
        let (_dir, store) = store();
        let project = store.create_project("alpha", None, "git@a").unwrap();

        let rules: Vec<Rule> = store.list(Some(project.id)).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, format!("rule_default_priority_{}", project.id));
        assert_eq!(rules[0].project_id, Some(project.id));

        let templates: Vec<Template> = store.list(Some(project.id)).unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].name, "Base README");

        let global: Vec<Template> = store.list(None).unwrap();
        assert_ne!(global[0].id, templates[0].id);
    }

    #[test]
    fn test_project_name_and_origin_are_unique() {
        let (_dir, store) = store();
        store.create_project("alpha", None, "git@a").unwrap();

        let err = store.create_project("alpha", None, "git@b").unwrap_err();
        assert!(matches!(
            crate::error::find_cacd_error(&err),
            Some(CacdError::Conflict(_))
        ));
        assert!(store.create_project("beta", None, "git@a").is_err());

        let found = store.find_project_by_origin("git@a").unwrap().unwrap();
        assert_eq!(found.name, "alpha");
        assert!(store.find_project_by_origin("git@zzz").unwrap().is_none());
    }

    #[test]
    fn test_entities_are_scoped_per_project() {
        let (_dir, store) = store();
        let a = store.create_project("a", None, "o-a").unwrap();
        let b = store.create_project("b", None, "o-b").unwrap();

        store.put(&task("t1", Some(a.id))).unwrap();
        store.put(&task("t1", Some(b.id))).unwrap();
        store.put(&task("t2", Some(a.id))).unwrap();

        let tasks_a: Vec<Task> = store.list(Some(a.id)).unwrap();
        let tasks_b: Vec<Task> = store.list(Some(b.id)).unwrap();
        assert_eq!(tasks_a.len(), 2);
        assert_eq!(tasks_b.len(), 1);

        assert!(store.delete::<Task>(Some(a.id), "t1").unwrap());
        assert!(!store.delete::<Task>(Some(a.id), "t1").unwrap());
        assert!(store.get::<Task>(Some(b.id), "t1").unwrap().is_some());
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let (_dir, store) = store();
        let project = store.create_project("a", None, "o").unwrap();

        let result: Result<()> = store.write(|txn| {
            txn.put(&task("t1", Some(project.id)))?;
            anyhow::bail!("boom")
        });
        assert!(result.is_err());
        assert!(store.list::<Task>(Some(project.id)).unwrap().is_empty());
    }

    #[test]
    fn test_keys_of_different_json_types_use_distinct_rows() {
        let (_dir, store) = store();
        let project = store.create_project("a", None, "o").unwrap();
        let record = |id: serde_json::Value| {
            serde_json::json!({"id": id, "command": "c"})
                .as_object()
                .cloned()
                .unwrap()
        };

        store
            .write(|txn| {
                txn.put_record(EntityKind::Tasks, Some(project.id), &record("1".into()))?;
                txn.put_record(EntityKind::Tasks, Some(project.id), &record(1.into()))?;
                txn.put_record(EntityKind::Tasks, Some(project.id), &record(true.into()))?;
                txn.put_record(EntityKind::Tasks, Some(project.id), &record("true".into()))
            })
            .unwrap();

        let ids: Vec<serde_json::Value> = store
            .list_records(EntityKind::Tasks, Some(project.id))
            .unwrap()
            .into_iter()
            .map(|r| r["id"].clone())
            .collect();
        assert_eq!(
            ids,
            vec![1.into(), "1".into(), "true".into(), serde_json::Value::Bool(true)]
        );

        assert!(store.delete::<Task>(Some(project.id), 1).unwrap());
        let remaining = store.list_records(EntityKind::Tasks, Some(project.id)).unwrap();
        assert_eq!(remaining.len(), 3);
        assert_eq!(remaining[0]["id"], "1");
    }

    #[test]
    fn test_explicit_numeric_ids_advance_sequence() {
        let (_dir, store) = store();
        let project = store.create_project("a", None, "o").unwrap();

        store
            .put(&Doc {
                id: 50,
                project_id: project.id,
                doc_type: "note".to_string(),
                content: "x".to_string(),
                created_at: Utc::now(),
            })
            .unwrap();
        assert_eq!(store.next_id(EntityKind::Docs).unwrap(), 51);
    }

    #[test]
    fn test_doc_versions_are_numbered_and_listed_newest_first() {
        let (_dir, store) = store();
        let project = store.create_project("a", None, "o").unwrap();

        for content in ["v1", "v2", "v3"] {
            store
                .write(|txn| {
                    txn.append_doc_version(
                        project.id,
                        7,
                        DocData {
                            doc_type: "note".to_string(),
                            content: content.to_string(),
                        },
                        None,
                    )
                })
                .unwrap();
        }

        let versions = store.list_doc_versions(project.id, 7).unwrap();
        let numbers: Vec<u32> = versions.iter().map(|v| v.version).collect();
        assert_eq!(numbers, vec![3, 2, 1]);
        assert_eq!(
            store.get_doc_version(project.id, 7, 2).unwrap().unwrap().data.content,
            "v2"
        );
        assert!(store.list_doc_versions(project.id, 8).unwrap().is_empty());
    }

    #[test]
    fn test_context_round_trip() {
        let (_dir, store) = store();
        assert!(store.get_context("t1").unwrap().is_none());

        let entry = ContextEntry {
            task_id: "t1".to_string(),
            data: "ctx".to_string(),
            project_id: None,
        };
        store.save_context(&entry).unwrap();
        assert_eq!(store.get_context("t1").unwrap(), Some(entry));
    }

    #[test]
    fn test_reopen_does_not_reseed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.redb");
        {
            let store = ProjectStore::new(path.clone()).unwrap();
            store.delete::<Rule>(None, "rule_default_priority").unwrap();
        }
        let store = ProjectStore::new(path).unwrap();
        assert!(store.list::<Rule>(None).unwrap().is_empty());
    }
}
