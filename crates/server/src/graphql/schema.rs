use async_graphql::{
    Context, Enum, Error, ErrorExtensions, InputObject, Json, Object, Result, Schema,
    SimpleObject, Subscription,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cacd_core::archive::MergeOptions;
use cacd_core::notify::{ChangeKind, Notification};
use cacd_core::reconcile::MergeStrategy;
use cacd_core::tasks::NewTask;
use cacd_core::{
    find_cacd_error, projects, CacdError, Doc, Embedding, Entity, EntityKind, HistoryEntry,
    ProjectId, Rule, SnapshotId, SnapshotMeta, Task, Template,
};
use chrono::{DateTime, Utc};
use futures::Stream;
use std::sync::Arc;

use crate::api::ActingUser;
use crate::config::AppState;

/// Convert a domain error, tagging it with a machine readable code
fn api_error(err: anyhow::Error) -> Error {
    let code = match find_cacd_error(&err) {
        Some(CacdError::NotFound(_)) => "NOT_FOUND",
        Some(CacdError::Conflict(_)) => "CONFLICT",
        Some(CacdError::InvalidInput(_)) => "INVALID_INPUT",
        None => "INTERNAL",
    };
    Error::new(format!("{:#}", err)).extend_with(|_, e| e.set("code", code))
}

fn state<'a>(ctx: &Context<'a>) -> Result<&'a Arc<AppState>> {
    ctx.data::<Arc<AppState>>()
}

fn user<'a>(ctx: &Context<'a>) -> Option<&'a str> {
    ctx.data_opt::<ActingUser>().and_then(ActingUser::as_deref)
}

fn decode_archive(archive: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(archive.trim())
        .map_err(|e| api_error(CacdError::invalid(format!("archive is not base64: {}", e)).into()))
}

/// Scope of an optional project id, checked to exist
fn scope(state: &AppState, project_id: Option<u64>) -> Result<Option<ProjectId>> {
    match project_id {
        Some(id) => {
            let project = state.store.require_project(ProjectId(id)).map_err(api_error)?;
            Ok(Some(project.id))
        }
        None => Ok(None),
    }
}

#[derive(Clone, SimpleObject)]
#[graphql(name = "Project")]
pub struct ProjectNode {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    pub origin: String,
    pub created_at: DateTime<Utc>,
}

impl From<cacd_core::Project> for ProjectNode {
    fn from(p: cacd_core::Project) -> Self {
        Self {
            id: p.id.0,
            name: p.name,
            description: p.description,
            origin: p.origin,
            created_at: p.created_at,
        }
    }
}

#[derive(Clone, SimpleObject)]
#[graphql(name = "Task")]
pub struct TaskNode {
    pub id: String,
    pub project_id: Option<u64>,
    pub command: String,
    pub context: String,
    pub rules: Json<Vec<serde_json::Value>>,
    pub status: String,
    pub result: Option<String>,
}

impl From<Task> for TaskNode {
    fn from(t: Task) -> Self {
        Self {
            id: t.id,
            project_id: t.project_id.map(|p| p.0),
            command: t.command,
            context: t.context,
            rules: Json(t.rules),
            status: t.status.to_string(),
            result: t.result,
        }
    }
}

#[derive(Clone, SimpleObject)]
#[graphql(name = "Rule")]
pub struct RuleNode {
    pub id: String,
    pub project_id: Option<u64>,
    #[graphql(name = "type")]
    pub rule_type: String,
    pub value: String,
    pub description: Option<String>,
}

impl From<Rule> for RuleNode {
    fn from(r: Rule) -> Self {
        Self {
            id: r.id,
            project_id: r.project_id.map(|p| p.0),
            rule_type: r.rule_type,
            value: r.value,
            description: r.description,
        }
    }
}

#[derive(Clone, SimpleObject)]
#[graphql(name = "Template")]
pub struct TemplateNode {
    pub id: u64,
    pub project_id: Option<u64>,
    pub name: String,
    pub repo_url: String,
    pub tags: Vec<String>,
}

impl From<Template> for TemplateNode {
    fn from(t: Template) -> Self {
        Self {
            id: t.id,
            project_id: t.project_id.map(|p| p.0),
            name: t.name,
            repo_url: t.repo_url,
            tags: t.tags,
        }
    }
}

#[derive(Clone, SimpleObject)]
#[graphql(name = "Embedding")]
pub struct EmbeddingNode {
    pub id: u64,
    pub project_id: u64,
    pub task_id: Option<String>,
    pub model: String,
    pub vector: Vec<f32>,
    pub description: Option<String>,
    pub entity_type: String,
    pub entity_id: String,
}

impl From<Embedding> for EmbeddingNode {
    fn from(e: Embedding) -> Self {
        Self {
            id: e.id,
            project_id: e.project_id.0,
            task_id: e.task_id,
            model: e.model,
            vector: e.vector,
            description: e.description,
            entity_type: e.entity_type,
            entity_id: e.entity_id,
        }
    }
}

#[derive(Clone, SimpleObject)]
#[graphql(name = "Doc")]
pub struct DocNode {
    pub id: u64,
    pub project_id: u64,
    #[graphql(name = "type")]
    pub doc_type: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<Doc> for DocNode {
    fn from(d: Doc) -> Self {
        Self {
            id: d.id,
            project_id: d.project_id.0,
            doc_type: d.doc_type,
            content: d.content,
            created_at: d.created_at,
        }
    }
}

#[derive(Clone, SimpleObject)]
#[graphql(name = "HistoryEntry")]
pub struct HistoryNode {
    pub id: u64,
    pub project_id: u64,
    pub user_id: Option<String>,
    pub action: String,
    pub details: Json<serde_json::Value>,
    pub diff: Option<Json<serde_json::Value>>,
    pub resolved_by: Option<String>,
    pub conflict_details: Option<Json<serde_json::Value>>,
    pub created_at: DateTime<Utc>,
}

impl From<HistoryEntry> for HistoryNode {
    fn from(h: HistoryEntry) -> Self {
        Self {
            id: h.id,
            project_id: h.project_id.0,
            user_id: h.user_id,
            action: h.action,
            details: Json(h.details),
            diff: h.diff.map(Json),
            resolved_by: h.resolved_by,
            conflict_details: h.conflict_details.map(Json),
            created_at: h.created_at,
        }
    }
}

#[derive(Clone, SimpleObject)]
#[graphql(name = "Snapshot")]
pub struct SnapshotNode {
    pub id: String,
    pub project_id: u64,
    pub archive: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub reason: String,
}

impl From<SnapshotMeta> for SnapshotNode {
    fn from(s: SnapshotMeta) -> Self {
        Self {
            id: s.id.to_string(),
            project_id: s.project_id.0,
            archive: s.archive.to_string(),
            size: s.size,
            created_at: s.created_at,
            created_by: s.created_by,
            reason: s.reason,
        }
    }
}

/// Group sizes of one entity kind in a merge
#[derive(Clone, SimpleObject)]
pub struct KindSummary {
    pub kind: String,
    pub added: usize,
    pub updated: usize,
    pub conflicted: usize,
    pub skipped: usize,
}

#[derive(Clone, SimpleObject)]
pub struct RestoredCount {
    pub kind: String,
    pub count: usize,
}

#[derive(Clone, SimpleObject)]
pub struct MergeResult {
    pub dry_run: bool,
    pub summary: Vec<KindSummary>,
    /// Full per-kind reconciliation
    pub diff: Json<serde_json::Value>,
}

#[derive(Clone, SimpleObject)]
pub struct ExportResult {
    pub project_id: u64,
    pub path: String,
    /// Base64 encoded zip
    pub archive: String,
}

#[derive(Enum, Copy, Clone, Eq, PartialEq, Default)]
pub enum Strategy {
    #[default]
    AddOnly,
    PreferIncoming,
}

impl From<Strategy> for MergeStrategy {
    fn from(s: Strategy) -> Self {
        match s {
            Strategy::AddOnly => MergeStrategy::AddOnly,
            Strategy::PreferIncoming => MergeStrategy::PreferIncoming,
        }
    }
}

/// Query root
pub struct Query;

#[Object]
impl Query {
    async fn projects(&self, ctx: &Context<'_>) -> Result<Vec<ProjectNode>> {
        let state = state(ctx)?;
        let projects = state.store.list_projects().map_err(api_error)?;
        Ok(projects.into_iter().map(Into::into).collect())
    }

    async fn project(&self, ctx: &Context<'_>, id: u64) -> Result<Option<ProjectNode>> {
        let state = state(ctx)?;
        let project = state.store.get_project(ProjectId(id)).map_err(api_error)?;
        Ok(project.map(Into::into))
    }

    async fn project_by_origin(&self, ctx: &Context<'_>, origin: String) -> Result<ProjectNode> {
        let state = state(ctx)?;
        let project = projects::project_by_origin(&state.store, &origin).map_err(api_error)?;
        Ok(project.into())
    }

    /// Tasks of a project, or global tasks when `projectId` is omitted
    async fn tasks(&self, ctx: &Context<'_>, project_id: Option<u64>) -> Result<Vec<TaskNode>> {
        list_entities::<Task, TaskNode>(ctx, project_id)
    }

    async fn task(
        &self,
        ctx: &Context<'_>,
        project_id: Option<u64>,
        id: String,
    ) -> Result<TaskNode> {
        let state = state(ctx)?;
        let task = state
            .tasks
            .get_task(scope(state, project_id)?, &id)
            .map_err(api_error)?;
        Ok(task.into())
    }

    async fn rules(&self, ctx: &Context<'_>, project_id: Option<u64>) -> Result<Vec<RuleNode>> {
        list_entities::<Rule, RuleNode>(ctx, project_id)
    }

    async fn templates(
        &self,
        ctx: &Context<'_>,
        project_id: Option<u64>,
    ) -> Result<Vec<TemplateNode>> {
        list_entities::<Template, TemplateNode>(ctx, project_id)
    }

    async fn embeddings(&self, ctx: &Context<'_>, project_id: u64) -> Result<Vec<EmbeddingNode>> {
        list_entities::<Embedding, EmbeddingNode>(ctx, Some(project_id))
    }

    async fn docs(&self, ctx: &Context<'_>, project_id: u64) -> Result<Vec<DocNode>> {
        list_entities::<Doc, DocNode>(ctx, Some(project_id))
    }

    async fn doc(&self, ctx: &Context<'_>, project_id: u64, id: u64) -> Result<DocNode> {
        let state = state(ctx)?;
        let doc = state.docs.get(ProjectId(project_id), id).map_err(api_error)?;
        Ok(doc.into())
    }

    async fn history(&self, ctx: &Context<'_>, project_id: u64) -> Result<Vec<HistoryNode>> {
        list_entities::<HistoryEntry, HistoryNode>(ctx, Some(project_id))
    }

    async fn snapshots(&self, ctx: &Context<'_>, project_id: u64) -> Result<Vec<SnapshotNode>> {
        let state = state(ctx)?;
        let snapshots = state
            .archive
            .list_snapshots(ProjectId(project_id))
            .map_err(api_error)?;
        Ok(snapshots.into_iter().map(Into::into).collect())
    }

    /// Reconcile a base64 archive against a project without writing anything
    async fn merge_preview(
        &self,
        ctx: &Context<'_>,
        project_id: u64,
        archive: String,
    ) -> Result<MergeResult> {
        let state = state(ctx)?;
        let bytes = decode_archive(&archive)?;
        let report = state
            .archive
            .preview_merge(ProjectId(project_id), &bytes)
            .map_err(api_error)?;
        merge_result(&report)
    }
}

fn list_entities<E, N>(ctx: &Context<'_>, project_id: Option<u64>) -> Result<Vec<N>>
where
    E: Entity,
    N: From<E>,
{
    let state = state(ctx)?;
    let scope = scope(state, project_id)?;
    let entities = state.store.list::<E>(scope).map_err(api_error)?;
    Ok(entities.into_iter().map(N::from).collect())
}

fn merge_result(report: &cacd_core::archive::MergeReport) -> Result<MergeResult> {
    let summary = report
        .summary()
        .into_iter()
        .map(|(kind, s)| KindSummary {
            kind: kind.to_string(),
            added: s.added,
            updated: s.updated,
            conflicted: s.conflicted,
            skipped: s.skipped,
        })
        .collect();
    let diff = serde_json::to_value(&report.diff)?;
    Ok(MergeResult {
        dry_run: report.dry_run,
        summary,
        diff: Json(diff),
    })
}

#[derive(InputObject)]
pub struct CreateTaskInput {
    pub task_id: String,
    pub command: String,
    pub project_id: Option<u64>,
    pub context: Option<String>,
}

#[derive(InputObject)]
pub struct RuleInput {
    pub project_id: Option<u64>,
    /// Generated when omitted
    pub id: Option<String>,
    #[graphql(name = "type")]
    pub rule_type: String,
    pub value: String,
    pub description: Option<String>,
}

#[derive(InputObject)]
pub struct RulePatch {
    #[graphql(name = "type")]
    pub rule_type: Option<String>,
    pub value: Option<String>,
    pub description: Option<String>,
}

#[derive(InputObject)]
pub struct TemplateInput {
    pub project_id: Option<u64>,
    pub name: String,
    pub repo_url: String,
    #[graphql(default)]
    pub tags: Vec<String>,
}

#[derive(InputObject)]
pub struct TemplatePatch {
    pub name: Option<String>,
    pub repo_url: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(InputObject)]
pub struct EmbeddingInput {
    pub project_id: u64,
    pub task_id: Option<String>,
    pub model: String,
    pub vector: Vec<f32>,
    pub description: Option<String>,
    pub entity_type: String,
    pub entity_id: String,
}

/// Mutation root
pub struct Mutation;

#[Object]
impl Mutation {
    async fn create_project(
        &self,
        ctx: &Context<'_>,
        name: String,
        description: Option<String>,
        origin: String,
    ) -> Result<ProjectNode> {
        let state = state(ctx)?;
        let project = projects::create_project(
            &state.store,
            &state.hub,
            &name,
            description,
            &origin,
            user(ctx),
        )
        .map_err(api_error)?;
        Ok(project.into())
    }

    async fn create_task(&self, ctx: &Context<'_>, input: CreateTaskInput) -> Result<TaskNode> {
        let state = state(ctx)?;
        let new = NewTask {
            task_id: input.task_id,
            command: input.command,
            project_id: input.project_id.map(ProjectId),
            context: input.context,
        };
        let task = state
            .tasks
            .process_command(new, user(ctx))
            .map_err(api_error)?;
        Ok(task.into())
    }

    async fn complete_task(
        &self,
        ctx: &Context<'_>,
        project_id: Option<u64>,
        id: String,
        result: String,
    ) -> Result<TaskNode> {
        let state = state(ctx)?;
        let completed = state
            .tasks
            .complete_task(project_id.map(ProjectId), &id, &result, user(ctx))
            .map_err(api_error)?;
        Ok(completed.task.into())
    }

    async fn delete_task(&self, ctx: &Context<'_>, project_id: Option<u64>, id: String) -> Result<bool> {
        delete_entity::<Task>(ctx, project_id, id.into())
    }

    async fn create_rule(&self, ctx: &Context<'_>, input: RuleInput) -> Result<RuleNode> {
        let state = state(ctx)?;
        let scope = scope(state, input.project_id)?;
        let id = input
            .id
            .unwrap_or_else(|| format!("rule_{}", uuid::Uuid::new_v4().simple()));
        if state.store.get::<Rule>(scope, id.clone()).map_err(api_error)?.is_some() {
            return Err(api_error(CacdError::conflict(format!("rule {}", id)).into()));
        }
        let rule = Rule {
            id,
            project_id: scope,
            rule_type: input.rule_type,
            value: input.value,
            description: input.description,
        };
        put_entity(state, ChangeKind::Created, &rule)?;
        Ok(rule.into())
    }

    async fn update_rule(
        &self,
        ctx: &Context<'_>,
        project_id: Option<u64>,
        id: String,
        patch: RulePatch,
    ) -> Result<RuleNode> {
        let state = state(ctx)?;
        let scope = scope(state, project_id)?;
        let mut rule = state
            .store
            .get::<Rule>(scope, id.clone())
            .map_err(api_error)?
            .ok_or_else(|| api_error(CacdError::not_found(format!("rule {}", id)).into()))?;
        if let Some(rule_type) = patch.rule_type {
            rule.rule_type = rule_type;
        }
        if let Some(value) = patch.value {
            rule.value = value;
        }
        if patch.description.is_some() {
            rule.description = patch.description;
        }
        put_entity(state, ChangeKind::Updated, &rule)?;
        Ok(rule.into())
    }

    async fn delete_rule(&self, ctx: &Context<'_>, project_id: Option<u64>, id: String) -> Result<bool> {
        delete_entity::<Rule>(ctx, project_id, id.into())
    }

    async fn create_template(&self, ctx: &Context<'_>, input: TemplateInput) -> Result<TemplateNode> {
        let state = state(ctx)?;
        let scope = scope(state, input.project_id)?;
        let id = state
            .store
            .next_id(EntityKind::Templates)
            .map_err(api_error)?;
        let template = Template {
            id,
            project_id: scope,
            name: input.name,
            repo_url: input.repo_url,
            tags: input.tags,
        };
        put_entity(state, ChangeKind::Created, &template)?;
        Ok(template.into())
    }

    async fn update_template(
        &self,
        ctx: &Context<'_>,
        project_id: Option<u64>,
        id: u64,
        patch: TemplatePatch,
    ) -> Result<TemplateNode> {
        let state = state(ctx)?;
        let scope = scope(state, project_id)?;
        let mut template = state
            .store
            .get::<Template>(scope, id)
            .map_err(api_error)?
            .ok_or_else(|| api_error(CacdError::not_found(format!("template {}", id)).into()))?;
        if let Some(name) = patch.name {
            template.name = name;
        }
        if let Some(repo_url) = patch.repo_url {
            template.repo_url = repo_url;
        }
        if let Some(tags) = patch.tags {
            template.tags = tags;
        }
        put_entity(state, ChangeKind::Updated, &template)?;
        Ok(template.into())
    }

    async fn delete_template(&self, ctx: &Context<'_>, project_id: Option<u64>, id: u64) -> Result<bool> {
        delete_entity::<Template>(ctx, project_id, id.into())
    }

    async fn create_doc(
        &self,
        ctx: &Context<'_>,
        project_id: u64,
        #[graphql(name = "type")] doc_type: String,
        content: String,
    ) -> Result<DocNode> {
        let state = state(ctx)?;
        let doc = state
            .docs
            .create(ProjectId(project_id), &doc_type, &content, user(ctx))
            .map_err(api_error)?;
        Ok(doc.into())
    }

    async fn update_doc(
        &self,
        ctx: &Context<'_>,
        project_id: u64,
        id: u64,
        #[graphql(name = "type")] doc_type: Option<String>,
        content: Option<String>,
    ) -> Result<DocNode> {
        let state = state(ctx)?;
        let doc = state
            .docs
            .update(
                ProjectId(project_id),
                id,
                doc_type.as_deref(),
                content.as_deref(),
                user(ctx),
            )
            .map_err(api_error)?;
        Ok(doc.into())
    }

    async fn rollback_doc(
        &self,
        ctx: &Context<'_>,
        project_id: u64,
        id: u64,
        version: u32,
    ) -> Result<DocNode> {
        let state = state(ctx)?;
        let doc = state
            .docs
            .rollback(ProjectId(project_id), id, version, user(ctx))
            .map_err(api_error)?;
        Ok(doc.into())
    }

    async fn delete_doc(&self, ctx: &Context<'_>, project_id: u64, id: u64) -> Result<bool> {
        let state = state(ctx)?;
        state.docs.delete(ProjectId(project_id), id).map_err(api_error)
    }

    async fn create_embedding(&self, ctx: &Context<'_>, input: EmbeddingInput) -> Result<EmbeddingNode> {
        let state = state(ctx)?;
        let project = scope(state, Some(input.project_id))?.unwrap_or(ProjectId(input.project_id));
        let id = state
            .store
            .next_id(EntityKind::Embeddings)
            .map_err(api_error)?;
        let embedding = Embedding {
            id,
            project_id: project,
            task_id: input.task_id,
            model: input.model,
            vector: input.vector,
            description: input.description,
            entity_type: input.entity_type,
            entity_id: input.entity_id,
        };
        put_entity(state, ChangeKind::Created, &embedding)?;
        Ok(embedding.into())
    }

    async fn delete_embedding(&self, ctx: &Context<'_>, project_id: u64, id: u64) -> Result<bool> {
        delete_entity::<Embedding>(ctx, Some(project_id), id.into())
    }

    /// Export a project; the archive is returned base64 encoded
    async fn export_project(&self, ctx: &Context<'_>, project_id: u64) -> Result<ExportResult> {
        let state = state(ctx)?;
        let exported = state
            .archive
            .export(ProjectId(project_id), user(ctx))
            .await
            .map_err(api_error)?;
        Ok(ExportResult {
            project_id: exported.project_id.0,
            path: exported.path.display().to_string(),
            archive: STANDARD.encode(&exported.bytes),
        })
    }

    async fn import_project(
        &self,
        ctx: &Context<'_>,
        archive: String,
        origin: String,
        name: Option<String>,
    ) -> Result<ProjectNode> {
        let state = state(ctx)?;
        let bytes = decode_archive(&archive)?;
        let project = state
            .archive
            .import(&bytes, &origin, name.as_deref(), user(ctx))
            .map_err(api_error)?;
        Ok(project.into())
    }

    async fn merge_project(
        &self,
        ctx: &Context<'_>,
        project_id: u64,
        archive: String,
        #[graphql(default)] dry_run: bool,
        #[graphql(default)] strategy: Strategy,
    ) -> Result<MergeResult> {
        let state = state(ctx)?;
        let bytes = decode_archive(&archive)?;
        let options = MergeOptions {
            dry_run,
            strategy: strategy.into(),
        };
        let report = state
            .archive
            .merge(ProjectId(project_id), &bytes, options, user(ctx))
            .map_err(api_error)?;
        merge_result(&report)
    }

    async fn snapshot_project(
        &self,
        ctx: &Context<'_>,
        project_id: u64,
        reason: Option<String>,
    ) -> Result<SnapshotNode> {
        let state = state(ctx)?;
        let meta = state
            .archive
            .snapshot(
                ProjectId(project_id),
                user(ctx),
                reason.as_deref().unwrap_or("manual"),
            )
            .await
            .map_err(api_error)?;
        Ok(meta.into())
    }

    /// Restore a project from a snapshot; returns restored record counts
    async fn rollback_project(
        &self,
        ctx: &Context<'_>,
        project_id: u64,
        snapshot_id: String,
    ) -> Result<Vec<RestoredCount>> {
        let state = state(ctx)?;
        let snapshot_id = uuid::Uuid::parse_str(&snapshot_id).map_err(|e| {
            api_error(CacdError::invalid(format!("snapshot id: {}", e)).into())
        })?;
        let report = state
            .archive
            .rollback(ProjectId(project_id), SnapshotId(snapshot_id), user(ctx))
            .await
            .map_err(api_error)?;
        Ok(report
            .restored
            .into_iter()
            .map(|(kind, count)| RestoredCount {
                kind: kind.to_string(),
                count,
            })
            .collect())
    }
}

fn put_entity<E: Entity>(state: &AppState, change: ChangeKind, entity: &E) -> Result<()> {
    state.store.put(entity).map_err(api_error)?;
    state.hub.entity_changed(change, entity);
    Ok(())
}

fn delete_entity<E: Entity>(
    ctx: &Context<'_>,
    project_id: Option<u64>,
    id: serde_json::Value,
) -> Result<bool> {
    let state = state(ctx)?;
    let scope = scope(state, project_id)?;
    let removed = state.store.delete::<E>(scope, id.clone()).map_err(api_error)?;
    if removed {
        state.hub.entity_deleted(E::KIND, scope, id);
    }
    Ok(removed)
}

/// Created and updated entities of one kind, optionally for one project
fn entity_updates<E, N>(ctx: &Context<'_>, project_id: Option<u64>) -> impl Stream<Item = N>
where
    E: Entity + 'static,
    N: From<E> + Send + 'static,
{
    let subscription = ctx.data::<Arc<AppState>>().ok().map(|s| s.hub.subscribe());
    let wanted = project_id.map(ProjectId);

    async_stream::stream! {
        if let Some(mut subscription) = subscription {
            while let Some(notification) = subscription.recv().await {
                if let Notification::EntityChanged { kind, project_id, record: Some(record), .. } = notification {
                    if kind != E::KIND || (wanted.is_some() && project_id != wanted) {
                        continue;
                    }
                    match serde_json::from_value::<E>(record) {
                        Ok(entity) => yield N::from(entity),
                        Err(e) => tracing::warn!(%kind, error = %e, "Skipping undecodable change record"),
                    }
                }
            }
        }
    }
}

/// Subscription root for real-time updates
pub struct Subscription;

#[Subscription]
impl Subscription {
    async fn on_task_update(
        &self,
        ctx: &Context<'_>,
        project_id: Option<u64>,
    ) -> impl Stream<Item = TaskNode> {
        entity_updates::<Task, TaskNode>(ctx, project_id)
    }

    async fn on_doc_update(
        &self,
        ctx: &Context<'_>,
        project_id: Option<u64>,
    ) -> impl Stream<Item = DocNode> {
        entity_updates::<Doc, DocNode>(ctx, project_id)
    }

    async fn on_rule_update(
        &self,
        ctx: &Context<'_>,
        project_id: Option<u64>,
    ) -> impl Stream<Item = RuleNode> {
        entity_updates::<Rule, RuleNode>(ctx, project_id)
    }

    async fn on_template_update(
        &self,
        ctx: &Context<'_>,
        project_id: Option<u64>,
    ) -> impl Stream<Item = TemplateNode> {
        entity_updates::<Template, TemplateNode>(ctx, project_id)
    }
}

pub type CacdSchema = Schema<Query, Mutation, Subscription>;

/// Build the GraphQL schema
pub fn build_schema(state: Arc<AppState>) -> CacdSchema {
    Schema::build(Query, Mutation, Subscription)
        .data(state)
        .finish()
}
