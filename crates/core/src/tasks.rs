// Task intake and completion

use crate::docs::insert_doc;
use crate::error::CacdError;
use crate::history::{self, HistoryAction};
use crate::notify::{ChangeKind, NotificationHub};
use crate::storage::ProjectStore;
use crate::types::{ContextEntry, Doc, DocData, ProjectId, Rule, Task, TaskStatus};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Rule type applied to every new task
pub const PRIORITY_RULE: &str = "priority";
/// Doc type of the report written when a project task completes
pub const TASK_REPORT_DOC: &str = "task_report";

#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub task_id: String,
    pub command: String,
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    /// Saved as the task context when none is stored yet
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedTask {
    pub task: Task,
    pub report: Option<Doc>,
}

pub struct TaskProcessor {
    store: ProjectStore,
    hub: Arc<NotificationHub>,
}

impl TaskProcessor {
    pub fn new(store: ProjectStore, hub: Arc<NotificationHub>) -> Self {
        Self { store, hub }
    }

    /// Resolve the task's context, apply the scope's priority rules and
    /// store the task as pending
    pub fn process_command(&self, new: NewTask, user_id: Option<&str>) -> Result<Task> {
        let scope = new.project_id;
        if let Some(project) = scope {
            self.store.require_project(project)?;
        }

        let (task, replaced) = self.store.write(|txn| {
            // A repeated task id replaces the stored task
            let replaced = txn
                .list::<Task>(scope)?
                .iter()
                .any(|task| task.id == new.task_id);

            let context = match self.store.get_context(&new.task_id)? {
                Some(entry) => entry.data,
                None => {
                    let data = new.context.clone().unwrap_or_default();
                    txn.save_context(&ContextEntry {
                        task_id: new.task_id.clone(),
                        data: data.clone(),
                        project_id: scope,
                    })?;
                    data
                }
            };

            let rules = txn
                .list::<Rule>(scope)?
                .into_iter()
                .filter(|rule| rule.rule_type == PRIORITY_RULE)
                .map(serde_json::to_value)
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to serialize rules")?;

            let task = Task {
                id: new.task_id.clone(),
                project_id: scope,
                command: new.command.clone(),
                context,
                rules,
                status: TaskStatus::Pending,
                result: None,
            };
            txn.put(&task)?;

            if let Some(project) = scope {
                history::append(
                    txn,
                    project,
                    user_id,
                    HistoryAction::TaskCreated {
                        task_id: task.id.clone(),
                    },
                )?;
            }
            Ok((task, replaced))
        })?;

        tracing::info!(task_id = %task.id, rules = task.rules.len(), replaced, "Task created");
        let change = if replaced {
            ChangeKind::Updated
        } else {
            ChangeKind::Created
        };
        self.hub.entity_changed(change, &task);
        Ok(task)
    }

    /// Mark a task done, keep its context and, for project tasks, write a
    /// report doc
    pub fn complete_task(
        &self,
        scope: Option<ProjectId>,
        task_id: &str,
        result: &str,
        user_id: Option<&str>,
    ) -> Result<CompletedTask> {
        let mut task = self.get_task(scope, task_id)?;
        task.status = TaskStatus::Done;
        task.result = Some(result.to_string());

        let report = self.store.write(|txn| {
            txn.put(&task)?;
            txn.save_context(&ContextEntry {
                task_id: task.id.clone(),
                data: task.context.clone(),
                project_id: scope,
            })?;

            let Some(project) = scope else {
                return Ok(None);
            };
            let doc = insert_doc(
                txn,
                project,
                DocData {
                    doc_type: TASK_REPORT_DOC.to_string(),
                    content: render_task_report(&task),
                },
                user_id,
            )?;
            history::append(
                txn,
                project,
                user_id,
                HistoryAction::TaskCompleted {
                    task_id: task.id.clone(),
                },
            )?;
            Ok(Some(doc))
        })?;

        tracing::info!(task_id = %task.id, "Task completed");
        self.hub.entity_changed(ChangeKind::Updated, &task);
        if let Some(doc) = &report {
            self.hub.entity_changed(ChangeKind::Created, doc);
        }
        Ok(CompletedTask { task, report })
    }

    pub fn get_task(&self, scope: Option<ProjectId>, task_id: &str) -> Result<Task> {
        self.store
            .get::<Task>(scope, task_id)?
            .ok_or_else(|| CacdError::not_found(format!("task {}", task_id)).into())
    }

    pub fn list_tasks(&self, scope: Option<ProjectId>) -> Result<Vec<Task>> {
        self.store.list(scope)
    }

    pub fn get_context(&self, task_id: &str) -> Result<ContextEntry> {
        self.store
            .get_context(task_id)?
            .ok_or_else(|| CacdError::not_found(format!("context for task {}", task_id)).into())
    }
}

/// One-line report from a context object carrying `task_id` and `summary`
pub fn generate_report(context: &serde_json::Value) -> String {
    let field = |name: &str| match context.get(name) {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    };
    format!(
        "Report for task {}: {}",
        field("task_id").unwrap_or_default(),
        field("summary").unwrap_or_else(|| "no data".to_string())
    )
}

/// Markdown body of a task report doc
pub fn render_task_report(task: &Task) -> String {
    let rules = serde_json::to_string_pretty(&task.rules).unwrap_or_else(|_| "[]".to_string());
    format!(
        "# Task {}\n**Command:** {}\n\n**Context:** {}\n\n**Rules:** {}\n\n**Result:** {}\n",
        task.id,
        task.command,
        task.context,
        rules,
        task.result.as_deref().unwrap_or_default()
    )
}
