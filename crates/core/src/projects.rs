use crate::error::CacdError;
use crate::history::{self, HistoryAction};
use crate::notify::NotificationHub;
use crate::storage::ProjectStore;
use crate::types::Project;
use anyhow::Result;

/// Create a project seeded from the global defaults and record it in history
pub fn create_project(
    store: &ProjectStore,
    hub: &NotificationHub,
    name: &str,
    description: Option<String>,
    origin: &str,
    user_id: Option<&str>,
) -> Result<Project> {
    if name.trim().is_empty() || origin.trim().is_empty() {
        return Err(CacdError::invalid("project name and origin must not be empty").into());
    }

    let project = store.write(|txn| {
        let project = txn.create_project(name, description, origin, true)?;
        history::append(
            txn,
            project.id,
            user_id,
            HistoryAction::CreateProject {
                name: project.name.clone(),
                origin: project.origin.clone(),
            },
        )?;
        Ok(project)
    })?;

    hub.message(format!("Project {} created", project.name));
    Ok(project)
}

pub fn project_by_origin(store: &ProjectStore, origin: &str) -> Result<Project> {
    store
        .find_project_by_origin(origin)?
        .ok_or_else(|| CacdError::not_found(format!("project with origin '{}'", origin)).into())
}
