use crate::archive::ArchiveService;
use crate::error::CacdError;
use crate::storage::ProjectStore;
use crate::types::SnapshotMeta;
use anyhow::Result;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const SCHEDULED_REASON: &str = "scheduled";

/// Cron-driven snapshots of every project
pub struct SnapshotScheduler {
    archive: Arc<ArchiveService>,
    store: ProjectStore,
    schedule: Schedule,
    shutdown: CancellationToken,
}

impl SnapshotScheduler {
    /// `expression` uses the six-field form with seconds first, e.g. `0 0 3 * * *`
    pub fn new(
        archive: Arc<ArchiveService>,
        store: ProjectStore,
        expression: &str,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let schedule = Schedule::from_str(expression)
            .map_err(|e| CacdError::invalid(format!("cron expression '{}': {}", expression, e)))?;
        Ok(Self {
            archive,
            store,
            schedule,
            shutdown,
        })
    }

    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        self.schedule.upcoming(Utc).next()
    }

    /// Snapshot every project now. A failing project is logged and skipped.
    pub async fn run_once(&self) -> Result<Vec<SnapshotMeta>> {
        let mut taken = Vec::new();
        for project in self.store.list_projects()? {
            match self.archive.snapshot(project.id, None, SCHEDULED_REASON).await {
                Ok(meta) => taken.push(meta),
                Err(e) => {
                    tracing::error!(project_id = %project.id, error = %e, "Scheduled snapshot failed")
                }
            }
        }
        Ok(taken)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        loop {
            let Some(next) = self.next_run() else {
                tracing::warn!("Snapshot schedule has no upcoming runs, stopping");
                break;
            };
            let wait = (next - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::from_secs(1));
            tracing::debug!(next_run = %next, "Waiting for next scheduled snapshot");

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Snapshot scheduler stopped");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            match self.run_once().await {
                Ok(taken) => tracing::info!(count = taken.len(), "Scheduled snapshots taken"),
                Err(e) => tracing::error!(error = %e, "Scheduled snapshot run failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationHub;
    use crate::storage::FilesystemArchiveStore;
    use tempfile::TempDir;

    fn scheduler(dir: &TempDir, expression: &str) -> Result<(ProjectStore, SnapshotScheduler)> {
        let store = ProjectStore::new(dir.path().join("index.redb")).unwrap();
        let archives = FilesystemArchiveStore::new(dir.path().join("blobs")).unwrap();
        let archive = Arc::new(ArchiveService::new(
            store.clone(),
            Arc::new(archives),
            dir.path().join("archive"),
            Arc::new(NotificationHub::new(4)),
        ));
        let scheduler =
            SnapshotScheduler::new(archive, store.clone(), expression, CancellationToken::new())?;
        Ok((store, scheduler))
    }

    #[test]
    fn test_invalid_expression_is_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(scheduler(&dir, "not a schedule").is_err());
    }

    #[test]
    fn test_next_run_is_in_the_future() {
        let dir = TempDir::new().unwrap();
        let (_store, scheduler) = scheduler(&dir, "0 0 3 * * *").unwrap();
        assert!(scheduler.next_run().unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_run_once_snapshots_every_project() {
        let dir = TempDir::new().unwrap();
        let (store, scheduler) = scheduler(&dir, "0 0 3 * * *").unwrap();
        let a = store.create_project("a", None, "o-a").unwrap();
        store.create_project("b", None, "o-b").unwrap();

        let taken = scheduler.run_once().await.unwrap();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].reason, SCHEDULED_REASON);
        assert_eq!(store.list_snapshots(a.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_spawned_scheduler_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let (_store, scheduler) = scheduler(&dir, "0 0 3 * * *").unwrap();
        let token = scheduler.shutdown.clone();

        let handle = scheduler.spawn();
        token.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
