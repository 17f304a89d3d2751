use anyhow::{Context, Result};
use cacd_core::archive::ArchiveService;
use cacd_core::commands::{ActionRegistry, CommandRunner};
use cacd_core::docs::DocService;
use cacd_core::federation::Federation;
use cacd_core::memory_bank::MemoryBank;
use cacd_core::notify::NotificationHub;
use cacd_core::rules::RuleFiles;
use cacd_core::scheduler::SnapshotScheduler;
use cacd_core::storage::{
    ArchiveStore, FilesystemArchiveStore, ObjectStoreArchiveStore, ProjectStore,
};
use cacd_core::tasks::TaskProcessor;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(skip)]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub snapshots: SnapshotsConfig,

    #[serde(default)]
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_index_file")]
    pub index_file: String,

    /// Snapshot archives go to the filesystem unless `s3` is set
    #[serde(default = "default_blob_dir")]
    pub blob_dir: String,

    #[serde(default)]
    pub s3: Option<S3Config>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_s3_prefix")]
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_memory_bank_dir")]
    pub memory_bank_dir: String,

    /// Project exports and the federation drop-box
    #[serde(default = "default_archive_dir")]
    pub archive_dir: String,

    #[serde(default = "default_rules_dir")]
    pub rules_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Six-field cron expression, seconds first
    #[serde(default = "default_schedule")]
    pub schedule: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_index_file() -> String {
    "index.redb".to_string()
}

fn default_blob_dir() -> String {
    "blobs".to_string()
}

fn default_s3_prefix() -> String {
    "snapshots".to_string()
}

fn default_memory_bank_dir() -> String {
    "memory-bank".to_string()
}

fn default_archive_dir() -> String {
    "archive".to_string()
}

fn default_rules_dir() -> String {
    "rules".to_string()
}

fn default_schedule() -> String {
    "0 0 3 * * *".to_string()
}

fn default_capacity() -> usize {
    256
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            index_file: default_index_file(),
            blob_dir: default_blob_dir(),
            s3: None,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            memory_bank_dir: default_memory_bank_dir(),
            archive_dir: default_archive_dir(),
            rules_dir: default_rules_dir(),
        }
    }
}

impl Default for SnapshotsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule: default_schedule(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

impl ServerConfig {
    /// Defaults rooted at `data_dir`
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            storage: Default::default(),
            paths: Default::default(),
            snapshots: Default::default(),
            notifications: Default::default(),
        }
    }

    pub fn load(config_path: &PathBuf, data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        let mut config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context("Failed to read configuration file")?;
            toml::from_str(&content).context("Failed to parse configuration file")?
        } else {
            tracing::info!("Configuration file not found, using defaults");
            Self::with_data_dir(data_dir.clone())
        };

        config.data_dir = data_dir;

        Ok(config)
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(&self.storage.index_file)
    }

    pub fn blob_path(&self) -> PathBuf {
        self.data_dir.join(&self.storage.blob_dir)
    }

    pub fn memory_bank_path(&self) -> PathBuf {
        self.data_dir.join(&self.paths.memory_bank_dir)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.data_dir.join(&self.paths.archive_dir)
    }

    pub fn rules_path(&self) -> PathBuf {
        self.data_dir.join(&self.paths.rules_dir)
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: ProjectStore,
    pub archive: Arc<ArchiveService>,
    pub tasks: Arc<TaskProcessor>,
    pub docs: Arc<DocService>,
    pub bank: MemoryBank,
    pub federation: Arc<Federation>,
    pub rules: RuleFiles,
    pub commands: Arc<CommandRunner>,
    pub hub: Arc<NotificationHub>,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let store =
            ProjectStore::new(config.index_path()).context("Failed to create project store")?;

        let archives: Arc<dyn ArchiveStore> = match &config.storage.s3 {
            Some(s3) => Arc::new(
                ObjectStoreArchiveStore::s3(
                    &s3.bucket,
                    s3.region.as_deref(),
                    s3.endpoint.as_deref(),
                    s3.prefix.clone(),
                )
                .context("Failed to create S3 archive store")?,
            ),
            None => Arc::new(
                FilesystemArchiveStore::new(config.blob_path())
                    .context("Failed to create archive store")?,
            ),
        };

        let hub = Arc::new(NotificationHub::new(config.notifications.capacity));
        let bank = MemoryBank::new(config.memory_bank_path());

        let archive = Arc::new(ArchiveService::new(
            store.clone(),
            archives,
            config.archive_path(),
            hub.clone(),
        ));
        let tasks = Arc::new(TaskProcessor::new(store.clone(), hub.clone()));
        let docs = Arc::new(DocService::new(store.clone(), hub.clone()));
        let commands = Arc::new(CommandRunner::new(
            bank.clone(),
            ActionRegistry::with_builtins(),
        ));

        Ok(Self {
            store,
            archive,
            tasks,
            docs,
            bank,
            federation: Arc::new(Federation::new(config.archive_path())),
            rules: RuleFiles::new(config.rules_path()),
            commands,
            hub,
        })
    }

    /// Start the snapshot scheduler when enabled; it stops with the hub
    pub fn start_scheduler(&self, config: &ServerConfig) -> Result<Option<JoinHandle<()>>> {
        if !config.snapshots.enabled {
            return Ok(None);
        }
        let scheduler = SnapshotScheduler::new(
            self.archive.clone(),
            self.store.clone(),
            &config.snapshots.schedule,
            self.hub.shutdown_token(),
        )?;
        tracing::info!(
            schedule = %config.snapshots.schedule,
            next_run = ?scheduler.next_run(),
            "Snapshot scheduler enabled"
        );
        Ok(Some(scheduler.spawn()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config =
            ServerConfig::load(&dir.path().join("absent.toml"), dir.path().join("data")).unwrap();
        assert_eq!(config.storage.index_file, "index.redb");
        assert_eq!(config.notifications.capacity, 256);
        assert!(!config.snapshots.enabled);
        assert!(dir.path().join("data").is_dir());
    }

    #[test]
    fn test_partial_config_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cacd.toml");
        std::fs::write(
            &path,
            "[snapshots]\nenabled = true\nschedule = \"0 */5 * * * *\"\n\n[paths]\nrules_dir = \"mdc\"\n",
        )
        .unwrap();

        let config = ServerConfig::load(&path, dir.path().to_path_buf()).unwrap();
        assert!(config.snapshots.enabled);
        assert_eq!(config.snapshots.schedule, "0 */5 * * * *");
        assert_eq!(config.rules_path(), dir.path().join("mdc"));
        assert_eq!(config.paths.memory_bank_dir, "memory-bank");
        assert!(config.storage.s3.is_none());
    }

    #[tokio::test]
    async fn test_scheduler_starts_only_when_enabled() {
        let dir = TempDir::new().unwrap();
        let mut config = ServerConfig::with_data_dir(dir.path().to_path_buf());
        let state = AppState::new(&config).unwrap();
        assert!(state.start_scheduler(&config).unwrap().is_none());

        config.snapshots.enabled = true;
        let handle = state.start_scheduler(&config).unwrap().unwrap();
        state.hub.shutdown();
        handle.await.unwrap();
    }
}
