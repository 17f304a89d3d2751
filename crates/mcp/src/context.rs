// Core services opened over a data directory

use anyhow::{Context, Result};
use cacd_core::archive::ArchiveService;
use cacd_core::federation::Federation;
use cacd_core::memory_bank::MemoryBank;
use cacd_core::notify::NotificationHub;
use cacd_core::rules::RuleFiles;
use cacd_core::storage::{FilesystemArchiveStore, ProjectStore};
use cacd_core::tasks::TaskProcessor;
use std::path::Path;
use std::sync::Arc;

/// Layout below the data directory, the same as the HTTP server's defaults
pub const INDEX_FILE: &str = "index.redb";
pub const BLOB_DIR: &str = "blobs";
pub const ARCHIVE_DIR: &str = "archive";
pub const RULES_DIR: &str = "rules";
pub const MEMORY_BANK_DIR: &str = "memory-bank";

const HUB_CAPACITY: usize = 64;

/// Everything the tools operate on
pub struct McpContext {
    pub store: ProjectStore,
    pub hub: Arc<NotificationHub>,
    pub tasks: TaskProcessor,
    pub archive: ArchiveService,
    pub federation: Federation,
    pub rules: RuleFiles,
    pub bank: MemoryBank,
}

impl McpContext {
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let store = ProjectStore::new(data_dir.join(INDEX_FILE))
            .context("Failed to open project store")?;
        let archives = Arc::new(
            FilesystemArchiveStore::new(data_dir.join(BLOB_DIR))
                .context("Failed to create archive store")?,
        );
        let hub = Arc::new(NotificationHub::new(HUB_CAPACITY));

        Ok(Self {
            tasks: TaskProcessor::new(store.clone(), hub.clone()),
            archive: ArchiveService::new(
                store.clone(),
                archives,
                data_dir.join(ARCHIVE_DIR),
                hub.clone(),
            ),
            federation: Federation::new(data_dir.join(ARCHIVE_DIR)),
            rules: RuleFiles::new(data_dir.join(RULES_DIR)),
            bank: MemoryBank::new(data_dir.join(MEMORY_BANK_DIR)),
            store,
            hub,
        })
    }
}
