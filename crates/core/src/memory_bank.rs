// Memory bank: a directory of Markdown knowledge files

use crate::archive::bundle::{self, BundleEntry};
use crate::error::CacdError;
use crate::reconcile::reconcile;
use crate::types::Record;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Serialize, Serializer};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const KNOWLEDGE_PACKAGES_DIR: &str = "knowledge_packages";
pub const ARCHIVE_DIR: &str = "archive";
pub const TASKS_DIR: &str = "tasks";
pub const CUSTOM_COMMANDS_DIR: &str = "custom_commands";
pub const CHANGELOG_FILE: &str = "CHANGELOG.md";
pub const AUDIT_LOG_FILE: &str = "auditLog.md";
pub const SYSTEM_PATTERNS_FILE: &str = "systemPatterns.md";

/// One line of a memory bank diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    New(String),
    Changed(String),
    Deleted(String),
}

impl std::fmt::Display for FileChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileChange::New(path) => write!(f, "NEW: {}", path),
            FileChange::Changed(path) => write!(f, "CHANGED: {}", path),
            FileChange::Deleted(path) => write!(f, "DELETED: {}", path),
        }
    }
}

impl Serialize for FileChange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BankMerge {
    pub dry_run: bool,
    pub changes: Vec<FileChange>,
}

#[derive(Debug, Clone)]
pub struct MemoryBank {
    root: PathBuf,
}

impl MemoryBank {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a bank-relative path; rejects escapes
    pub fn path(&self, relative: &str) -> Result<PathBuf> {
        Ok(self.root.join(bundle::safe_relative_path(relative)?))
    }

    /// Extract every entry of a zip into the bank
    pub fn import(&self, bytes: &[u8]) -> Result<Vec<String>> {
        let entries = bundle::read_zip(bytes)?;
        let written = bundle::extract_entries(&entries, &self.root)?;
        tracing::info!(files = written.len(), "Imported memory bank archive");
        Ok(written)
    }

    pub fn export(&self) -> Result<Vec<u8>> {
        bundle::zip_directory(&self.root, |_| true)
    }

    /// Diff an archive against the bank by content hash; unless `dry_run`,
    /// new and changed files are copied in. Deletions are only reported.
    pub fn merge(&self, bytes: &[u8], dry_run: bool) -> Result<BankMerge> {
        let incoming = bundle::read_zip(bytes)?;
        let current = bundle::collect_files(&self.root, |_| true)?;

        let current_index = hash_index(&current);
        let incoming_index = hash_index(&incoming);
        let forward = reconcile(&current_index, &incoming_index, "path")?;
        let backward = reconcile(&incoming_index, &current_index, "path")?;

        let mut changes = Vec::new();
        changes.extend(forward.added.iter().map(|r| FileChange::New(path_of(r))));
        changes.extend(forward.updated.iter().map(|r| FileChange::Changed(path_of(r))));
        changes.extend(backward.added.iter().map(|r| FileChange::Deleted(path_of(r))));

        if !dry_run {
            let to_write: Vec<BundleEntry> = incoming
                .into_iter()
                .filter(|entry| {
                    changes.iter().any(|change| match change {
                        FileChange::New(path) | FileChange::Changed(path) => *path == entry.path,
                        FileChange::Deleted(_) => false,
                    })
                })
                .collect();
            bundle::extract_entries(&to_write, &self.root)?;
            tracing::info!(files = to_write.len(), "Merged memory bank archive");
        }

        Ok(BankMerge { dry_run, changes })
    }

    /// Replace the bank with the archive's content
    pub fn rollback(&self, bytes: &[u8]) -> Result<Vec<String>> {
        let entries = bundle::read_zip(bytes)?;
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root).context("Failed to clear memory bank")?;
        }
        std::fs::create_dir_all(&self.root).context("Failed to create memory bank")?;
        let restored = bundle::extract_entries(&entries, &self.root)?;
        tracing::warn!(files = restored.len(), "Memory bank rolled back");
        Ok(restored)
    }

    /// Write every file of the archive, overwriting existing ones
    pub fn batch(&self, bytes: &[u8]) -> Result<Vec<String>> {
        let entries = bundle::read_zip(bytes)?;
        bundle::extract_entries(&entries, &self.root)
    }

    /// `[YYYY-mm-dd HH:MM] [INFO] [user] message` in the audit log
    pub fn append_audit(&self, user_id: Option<&str>, message: &str) -> Result<()> {
        let line = format!(
            "[{}] [INFO] [{}] {}\n",
            Utc::now().format("%Y-%m-%d %H:%M"),
            user_id.unwrap_or("system"),
            message
        );
        self.append_line(AUDIT_LOG_FILE, &line)
    }

    /// `[YYYY-mm-dd] message` in the changelog
    pub fn append_changelog(&self, message: &str) -> Result<()> {
        let line = format!("[{}] {}\n", Utc::now().format("%Y-%m-%d"), message);
        self.append_line(CHANGELOG_FILE, &line)
    }

    /// Names of the files directly inside a bank subdirectory, sorted
    pub fn list_files(&self, subdir: &str) -> Result<Vec<String>> {
        let dir = self.path(subdir)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for item in std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to read {}", dir.display()))?
        {
            let item = item.context("Failed to read directory entry")?;
            if item.file_type().context("Failed to stat entry")?.is_file() {
                names.push(item.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn read_text(&self, relative: &str) -> Result<String> {
        let path = self.path(relative)?;
        if !path.is_file() {
            return Err(CacdError::not_found(relative.to_string()).into());
        }
        std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    pub fn write_text(&self, relative: &str, content: &str) -> Result<()> {
        let path = self.path(relative)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    fn append_line(&self, relative: &str, line: &str) -> Result<()> {
        std::fs::create_dir_all(&self.root).context("Failed to create memory bank")?;
        let path = self.path(relative)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("Failed to append to {}", path.display()))
    }
}

/// `{path, hash}` records for reconciling file sets by path
fn hash_index(entries: &[BundleEntry]) -> Vec<Record> {
    entries
        .iter()
        .map(|entry| {
            let mut record = Record::new();
            record.insert("path".to_string(), entry.path.clone().into());
            record.insert(
                "hash".to_string(),
                crate::types::BlobHash::from_bytes(&entry.data).0.into(),
            );
            record
        })
        .collect()
}

fn path_of(record: &Record) -> String {
    record
        .get("path")
        .and_then(|value| value.as_str())
        .unwrap_or_default()
        .to_string()
}
