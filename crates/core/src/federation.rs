// Per-origin federation drop-box under the archive directory

use crate::archive::bundle::{self, BundleEntry};
use crate::error::CacdError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const BACKLOG_FILE: &str = "federation_backlog.md";
pub const FEEDBACK_FILE: &str = "feedback.md";

/// Kind of file shared between origins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FederationKind {
    KnowledgePackages,
    CustomCommands,
    Templates,
}

impl FederationKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            FederationKind::KnowledgePackages => "knowledge_packages",
            FederationKind::CustomCommands => "custom_commands",
            FederationKind::Templates => "templates",
        }
    }
}

impl std::fmt::Display for FederationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl std::str::FromStr for FederationKind {
    type Err = CacdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "knowledge" | "knowledge_packages" => Ok(FederationKind::KnowledgePackages),
            "command" | "commands" | "custom_commands" => Ok(FederationKind::CustomCommands),
            "template" | "templates" => Ok(FederationKind::Templates),
            other => Err(CacdError::invalid(format!("unknown federation kind: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Federation {
    root: PathBuf,
}

impl Federation {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn origin_dir(&self, origin: &str) -> Result<PathBuf> {
        Ok(self.root.join(bundle::safe_name(origin)?))
    }

    fn file_path(&self, origin: &str, kind: FederationKind, file: &str) -> Result<PathBuf> {
        Ok(self
            .origin_dir(origin)?
            .join(kind.dir_name())
            .join(bundle::safe_name(file)?))
    }

    /// Upload a file into an origin's drop-box, replacing any previous copy
    pub fn push(&self, origin: &str, kind: FederationKind, file: &str, data: &[u8]) -> Result<PathBuf> {
        let path = self.file_path(origin, kind, file)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&path, data).with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::info!(origin, kind = %kind, file, size = data.len(), "Federation push");
        Ok(path)
    }

    pub fn pull(&self, origin: &str, kind: FederationKind, file: &str) -> Result<Vec<u8>> {
        let path = self.file_path(origin, kind, file)?;
        if !path.is_file() {
            return Err(CacdError::not_found(format!("{} {}/{}", kind, origin, file)).into());
        }
        let data = std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;

        tracing::info!(origin, kind = %kind, file, "Federation pull");
        Ok(data)
    }

    /// File names of one kind for an origin, sorted
    pub fn list(&self, origin: &str, kind: FederationKind) -> Result<Vec<String>> {
        let dir = self.origin_dir(origin)?.join(kind.dir_name());
        let mut names: Vec<String> = bundle::collect_files(&dir, |relative| {
            relative.components().count() == 1
        })?
        .into_iter()
        .map(|entry| entry.path)
        .collect();
        names.sort();
        Ok(names)
    }

    pub fn knowledge_package(&self, origin: &str, name: &str) -> Result<String> {
        let data = self.pull(origin, FederationKind::KnowledgePackages, name)?;
        String::from_utf8(data)
            .map_err(|_| CacdError::invalid(format!("{} is not UTF-8 text", name)).into())
    }

    pub fn backlog(&self, origin: &str) -> Result<String> {
        self.read_origin_text(origin, BACKLOG_FILE, "backlog")
    }

    pub fn feedback(&self, origin: &str) -> Result<String> {
        self.read_origin_text(origin, FEEDBACK_FILE, "feedback")
    }

    /// Zip an origin's whole tree to `<root>/<origin>/export_<origin>.zip`.
    ///
    /// Entry paths start with the origin name. Earlier exports are left out.
    pub fn export_origin(&self, origin: &str) -> Result<PathBuf> {
        let dir = self.origin_dir(origin)?;
        if !dir.is_dir() {
            return Err(CacdError::not_found(format!("origin {}", origin)).into());
        }

        let entries: Vec<BundleEntry> = bundle::collect_files(&dir, |relative| !is_export(relative))?
            .into_iter()
            .map(|entry| BundleEntry::new(format!("{}/{}", origin, entry.path), entry.data))
            .collect();
        let bytes = bundle::write_zip(entries)?;

        let out = dir.join(format!("export_{}.zip", origin));
        std::fs::write(&out, bytes).with_context(|| format!("Failed to write {}", out.display()))?;
        tracing::info!(origin, path = %out.display(), "Exported origin");
        Ok(out)
    }

    fn read_origin_text(&self, origin: &str, file: &str, what: &str) -> Result<String> {
        let path = self.origin_dir(origin)?.join(file);
        if !path.is_file() {
            return Err(CacdError::not_found(format!("{} of origin {}", what, origin)).into());
        }
        std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    }
}

fn is_export(relative: &Path) -> bool {
    relative.components().count() == 1
        && relative
            .file_name()
            .map(|name| {
                let name = name.to_string_lossy();
                name.starts_with("export_") && name.ends_with(".zip")
            })
            .unwrap_or(false)
}
