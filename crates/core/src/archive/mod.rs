// Project archives: the zip format and the export / import / merge /
// snapshot / rollback workflows built on it

pub mod bundle;
pub mod service;

pub use bundle::BundleEntry;
pub use service::{ArchiveService, ExportedArchive, MergeOptions, MergeReport, RollbackReport};

use crate::error::CacdError;
use crate::types::{EntityKind, Project, ProjectId, Record};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MANIFEST_FILE: &str = "project.json";
pub const FORMAT_VERSION: u32 = 1;

/// Describes the project an archive was exported from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    pub format_version: u32,
    pub project_id: ProjectId,
    pub name: String,
    pub description: Option<String>,
    pub origin: String,
    pub exported_at: DateTime<Utc>,
}

impl ArchiveManifest {
    pub fn for_project(project: &Project) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            project_id: project.id,
            name: project.name.clone(),
            description: project.description.clone(),
            origin: project.origin.clone(),
            exported_at: Utc::now(),
        }
    }
}

/// In-memory form of a project archive
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectArchive {
    pub manifest: Option<ArchiveManifest>,
    pub records: BTreeMap<EntityKind, Vec<Record>>,
}

impl ProjectArchive {
    pub fn records(&self, kind: EntityKind) -> &[Record] {
        self.records.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn counts(&self) -> BTreeMap<EntityKind, usize> {
        EntityKind::ALL
            .into_iter()
            .map(|kind| (kind, self.records(kind).len()))
            .collect()
    }

    /// Serialize to a zip with one pretty-printed JSON array per entity kind
    pub fn to_zip(&self) -> Result<Vec<u8>> {
        let mut entries = Vec::with_capacity(EntityKind::ALL.len() + 1);
        if let Some(manifest) = &self.manifest {
            let json =
                serde_json::to_vec_pretty(manifest).context("Failed to serialize manifest")?;
            entries.push(BundleEntry::new(MANIFEST_FILE, json));
        }
        for kind in EntityKind::ALL {
            let json = serde_json::to_vec_pretty(self.records(kind))
                .with_context(|| format!("Failed to serialize {}", kind.file_name()))?;
            entries.push(BundleEntry::new(kind.file_name(), json));
        }
        bundle::write_zip(entries)
    }

    /// Parse an archive. Missing entity files read as empty.
    pub fn from_zip(bytes: &[u8]) -> Result<Self> {
        let entries = bundle::read_zip(bytes)?;
        let find = |name: &str| entries.iter().find(|entry| entry.path == name);

        let manifest = match find(MANIFEST_FILE) {
            Some(entry) => Some(serde_json::from_slice(&entry.data).map_err(|e| {
                CacdError::invalid(format!("{} is malformed: {}", MANIFEST_FILE, e))
            })?),
            None => None,
        };

        let mut records = BTreeMap::new();
        for kind in EntityKind::ALL {
            let Some(entry) = find(kind.file_name()) else {
                continue;
            };
            records.insert(kind, parse_records(kind, &entry.data)?);
        }

        Ok(Self { manifest, records })
    }

    /// Fail with `InvalidInput` naming the first record that does not read
    /// as its kind's model
    pub fn validate(&self) -> Result<()> {
        for (kind, records) in &self.records {
            for (index, record) in records.iter().enumerate() {
                kind.check_record(record).map_err(|e| {
                    CacdError::invalid(format!(
                        "{} entry {} is not a valid {} record: {}",
                        kind.file_name(),
                        index,
                        kind,
                        e
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Copy of the archive with every record's `project_id` set to `project`
    pub fn rehomed(&self, project: ProjectId) -> Self {
        let records = self
            .records
            .iter()
            .map(|(kind, records)| {
                let rehomed = records
                    .iter()
                    .map(|record| {
                        let mut record = record.clone();
                        record.insert("project_id".to_string(), project.0.into());
                        record
                    })
                    .collect();
                (*kind, rehomed)
            })
            .collect();
        Self {
            manifest: self.manifest.clone(),
            records,
        }
    }
}

fn parse_records(kind: EntityKind, data: &[u8]) -> Result<Vec<Record>> {
    let values: Vec<serde_json::Value> = serde_json::from_slice(data).map_err(|e| {
        CacdError::invalid(format!("{} is not a JSON array: {}", kind.file_name(), e))
    })?;

    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| match value {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(CacdError::invalid(format!(
                "{} entry {} is not an object",
                kind.file_name(),
                index
            ))
            .into()),
        })
        .collect()
}
