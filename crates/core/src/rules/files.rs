use super::mdc::MdcDocument;
use crate::archive::bundle::{self, BundleEntry};
use crate::error::CacdError;
use crate::types::Record;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const RULE_EXTENSION: &str = "mdc";

/// A rule file with its path relative to the rules directory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleFile {
    pub path: String,
    pub meta: Record,
    pub body: String,
}

/// One entry of a bulk rule update: with `path` the file is rewritten,
/// otherwise a new file is created
#[derive(Debug, Clone, Deserialize)]
pub struct RuleEdit {
    #[serde(default)]
    pub meta: Record,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleEditStatus {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleEditResult {
    pub status: RuleEditStatus,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct RuleFiles {
    root: PathBuf,
}

impl RuleFiles {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = bundle::safe_relative_path(path)?;
        if relative.extension().and_then(|e| e.to_str()) != Some(RULE_EXTENSION) {
            return Err(CacdError::invalid(format!("not an .{} file: {}", RULE_EXTENSION, path)).into());
        }
        Ok(self.root.join(relative))
    }

    /// Every parsable rule below the rules directory, sorted by path
    pub fn list(&self) -> Result<Vec<RuleFile>> {
        let mut rules = Vec::new();
        for entry in bundle::collect_files(&self.root, is_rule_file)? {
            let parsed = std::str::from_utf8(&entry.data)
                .map_err(anyhow::Error::from)
                .and_then(|text| MdcDocument::parse(text).map_err(anyhow::Error::from));
            match parsed {
                Ok(doc) => rules.push(RuleFile {
                    path: entry.path,
                    meta: doc.meta,
                    body: doc.body,
                }),
                Err(e) => tracing::warn!(path = %entry.path, error = %e, "Skipping unparsable rule"),
            }
        }
        Ok(rules)
    }

    pub fn get(&self, path: &str) -> Result<RuleFile> {
        let full = self.resolve(path)?;
        if !full.is_file() {
            return Err(CacdError::not_found(format!("rule {}", path)).into());
        }
        let text = std::fs::read_to_string(&full)
            .with_context(|| format!("Failed to read {}", full.display()))?;
        let doc = MdcDocument::parse(&text)
            .map_err(|e| CacdError::invalid(format!("rule {}: {}", path, e)))?;
        Ok(RuleFile {
            path: path.to_string(),
            meta: doc.meta,
            body: doc.body,
        })
    }

    /// Write a new rule file; the name defaults to the description with
    /// spaces replaced by underscores
    pub fn create(&self, meta: Record, body: &str, filename: Option<&str>) -> Result<String> {
        let doc = validated(meta, body)?;
        let filename = match filename {
            Some(name) => name.to_string(),
            None => default_filename(&doc),
        };

        let full = self.resolve(&filename)?;
        if full.exists() {
            return Err(CacdError::conflict(format!("rule {}", filename)).into());
        }
        self.write(&full, &doc)?;

        tracing::info!(path = %filename, "Rule created");
        Ok(filename)
    }

    pub fn update(&self, path: &str, meta: Record, body: &str) -> Result<()> {
        let doc = validated(meta, body)?;
        let full = self.resolve(path)?;
        if !full.is_file() {
            return Err(CacdError::not_found(format!("rule {}", path)).into());
        }
        self.write(&full, &doc)?;

        tracing::info!(path, "Rule updated");
        Ok(())
    }

    /// Validate every edit first, then apply them in order
    pub fn apply(&self, edits: Vec<RuleEdit>) -> Result<Vec<RuleEditResult>> {
        for edit in &edits {
            let errors = super::mdc::validate(&edit.meta);
            if !errors.is_empty() {
                let name = edit
                    .meta
                    .get("description")
                    .and_then(|v| v.as_str())
                    .or(edit.path.as_deref())
                    .unwrap_or("rule");
                return Err(CacdError::invalid(format!("{}: {}", name, errors.join("; "))).into());
            }
        }

        let mut results = Vec::with_capacity(edits.len());
        for edit in edits {
            let result = match edit.path {
                Some(path) if !path.is_empty() => {
                    self.update(&path, edit.meta, &edit.body)?;
                    RuleEditResult {
                        status: RuleEditStatus::Updated,
                        path,
                    }
                }
                _ => RuleEditResult {
                    status: RuleEditStatus::Created,
                    path: self.create(edit.meta, &edit.body, edit.filename.as_deref())?,
                },
            };
            results.push(result);
        }
        Ok(results)
    }

    pub fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if !full.is_file() {
            return Err(CacdError::not_found(format!("rule {}", path)).into());
        }
        std::fs::remove_file(&full).with_context(|| format!("Failed to delete {}", full.display()))?;

        tracing::info!(path, "Rule deleted");
        Ok(())
    }

    pub fn export_zip(&self) -> Result<Vec<u8>> {
        bundle::zip_directory(&self.root, is_rule_file)
    }

    /// Write every `.mdc` entry of a zip, overwriting; returns how many
    pub fn import_zip(&self, bytes: &[u8]) -> Result<usize> {
        let entries: Vec<BundleEntry> = bundle::read_zip(bytes)?
            .into_iter()
            .filter(|entry| is_rule_file(Path::new(&entry.path)))
            .collect();
        let written = bundle::extract_entries(&entries, &self.root)?;

        tracing::info!(count = written.len(), "Imported rules");
        Ok(written.len())
    }

    fn write(&self, full: &Path, doc: &MdcDocument) -> Result<()> {
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let text = doc
            .render()
            .map_err(|e| CacdError::invalid(format!("cannot render rule: {}", e)))?;
        std::fs::write(full, text).with_context(|| format!("Failed to write {}", full.display()))
    }
}

fn is_rule_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(RULE_EXTENSION)
}

fn validated(meta: Record, body: &str) -> Result<MdcDocument> {
    let doc = MdcDocument::new(meta, body);
    let errors = doc.validate();
    if !errors.is_empty() {
        return Err(CacdError::invalid(errors.join("; ")).into());
    }
    Ok(doc)
}

fn default_filename(doc: &MdcDocument) -> String {
    format!(
        "{}.{}",
        doc.description().unwrap_or("rule").replace(' ', "_"),
        RULE_EXTENSION
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::find_cacd_error;
    use serde_json::json;
    use tempfile::TempDir;

    fn meta(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn rules() -> (TempDir, RuleFiles) {
        let dir = TempDir::new().unwrap();
        let files = RuleFiles::new(dir.path().join("rules"));
        (dir, files)
    }

    #[test]
    fn test_create_list_update_delete() {
        let (_dir, files) = rules();
        let path = files
            .create(meta(json!({"description": "Prefer iterators"})), "Use them.", None)
            .unwrap();
        assert_eq!(path, "Prefer_iterators.mdc");

        files
            .create(meta(json!({"description": "Nested"})), "x", Some("lang/rust.mdc"))
            .unwrap();
        let listed = files.list().unwrap();
        let paths: Vec<&str> = listed.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["Prefer_iterators.mdc", "lang/rust.mdc"]);

        files
            .update(&path, meta(json!({"description": "Prefer iterators", "alwaysApply": true})), "Always.")
            .unwrap();
        let rule = files.get(&path).unwrap();
        assert_eq!(rule.meta["alwaysApply"], true);
        assert_eq!(rule.body, "Always.");

        files.delete(&path).unwrap();
        let err = files.delete(&path).unwrap_err();
        assert!(matches!(find_cacd_error(&err), Some(CacdError::NotFound(_))));
    }

    #[test]
    fn test_invalid_and_duplicate_rules_are_rejected() {
        let (_dir, files) = rules();
        let err = files.create(meta(json!({})), "x", None).unwrap_err();
        assert!(matches!(find_cacd_error(&err), Some(CacdError::InvalidInput(_))));

        files.create(meta(json!({"description": "a"})), "x", None).unwrap();
        let err = files.create(meta(json!({"description": "a"})), "y", None).unwrap_err();
        assert!(matches!(find_cacd_error(&err), Some(CacdError::Conflict(_))));

        assert!(files.get("../outside.mdc").is_err());
        assert!(files.get("notes.txt").is_err());
    }

    #[test]
    fn test_apply_validates_before_writing() {
        let (_dir, files) = rules();
        let edits = vec![
            RuleEdit {
                meta: meta(json!({"description": "good"})),
                body: "b".to_string(),
                filename: None,
                path: None,
            },
            RuleEdit {
                meta: meta(json!({"globs": 1})),
                body: String::new(),
                filename: None,
                path: None,
            },
        ];
        assert!(files.apply(edits).is_err());
        assert!(files.list().unwrap().is_empty());

        let results = files
            .apply(vec![RuleEdit {
                meta: meta(json!({"description": "good"})),
                body: "b".to_string(),
                filename: Some("good.mdc".to_string()),
                path: None,
            }])
            .unwrap();
        assert_eq!(results[0].status, RuleEditStatus::Created);
    }

    #[test]
    fn test_unparsable_files_are_skipped() {
        let (dir, files) = rules();
        std::fs::create_dir_all(dir.path().join("rules")).unwrap();
        std::fs::write(dir.path().join("rules/broken.mdc"), "no frontmatter").unwrap();
        std::fs::write(dir.path().join("rules/readme.txt"), "ignored").unwrap();
        assert!(files.list().unwrap().is_empty());
    }

    #[test]
    fn test_export_then_import_into_another_dir() {
        let (dir, files) = rules();
        files.create(meta(json!({"description": "one"})), "1", None).unwrap();
        let bytes = files.export_zip().unwrap();

        let other = RuleFiles::new(dir.path().join("other"));
        assert_eq!(other.import_zip(&bytes).unwrap(), 1);
        assert_eq!(other.get("one.mdc").unwrap().body, "1");
    }
}
