// MDC rule files: YAML frontmatter between `---` lines, then a Markdown body

use crate::types::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DELIMITER: &str = "---";

#[derive(Debug, Error)]
pub enum MdcError {
    #[error("missing frontmatter delimiters")]
    MissingFrontmatter,

    #[error("invalid frontmatter: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),

    #[error("frontmatter must be a mapping")]
    NotAMapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MdcDocument {
    #[serde(default)]
    pub meta: Record,
    #[serde(default)]
    pub body: String,
}

impl MdcDocument {
    pub fn new(meta: Record, body: impl Into<String>) -> Self {
        Self {
            meta,
            body: body.into(),
        }
    }

    pub fn parse(content: &str) -> Result<Self, MdcError> {
        let mut parts = content.splitn(3, DELIMITER);
        let (Some(_), Some(frontmatter), Some(body)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(MdcError::MissingFrontmatter);
        };

        let meta = if frontmatter.trim().is_empty() {
            Record::new()
        } else {
            match serde_yaml::from_str::<Value>(frontmatter)? {
                Value::Object(map) => map,
                Value::Null => Record::new(),
                _ => return Err(MdcError::NotAMapping),
            }
        };

        Ok(Self {
            meta,
            body: body.trim().to_string(),
        })
    }

    pub fn render(&self) -> Result<String, MdcError> {
        let yaml = if self.meta.is_empty() {
            String::new()
        } else {
            serde_yaml::to_string(&self.meta)?
        };
        Ok(format!(
            "{DELIMITER}\n{}\n{DELIMITER}\n{}\n",
            yaml.trim_end(),
            self.body.trim()
        ))
    }

    pub fn description(&self) -> Option<&str> {
        self.meta.get("description").and_then(Value::as_str)
    }

    pub fn validate(&self) -> Vec<String> {
        validate(&self.meta)
    }
}

/// Problems with a rule's metadata; empty when valid
pub fn validate(meta: &Record) -> Vec<String> {
    let mut errors = Vec::new();
    match meta.get("description") {
        Some(Value::String(s)) if !s.is_empty() => {}
        _ => errors.push("meta.description (string) is required".to_string()),
    }
    if let Some(value) = meta.get("alwaysApply") {
        if !value.is_boolean() {
            errors.push("meta.alwaysApply must be a boolean".to_string());
        }
    }
    if let Some(value) = meta.get("globs") {
        if !(value.is_string() || value.is_array()) {
            errors.push("meta.globs must be a string or a list".to_string());
        }
    }
    errors
}
