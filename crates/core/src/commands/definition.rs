use crate::error::CacdError;
use crate::types::Record;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared type of a command parameter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    #[default]
    #[serde(alias = "str")]
    String,
    #[serde(alias = "float")]
    Number,
    #[serde(alias = "int")]
    Integer,
    #[serde(alias = "bool")]
    Boolean,
    #[serde(alias = "array")]
    List,
    #[serde(alias = "dict", alias = "map")]
    Object,
    Any,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: ParameterType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A custom command as declared in `custom_commands/<name>.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    /// Registered action to run, if any
    #[serde(default)]
    pub action: Option<String>,
}

impl CommandDefinition {
    /// Parse a definition; a missing `name` falls back to `fallback_name`
    pub fn from_yaml(text: &str, fallback_name: &str) -> Result<Self> {
        let mut value: Value = serde_yaml::from_str(text)
            .map_err(|e| CacdError::invalid(format!("command {}: {}", fallback_name, e)))?;
        if let Value::Object(map) = &mut value {
            map.entry("name")
                .or_insert_with(|| Value::String(fallback_name.to_string()));
        }
        serde_json::from_value(value)
            .map_err(|e| CacdError::invalid(format!("command {}: {}", fallback_name, e)).into())
    }

    /// Check supplied parameters against the declarations.
    ///
    /// Defaults fill in missing values, numeric and boolean strings are
    /// coerced, and undeclared parameters pass through unchanged.
    pub fn bind(&self, supplied: &Record) -> Result<Record, Vec<String>> {
        let mut bound = supplied.clone();
        let mut errors = Vec::new();

        for spec in &self.parameters {
            let value = match supplied.get(&spec.name).filter(|v| !v.is_null()) {
                Some(value) => value.clone(),
                None => match &spec.default {
                    Some(default) => default.clone(),
                    None if spec.required => {
                        errors.push(format!("Required parameter '{}' not provided", spec.name));
                        continue;
                    }
                    None => continue,
                },
            };

            match coerce(spec.param_type, value) {
                Some(value) => {
                    bound.insert(spec.name.clone(), value);
                }
                None => errors.push(format!(
                    "Parameter '{}' must be of type {:?}",
                    spec.name, spec.param_type
                )),
            }
        }

        if errors.is_empty() {
            Ok(bound)
        } else {
            Err(errors)
        }
    }
}

fn coerce(param_type: ParameterType, value: Value) -> Option<Value> {
    match (param_type, value) {
        (ParameterType::Any, value) => Some(value),
        (ParameterType::String, value @ Value::String(_)) => Some(value),
        (ParameterType::String, value @ (Value::Number(_) | Value::Bool(_))) => {
            Some(Value::String(value.to_string()))
        }
        (ParameterType::Number, value @ Value::Number(_)) => Some(value),
        (ParameterType::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        (ParameterType::Integer, Value::Number(n)) => n.as_i64().map(Value::from),
        (ParameterType::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
        (ParameterType::Boolean, value @ Value::Bool(_)) => Some(value),
        (ParameterType::Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(Value::Bool(true)),
            "false" | "no" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        (ParameterType::List, value @ Value::Array(_)) => Some(value),
        (ParameterType::Object, value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const YAML: &str = r#"
description: Update task status
action: batch_update_status_action
parameters:
  - name: files
    type: list
    required: true
  - name: status
    type: str
    default: done
  - name: limit
    type: int
"#;

    fn params(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_from_yaml_uses_fallback_name() {
        let def = CommandDefinition::from_yaml(YAML, "update_status").unwrap();
        assert_eq!(def.name, "update_status");
        assert_eq!(def.action.as_deref(), Some("batch_update_status_action"));
        assert_eq!(def.parameters[0].param_type, ParameterType::List);
        assert_eq!(def.parameters[1].param_type, ParameterType::String);
        assert_eq!(def.parameters[2].param_type, ParameterType::Integer);
    }

    #[test]
    fn test_bind_applies_defaults_and_coerces() {
        let def = CommandDefinition::from_yaml(YAML, "update_status").unwrap();
        let bound = def
            .bind(&params(json!({"files": ["a.md"], "limit": "5", "extra": 1})))
            .unwrap();
        assert_eq!(bound["status"], "done");
        assert_eq!(bound["limit"], 5);
        assert_eq!(bound["extra"], 1);
    }

    #[test]
    fn test_bind_collects_every_error() {
        let def = CommandDefinition::from_yaml(YAML, "update_status").unwrap();
        let errors = def.bind(&params(json!({"limit": "many"}))).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("files"));
        assert!(errors[1].contains("limit"));
    }

    #[test]
    fn test_invalid_yaml_is_invalid_input() {
        let err = CommandDefinition::from_yaml("parameters: [", "x").unwrap_err();
        assert!(matches!(
            crate::error::find_cacd_error(&err),
            Some(CacdError::InvalidInput(_))
        ));
    }
}
