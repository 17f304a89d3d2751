use super::actions;
use super::definition::CommandDefinition;
use crate::archive::bundle;
use crate::error::CacdError;
use crate::memory_bank::{MemoryBank, CUSTOM_COMMANDS_DIR};
use crate::types::Record;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// What an action may touch while it runs
pub struct ActionContext<'a> {
    pub bank: &'a MemoryBank,
}

/// A named handler custom commands can dispatch to
pub trait CommandAction: Send + Sync {
    fn name(&self) -> &str;

    fn invoke(&self, ctx: &ActionContext<'_>, params: &Record) -> Result<Value>;
}

/// An action with a typed input and output contract.
///
/// Parameters are deserialized into `Input`; a mismatch is an invalid-input
/// error. `Output` is returned to the caller as JSON.
pub trait TypedAction: Send + Sync {
    const NAME: &'static str;
    type Input: DeserializeOwned;
    type Output: Serialize;

    fn run(&self, ctx: &ActionContext<'_>, input: Self::Input) -> Result<Self::Output>;
}

impl<T: TypedAction> CommandAction for T {
    fn name(&self) -> &str {
        T::NAME
    }

    fn invoke(&self, ctx: &ActionContext<'_>, params: &Record) -> Result<Value> {
        let input: T::Input = serde_json::from_value(Value::Object(params.clone()))
            .map_err(|e| CacdError::invalid(format!("{}: {}", T::NAME, e)))?;
        let output = self.run(ctx, input)?;
        serde_json::to_value(output).with_context(|| format!("Failed to serialize {} output", T::NAME))
    }
}

#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn CommandAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in action
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(actions::Echo);
        registry.register(actions::ArchiveKnowledgePackage);
        registry.register(actions::SearchKnowledge);
        registry.register(actions::BatchUpdateStatus);
        registry.register(actions::GenerateReport);
        registry.register(actions::AnalyzeChangelog);
        registry.register(actions::GenerateBestPractices);
        registry.register(actions::ReviewChanges);
        registry
    }

    /// Add an action, replacing any with the same name
    pub fn register<A: CommandAction + 'static>(&mut self, action: A) {
        let name = action.name().to_string();
        tracing::debug!(action = %name, "Registering command action");
        self.actions.insert(name, Arc::new(action));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CommandAction>> {
        self.actions.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Response of a custom command invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutcome {
    pub status: String,
    pub command: String,
    pub description: Option<String>,
    pub parameters: Record,
    pub action: Option<String>,
    pub result: Option<Value>,
}

/// Loads command definitions from the memory bank and runs them
pub struct CommandRunner {
    bank: MemoryBank,
    registry: ActionRegistry,
}

impl CommandRunner {
    pub fn new(bank: MemoryBank, registry: ActionRegistry) -> Self {
        Self { bank, registry }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn load_definition(&self, name: &str) -> Result<CommandDefinition> {
        let name = bundle::safe_name(name)?;
        let relative = format!("{}/{}.yaml", CUSTOM_COMMANDS_DIR, name);
        let text = self
            .bank
            .read_text(&relative)
            .map_err(|_| CacdError::not_found(format!("custom command {}", name)))?;
        CommandDefinition::from_yaml(&text, name)
    }

    /// Every readable definition, sorted by name
    pub fn list_definitions(&self) -> Result<Vec<CommandDefinition>> {
        let mut definitions = Vec::new();
        for file in self.bank.list_files(CUSTOM_COMMANDS_DIR)? {
            let Some(name) = file.strip_suffix(".yaml") else {
                continue;
            };
            match self.load_definition(name) {
                Ok(definition) => definitions.push(definition),
                Err(e) => tracing::warn!(command = name, error = %e, "Skipping command definition"),
            }
        }
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(definitions)
    }

    pub fn run(&self, name: &str, params: Record) -> Result<CommandOutcome> {
        let definition = self.load_definition(name)?;
        let bound = definition
            .bind(&params)
            .map_err(|errors| CacdError::invalid(errors.join("; ")))?;

        let result = match &definition.action {
            None => None,
            Some(action_name) => {
                let action = self
                    .registry
                    .get(action_name)
                    .ok_or_else(|| CacdError::invalid(format!("unknown action: {}", action_name)))?;
                let ctx = ActionContext { bank: &self.bank };
                Some(action.invoke(&ctx, &bound)?)
            }
        };

        tracing::info!(command = name, action = ?definition.action, "Custom command executed");
        Ok(CommandOutcome {
            status: "ok".to_string(),
            command: name.to_string(),
            description: definition.description,
            parameters: params,
            action: definition.action,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::find_cacd_error;
    use serde::Deserialize;
    use serde_json::json;
    use tempfile::TempDir;

    struct Shout;

    #[derive(Deserialize)]
    struct ShoutInput {
        text: String,
    }

    impl TypedAction for Shout {
        const NAME: &'static str = "shout_action";
        type Input = ShoutInput;
        type Output = String;

        fn run(&self, _ctx: &ActionContext<'_>, input: ShoutInput) -> Result<String> {
            Ok(input.text.to_uppercase())
        }
    }

    fn runner() -> (TempDir, CommandRunner) {
        let dir = TempDir::new().unwrap();
        let bank = MemoryBank::new(dir.path().join("memory-bank"));
        let mut registry = ActionRegistry::with_builtins();
        registry.register(Shout);
        (dir, CommandRunner::new(bank, registry))
    }

    fn define(runner: &CommandRunner, name: &str, yaml: &str) {
        runner
            .bank
            .write_text(&format!("{}/{}.yaml", CUSTOM_COMMANDS_DIR, name), yaml)
            .unwrap();
    }

    fn params(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = ActionRegistry::with_builtins();
        assert_eq!(registry.names().len(), 8);
        assert!(registry.get("echo_action").is_some());
        assert!(registry.get("ai_review_changes_action").is_some());
    }

    #[test]
    fn test_run_dispatches_to_action() {
        let (_dir, runner) = runner();
        define(&runner, "shout", "description: Shout it\naction: shout_action\n");

        let outcome = runner.run("shout", params(json!({"text": "hi"}))).unwrap();
        assert_eq!(outcome.status, "ok");
        assert_eq!(outcome.description.as_deref(), Some("Shout it"));
        assert_eq!(outcome.result, Some(json!("HI")));
        assert_eq!(outcome.parameters["text"], "hi");
    }

    #[test]
    fn test_command_without_action_has_null_result() {
        let (_dir, runner) = runner();
        define(&runner, "noop", "description: Nothing\n");
        let outcome = runner.run("noop", Record::new()).unwrap();
        assert!(outcome.result.is_none());
        assert!(outcome.action.is_none());
    }

    #[test]
    fn test_errors_map_to_domain_kinds() {
        let (_dir, runner) = runner();
        let err = runner.run("missing", Record::new()).unwrap_err();
        assert!(matches!(find_cacd_error(&err), Some(CacdError::NotFound(_))));

        define(&runner, "bogus", "action: nope_action\n");
        let err = runner.run("bogus", Record::new()).unwrap_err();
        assert!(matches!(find_cacd_error(&err), Some(CacdError::InvalidInput(_))));

        define(&runner, "typed", "action: shout_action\n");
        let err = runner.run("typed", params(json!({"text": 3}))).unwrap_err();
        assert!(matches!(find_cacd_error(&err), Some(CacdError::InvalidInput(_))));

        define(
            &runner,
            "strict",
            "parameters:\n  - name: msg\n    required: true\naction: echo_action\n",
        );
        let err = runner.run("strict", Record::new()).unwrap_err();
        assert!(err.to_string().contains("msg"));
    }

    #[test]
    fn test_list_definitions() {
        let (_dir, runner) = runner();
        define(&runner, "b", "description: B\n");
        define(&runner, "a", "description: A\n");
        let names: Vec<String> = runner
            .list_definitions()
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
