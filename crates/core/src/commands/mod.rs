// Custom commands: YAML definitions in the memory bank dispatched to
// registered actions

pub mod actions;
pub mod definition;
pub mod registry;

pub use definition::{CommandDefinition, ParameterSpec, ParameterType};
pub use registry::{
    ActionContext, ActionRegistry, CommandAction, CommandOutcome, CommandRunner, TypedAction,
};
