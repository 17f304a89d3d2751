// Cursor-style MDC rule files

pub mod files;
pub mod mdc;

pub use files::{RuleEdit, RuleEditResult, RuleEditStatus, RuleFile, RuleFiles};
pub use mdc::{MdcDocument, MdcError};
