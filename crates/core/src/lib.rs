// Core of the CACD project context server: project store, archive
// reconciliation, memory bank, rules and custom commands

pub mod archive;
pub mod commands;
pub mod docs;
pub mod error;
pub mod federation;
pub mod history;
pub mod memory_bank;
pub mod notify;
pub mod projects;
pub mod reconcile;
pub mod rules;
pub mod scheduler;
pub mod storage;
pub mod tasks;
pub mod types;

pub use error::{find_cacd_error, CacdError};
pub use types::*;
