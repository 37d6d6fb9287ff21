//! Application layer - stores and sync orchestration.
//!
//! This layer owns the process-wide state (targets, history, tab document)
//! and drives the remote clients.

pub mod config_store;
pub mod formatter;
pub mod result_log;
pub mod sync_orchestrator;
pub mod tab_store;

pub use config_store::RemoteConfigStore;
pub use formatter::{
    format_groups_table, format_json, format_push_all, format_results_table, format_sync_report,
    format_targets_table, redact_secrets, OutputFormat,
};
pub use result_log::{ClearScope, SyncResultLog};
pub use sync_orchestrator::{Resolution, SyncOrchestrator, SyncReport};
pub use tab_store::TabDataStore;
