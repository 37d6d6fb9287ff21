//! Domain layer - core types and error taxonomy.
//!
//! This layer contains the tab document, target configuration and sync
//! history types, plus the `RemoteClient` port implemented by infrastructure.

pub mod error;
pub mod models;
pub mod remote;
pub mod sync;

pub use error::{AppError, ErrorKind, Result};
pub use models::{TabEntry, TabGroup, TabGroupDocument};
pub use remote::{
    GistProvider, PushReceipt, PushRequest, RemoteBackend, RemoteClient, RemoteKind,
    RemoteSnapshot, RemoteTargetConfig, TargetKey,
};
pub use sync::{AppConfig, SyncDirection, SyncOutcome, SyncResultEntry};
