//! Infrastructure layer - external adapters (database, filesystem, HTTP).
//!
//! This layer handles all I/O operations and external dependencies.

pub mod config;
pub mod gist_client;
pub mod http;
pub mod local_storage;
pub mod webdav_client;

pub use config::{ensure_config_exists, load_config, load_config_from_file};
pub use gist_client::GistClient;
pub use http::build_client;
pub use local_storage::LocalStorage;
pub use webdav_client::WebDavClient;
