//! CLI interface using clap.
//!
//! Provides command-line arguments and subcommands for the tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::application::OutputFormat;
use crate::domain::{GistProvider, RemoteKind};

/// tabsync - Sync browser tab groups to GitHub/Gitee gists and WebDAV servers.
///
/// Typical flow: add-gist --id home --token <t> | push gist home | push-all
#[derive(Parser, Debug)]
#[command(name = "tabsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format: table or json.
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Use this configuration file instead of ~/.tabsync/config.toml.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List configured sync targets.
    Targets {
        /// Only show targets of this kind (gist, webdav).
        #[arg(short, long)]
        kind: Option<RemoteKind>,
    },

    /// Add or update a gist target.
    AddGist {
        /// Target id, unique among gist targets.
        #[arg(long)]
        id: String,

        /// Personal access token with gist scope.
        #[arg(long)]
        token: String,

        /// Gist service: github or gitee.
        #[arg(long, default_value = "github")]
        provider: GistProvider,

        /// Existing gist to sync with (a new one is created on first push).
        #[arg(long)]
        gist_id: Option<String>,

        /// Display name.
        #[arg(long)]
        name: Option<String>,

        /// Keep the target out of push-all.
        #[arg(long)]
        disabled: bool,
    },

    /// Add or update a WebDAV target.
    AddWebdav {
        /// Target id, unique among WebDAV targets.
        #[arg(long)]
        id: String,

        /// Server base URL, e.g. https://dav.example.com/remote.php/webdav.
        #[arg(long)]
        url: String,

        #[arg(long)]
        username: String,

        #[arg(long)]
        password: String,

        /// Resource path of the snapshot below the base URL.
        #[arg(long, default_value = "tabsync/tabsync-data.json")]
        path: String,

        /// Display name.
        #[arg(long)]
        name: Option<String>,

        /// Keep the target out of push-all.
        #[arg(long)]
        disabled: bool,
    },

    /// Remove a target and its sync history.
    Remove { kind: RemoteKind, id: String },

    /// Push local tab groups to one target.
    Push {
        kind: RemoteKind,
        id: String,

        /// Overwrite the remote even if it changed since the last sync.
        #[arg(long)]
        force: bool,
    },

    /// Replace local tab groups with a target's snapshot.
    Pull {
        kind: RemoteKind,
        id: String,

        /// Replace local tab groups even if they changed during the pull.
        #[arg(long)]
        discard_local: bool,
    },

    /// Push local tab groups to every enabled target.
    PushAll {
        /// Overwrite remotes that changed since the last sync.
        #[arg(long)]
        force: bool,
    },

    /// Show the sync history of a target.
    Log { kind: RemoteKind, id: String },

    /// Clear sync history (all targets unless narrowed).
    ClearLog {
        /// Only clear targets of this kind.
        #[arg(short, long)]
        kind: Option<RemoteKind>,

        /// Only clear this target (requires --kind).
        #[arg(long, requires = "kind")]
        id: Option<String>,
    },

    /// Show local tab groups.
    Groups,

    /// Delete empty groups that are not locked.
    Cleanup,

    /// Replace local tab groups with a JSON snapshot file.
    Import {
        /// Snapshot file to read.
        file: PathBuf,
    },

    /// Export local tab groups as a JSON snapshot.
    Export {
        /// Output file path (stdout if not specified).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse the output format argument.
    pub fn output_format(&self) -> Result<OutputFormat, String> {
        self.format.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_push_with_force() {
        let cli = Cli::try_parse_from(["tabsync", "-vv", "push", "webdav", "nas", "--force"])
            .unwrap();

        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Commands::Push { kind: RemoteKind::WebDav, ref id, force: true } if id == "nas"
        ));
    }

    #[test]
    fn test_parse_add_gist_defaults_to_github() {
        let cli = Cli::try_parse_from(["tabsync", "add-gist", "--id", "home", "--token", "t"])
            .unwrap();

        assert!(matches!(
            cli.command,
            Commands::AddGist {
                provider: GistProvider::Github,
                gist_id: None,
                disabled: false,
                ..
            }
        ));
    }

    #[test]
    fn test_clear_log_id_requires_kind() {
        assert!(Cli::try_parse_from(["tabsync", "clear-log", "--id", "a"]).is_err());
        assert!(Cli::try_parse_from(["tabsync", "clear-log", "-k", "gist", "--id", "a"]).is_ok());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert!(Cli::try_parse_from(["tabsync", "log", "ftp", "a"]).is_err());
    }
}
