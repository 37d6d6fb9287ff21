//! tabsync - Sync browser tab groups to remote storage.
//!
//! Keeps a local tab group document in `SQLite` and pushes or pulls it to
//! GitHub/Gitee gists and WebDAV servers, with optimistic concurrency on
//! every target and a bounded per-target sync history.
//!
//! QUICK START:
//!   tabsync add-gist --id home --token <token>   # Configure a gist target
//!   tabsync push gist home                       # First push creates the gist
//!   tabsync push-all                             # Push to every enabled target
//!   tabsync log gist home                        # See what happened

mod application;
mod cli;
mod domain;
mod infrastructure;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use application::{
    format_groups_table, format_json, format_push_all, format_results_table, format_sync_report,
    format_targets_table, redact_secrets, ClearScope, OutputFormat, RemoteConfigStore,
    Resolution, SyncOrchestrator, SyncReport, SyncResultLog, TabDataStore,
};
use cli::{Cli, Commands};
use domain::{
    AppConfig, AppError, ErrorKind, RemoteBackend, RemoteKind, RemoteTargetConfig, SyncDirection,
    TabGroupDocument, TargetKey,
};
use infrastructure::{
    build_client, ensure_config_exists, load_config, load_config_from_file, GistClient,
    LocalStorage, WebDavClient,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main application logic.
async fn run(cli: Cli) -> domain::Result<()> {
    let format = cli
        .output_format()
        .map_err(|e| AppError::Config { message: e })?;

    let config = load_app_config(cli.config.as_deref())?;
    let sync = build_orchestrator(&config)?;

    match cli.command {
        Commands::Targets { kind } => {
            cmd_targets(&sync, kind, format)?;
        }
        Commands::AddGist {
            id,
            token,
            provider,
            gist_id,
            name,
            disabled,
        } => {
            let target = RemoteTargetConfig::gist(id, provider, token, gist_id);
            cmd_add_target(&sync, target, name, disabled)?;
        }
        Commands::AddWebdav {
            id,
            url,
            username,
            password,
            path,
            name,
            disabled,
        } => {
            let target = RemoteTargetConfig::webdav(id, url, username, password, path);
            cmd_add_target(&sync, target, name, disabled)?;
        }
        Commands::Remove { kind, id } => {
            cmd_remove(&sync, kind, &id)?;
        }
        Commands::Push { kind, id, force } => {
            let result = if force {
                sync.resolve_conflict(kind, &id, Resolution::ForcePush).await
            } else {
                sync.sync_target(kind, &id, SyncDirection::Push).await
            };
            print_sync_result(&sync, kind, &id, result)?;
        }
        Commands::Pull {
            kind,
            id,
            discard_local,
        } => {
            let result = if discard_local {
                sync.resolve_conflict(kind, &id, Resolution::DiscardLocal).await
            } else {
                sync.sync_target(kind, &id, SyncDirection::Pull).await
            };
            print_sync_result(&sync, kind, &id, result)?;
        }
        Commands::PushAll { force } => {
            let report = sync.push_to_all_remotes(force).await?;
            println!("{}", format_push_all(&report));
        }
        Commands::Log { kind, id } => {
            cmd_log(&sync, kind, &id, format)?;
        }
        Commands::ClearLog { kind, id } => {
            cmd_clear_log(&sync, kind, id)?;
        }
        Commands::Groups => {
            cmd_groups(&sync, format)?;
        }
        Commands::Cleanup => {
            cmd_cleanup(&sync)?;
        }
        Commands::Import { file } => {
            cmd_import(&sync, &file)?;
        }
        Commands::Export { output } => {
            cmd_export(&sync, output.as_deref())?;
        }
    }

    Ok(())
}

/// Load the explicit config file, or the default one (created on first run).
fn load_app_config(path: Option<&Path>) -> domain::Result<AppConfig> {
    match path {
        Some(path) => load_config_from_file(path),
        None => {
            ensure_config_exists()?;
            load_config()
        }
    }
}

/// Open storage, load the stores and connect the remote clients.
fn build_orchestrator(config: &AppConfig) -> domain::Result<SyncOrchestrator> {
    let storage = Arc::new(LocalStorage::open(&config.storage_db_path())?);
    let results = Arc::new(SyncResultLog::load(
        Arc::clone(&storage),
        config.sync.max_log_entries,
    )?);
    let configs = Arc::new(RemoteConfigStore::load(
        Arc::clone(&storage),
        Arc::clone(&results),
    )?);
    let tabs = Arc::new(TabDataStore::load(storage)?);

    let http = build_client(config)?;
    let backoff = Duration::from_millis(config.sync.retry_backoff_ms);
    let gist = Arc::new(GistClient::new(http.clone(), &config.remote, backoff));
    let webdav = Arc::new(WebDavClient::new(http, backoff));

    Ok(SyncOrchestrator::new(configs, results, tabs, gist, webdav))
}

/// List targets command.
fn cmd_targets(
    sync: &SyncOrchestrator,
    kind: Option<RemoteKind>,
    format: OutputFormat,
) -> domain::Result<()> {
    let kinds = kind.map_or_else(|| RemoteKind::ALL.to_vec(), |k| vec![k]);
    let targets: Vec<_> = kinds
        .into_iter()
        .flat_map(|k| sync.get_all(k))
        .collect();

    match format {
        OutputFormat::Json => {
            let redacted: Vec<_> = targets.iter().map(redact_secrets).collect();
            println!("{}", format_json(&redacted).map_err(AppError::json_parse)?);
        }
        OutputFormat::Table => {
            if targets.is_empty() {
                println!("No sync targets configured. Add one with add-gist or add-webdav.");
                return Ok(());
            }
            let rows: Vec<_> = targets
                .into_iter()
                .map(|t| {
                    let last = sync.last_result(t.kind(), &t.id);
                    (t, last)
                })
                .collect();
            println!("{}", format_targets_table(&rows));
        }
    }

    Ok(())
}

/// Add or update a target.
fn cmd_add_target(
    sync: &SyncOrchestrator,
    mut target: RemoteTargetConfig,
    name: Option<String>,
    disabled: bool,
) -> domain::Result<()> {
    if let Some(name) = name {
        target = target.with_display_name(name);
    }
    if disabled {
        target = target.disabled();
    }

    let key = target.key();
    let existing = sync.get_config_item(key.kind, &key.id);

    // Re-adding a gist target without --gist-id keeps the gist created earlier.
    if let (
        Some(RemoteBackend::Gist {
            gist_id: Some(known),
            ..
        }),
        RemoteBackend::Gist { gist_id: None, .. },
    ) = (existing.as_ref().map(|e| &e.backend), &target.backend)
    {
        let known = known.clone();
        if let RemoteBackend::Gist { gist_id, .. } = &mut target.backend {
            *gist_id = Some(known);
        }
    }

    sync.upsert_target(target)?;

    let verb = if existing.is_some() { "Updated" } else { "Added" };
    println!("{} {verb} target {}", "✓".green().bold(), key.to_string().cyan());
    Ok(())
}

/// Remove target command.
fn cmd_remove(sync: &SyncOrchestrator, kind: RemoteKind, id: &str) -> domain::Result<()> {
    if !sync.remove_target(kind, id)? {
        return Err(AppError::not_found(format!(
            "no sync target {}",
            TargetKey::new(kind, id)
        )));
    }
    println!("{} Removed target {kind}/{id}", "✓".green().bold());
    Ok(())
}

/// Print a single sync outcome, with a hint when it conflicted.
fn print_sync_result(
    sync: &SyncOrchestrator,
    kind: RemoteKind,
    id: &str,
    result: domain::Result<SyncReport>,
) -> domain::Result<()> {
    match result {
        Ok(report) => {
            println!("{}", format_sync_report(&report));
            Ok(())
        }
        Err(e) => {
            match e.kind() {
                ErrorKind::Conflict => eprintln!(
                    "{} resolve with `tabsync push {kind} {id} --force` to keep local tab groups, \
                     or `tabsync pull {kind} {id} --discard-local` to take the remote ones",
                    "Hint:".yellow().bold()
                ),
                ErrorKind::NotFound if sync.get_config_item(kind, id).is_some() => eprintln!(
                    "{} nothing has been pushed to {kind}/{id} yet; run `tabsync push {kind} {id}`",
                    "Hint:".yellow().bold()
                ),
                _ => {}
            }
            Err(e)
        }
    }
}

/// Show sync history command.
fn cmd_log(
    sync: &SyncOrchestrator,
    kind: RemoteKind,
    id: &str,
    format: OutputFormat,
) -> domain::Result<()> {
    let entries = sync.sync_results(kind, id);

    match format {
        OutputFormat::Json => {
            println!("{}", format_json(&entries).map_err(AppError::json_parse)?);
        }
        OutputFormat::Table => {
            if entries.is_empty() {
                println!("No sync history for {kind}/{id}.");
            } else {
                println!("{}", format_results_table(&entries));
            }
        }
    }

    Ok(())
}

/// Clear sync history command.
fn cmd_clear_log(
    sync: &SyncOrchestrator,
    kind: Option<RemoteKind>,
    id: Option<String>,
) -> domain::Result<()> {
    let (scope, label) = match (kind, id) {
        (Some(kind), Some(id)) => {
            let key = TargetKey::new(kind, id);
            let label = key.to_string();
            (ClearScope::Target(key), label)
        }
        (Some(kind), None) => (ClearScope::Kind(kind), format!("all {kind} targets")),
        (None, _) => (ClearScope::All, "all targets".to_string()),
    };

    sync.clear_sync_result(&scope)?;
    println!("{} Cleared sync history for {label}", "✓".green().bold());
    Ok(())
}

/// Show local tab groups command.
fn cmd_groups(sync: &SyncOrchestrator, format: OutputFormat) -> domain::Result<()> {
    let snapshot = sync.tabs().snapshot();

    match format {
        OutputFormat::Json => println!("{}", snapshot.document.to_json()?),
        OutputFormat::Table => {
            if snapshot.document.groups.is_empty() {
                println!("No tab groups yet. Import a snapshot or pull from a target.");
            } else {
                println!("{}", format_groups_table(&snapshot.document));
            }
        }
    }

    Ok(())
}

/// Remove empty unlocked groups command.
fn cmd_cleanup(sync: &SyncOrchestrator) -> domain::Result<()> {
    let mut preview = sync.tabs().snapshot().document;
    if preview.remove_empty_unlocked_groups() == 0 {
        println!("Nothing to clean up.");
        return Ok(());
    }

    let removed = sync
        .tabs()
        .edit(TabGroupDocument::remove_empty_unlocked_groups)?;
    println!("{} Removed {removed} empty group(s)", "✓".green().bold());
    Ok(())
}

/// Import a snapshot file command.
fn cmd_import(sync: &SyncOrchestrator, file: &Path) -> domain::Result<()> {
    let raw = std::fs::read_to_string(file)
        .map_err(|e| AppError::io(format!("Failed to read {}", file.display()), e))?;
    let document = TabGroupDocument::from_json(&raw)?;
    let summary = document.summary();

    sync.tabs().replace(document)?;
    println!("{} Imported {summary}", "✓".green().bold());
    Ok(())
}

/// Export the local document command.
fn cmd_export(sync: &SyncOrchestrator, output: Option<&Path>) -> domain::Result<()> {
    let document = sync.tabs().snapshot().document;
    let content = document.to_json()?;

    match output {
        Some(path) => {
            std::fs::write(path, content.as_bytes())
                .map_err(|e| AppError::io(format!("Failed to write {}", path.display()), e))?;
            println!(
                "{} Exported {} to {}",
                "✓".green().bold(),
                document.summary(),
                path.display()
            );
        }
        None => {
            println!("{content}");
        }
    }

    Ok(())
}

/// Setup tracing/logging based on verbosity level.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
