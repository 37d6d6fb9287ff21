//! Output formatting for targets, sync history and tab groups.
//!
//! Supports a table view for humans and JSON for scripts.

use colored::{ColoredString, Colorize};
use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;

use crate::domain::{
    RemoteBackend, RemoteTargetConfig, SyncOutcome, SyncResultEntry, TabGroupDocument,
};

use super::sync_orchestrator::{PushAllReport, SyncReport};

/// Output format options.
#[derive(Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    /// Compact table listing.
    #[default]
    Table,
    /// JSON format for programmatic use.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {s}. Use: table, json")),
        }
    }
}

/// Serializes any value as pretty JSON.
///
/// # Errors
/// Returns error if serialization fails.
pub fn format_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

fn outcome_label(outcome: SyncOutcome) -> ColoredString {
    match outcome {
        SyncOutcome::Success => "success".green(),
        SyncOutcome::Conflict => "conflict".yellow(),
        SyncOutcome::Error => "error".red(),
    }
}

fn outcome_mark(outcome: SyncOutcome) -> ColoredString {
    match outcome {
        SyncOutcome::Success => "✓".green().bold(),
        SyncOutcome::Conflict => "⚠".yellow().bold(),
        SyncOutcome::Error => "✗".red().bold(),
    }
}

/// Where a target points, without credentials.
fn endpoint(config: &RemoteTargetConfig) -> String {
    match &config.backend {
        RemoteBackend::Gist {
            provider, gist_id, ..
        } => format!("{provider}:{}", gist_id.as_deref().unwrap_or("(new)")),
        RemoteBackend::WebDav {
            base_url,
            remote_path,
            ..
        } => format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            remote_path.trim_start_matches('/')
        ),
    }
}

/// Copy of a target with its secrets masked, for JSON output.
#[must_use]
pub fn redact_secrets(config: &RemoteTargetConfig) -> RemoteTargetConfig {
    let mut redacted = config.clone();
    match &mut redacted.backend {
        RemoteBackend::Gist { access_token, .. } => *access_token = "***".to_string(),
        RemoteBackend::WebDav { password, .. } => *password = "***".to_string(),
    }
    redacted
}

/// Formats configured targets with their most recent sync result.
pub fn format_targets_table(targets: &[(RemoteTargetConfig, Option<SyncResultEntry>)]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "Kind", "ID", "Name", "On", "Endpoint", "Revision", "Last sync", "Result",
    ]);

    for (config, last) in targets {
        let synced = config.last_synced_at.map_or_else(
            || "-".to_string(),
            |dt| dt.format("%Y-%m-%d %H:%M").to_string(),
        );
        let result = last.as_ref().map_or_else(
            || "-".to_string(),
            |entry| format!("{} {}", entry.direction, outcome_label(entry.outcome)),
        );

        table.add_row(vec![
            config.kind().to_string(),
            config.id.clone(),
            truncate(&config.display_name, 20),
            if config.enabled { "yes" } else { "no" }.to_string(),
            truncate(&endpoint(config), 40),
            truncate(config.revision.as_deref().unwrap_or("-"), 16),
            synced,
            result,
        ]);
    }

    table.to_string()
}

/// Formats one target's sync history, oldest first.
pub fn format_results_table(entries: &[SyncResultEntry]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Time", "Direction", "Outcome", "Message"]);

    for entry in entries {
        table.add_row(vec![
            entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            entry.direction.to_string(),
            outcome_label(entry.outcome).to_string(),
            truncate(&entry.message, 60),
        ]);
    }

    table.to_string()
}

/// Formats the outcome of a single sync.
pub fn format_sync_report(report: &SyncReport) -> String {
    let revision = report
        .revision
        .as_deref()
        .map_or_else(String::new, |rev| format!(" (revision {})", rev.cyan()));
    format!(
        "{} {}/{}: {}{revision}",
        outcome_mark(report.outcome),
        report.kind,
        report.id,
        report.message
    )
}

/// Formats a push-all run, one line per target plus totals.
pub fn format_push_all(report: &PushAllReport) -> String {
    let mut out = String::new();

    for result in &report.results {
        out.push_str(&format!(
            "{} {} [{}] {}\n",
            outcome_mark(result.outcome),
            result.target,
            result.display_name,
            result.message
        ));
    }

    out.push_str(&format!(
        "\n{} {} succeeded, {} conflicts, {} failed",
        "📊 Push to all remotes:".bold(),
        report.succeeded().to_string().green(),
        report.conflicts().to_string().yellow(),
        report.failures().to_string().red()
    ));

    out
}

/// Formats the local tab groups.
pub fn format_groups_table(document: &TabGroupDocument) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["#", "Name", "Locked", "Tabs", "First tab", "Created"]);

    for (i, group) in document.groups.iter().enumerate() {
        let first = group
            .tabs
            .first()
            .map_or("-", |tab| {
                if tab.title.is_empty() {
                    tab.url.as_str()
                } else {
                    tab.title.as_str()
                }
            });

        table.add_row(vec![
            (i + 1).to_string(),
            truncate(&group.name, 24),
            if group.locked { "🔒" } else { "" }.to_string(),
            group.tabs.len().to_string(),
            truncate(first, 35),
            group.created_at.format("%Y-%m-%d").to_string(),
        ]);
    }

    format!(
        "{table}\n{} (modified {})",
        document.summary().bold(),
        document.last_modified_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Truncates a string to max length with ellipsis.
fn truncate(s: &str, max_len: usize) -> String {
    let s = s.lines().next().unwrap_or(s);
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::sync_orchestrator::TargetResult;
    use crate::domain::{
        ErrorKind, GistProvider, RemoteKind, SyncDirection, TabEntry, TabGroup, TargetKey,
    };

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world!", 8), "hello...");
        assert_eq!(truncate("ünïcödé text", 6), "ünï...");
    }

    #[test]
    fn test_output_format_from_str() {
        assert!(matches!("table".parse::<OutputFormat>(), Ok(OutputFormat::Table)));
        assert!(matches!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json)));
        assert!("markdown".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_targets_table_hides_credentials() {
        let gist = RemoteTargetConfig::gist("home", GistProvider::Gitee, "s3cret-token", None);
        let dav = RemoteTargetConfig::webdav(
            "nas",
            "https://dav.example.com/",
            "alice",
            "hunter2",
            "/tabs/data.json",
        );

        let out = format_targets_table(&[(gist, None), (dav, None)]);

        assert!(out.contains("gitee:(new)"));
        assert!(out.contains("https://dav.example.com/tabs/data.json"));
        assert!(!out.contains("s3cret-token"));
        assert!(!out.contains("hunter2"));
    }

    #[test]
    fn test_redact_secrets_masks_token() {
        let gist = RemoteTargetConfig::gist("home", GistProvider::Github, "s3cret-token", None);
        let json = format_json(&redact_secrets(&gist)).unwrap();

        assert!(json.contains("\"***\""));
        assert!(!json.contains("s3cret-token"));
    }

    #[test]
    fn test_push_all_summary_counts() {
        let report = PushAllReport {
            results: vec![
                TargetResult {
                    target: TargetKey::new(RemoteKind::Gist, "a"),
                    display_name: "A".into(),
                    outcome: SyncOutcome::Success,
                    message: "Pushed 1 groups / 1 tabs".into(),
                    error_kind: None,
                },
                TargetResult {
                    target: TargetKey::new(RemoteKind::WebDav, "b"),
                    display_name: "B".into(),
                    outcome: SyncOutcome::Error,
                    message: "Authentication failed: nope".into(),
                    error_kind: Some(ErrorKind::Auth),
                },
            ],
        };

        let out = format_push_all(&report);
        assert!(out.contains("gist/a [A] Pushed"));
        assert!(out.contains("webdav/b [B] Authentication failed"));
        assert!(out.contains("succeeded"));
    }

    #[test]
    fn test_groups_table_lists_groups() {
        let doc = TabGroupDocument::new(vec![
            TabGroup::new("Reading")
                .with_tabs(vec![TabEntry::new("https://docs.rs", "Docs.rs")]),
            TabGroup::new("Pinned stuff").locked(),
        ]);

        let out = format_groups_table(&doc);
        assert!(out.contains("Reading"));
        assert!(out.contains("Docs.rs"));
        assert!(out.contains("Pinned stuff"));
        assert!(out.contains(&doc.summary()));
    }

    #[test]
    fn test_results_table_shows_messages() {
        let entry = SyncResultEntry::new(
            &TargetKey::new(RemoteKind::Gist, "a"),
            SyncDirection::Pull,
            SyncOutcome::Conflict,
            "local tab groups changed while pulling",
        );

        let out = format_results_table(&[entry]);
        assert!(out.contains("pull"));
        assert!(out.contains("local tab groups changed"));
    }
}
