//! `audioconv status` — what a sync would do right now.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use audioconv_core::MirrorConfig;
use audioconv_sync::{
    pipeline, CancellationToken, FfmpegTranscoder, FileOutcome, RemovalOutcome, RunReport, SyncOptions,
};

use super::config_args::ConfigArgs;

/// Arguments for `audioconv status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let config = self.config.resolve()?;
        let options = SyncOptions {
            dry_run: true,
            fail_fast: false,
        };
        // A dry run never invokes the encoder.
        let transcoder = FfmpegTranscoder::new(&config.ffmpeg);
        let report = pipeline::run(&config, &transcoder, options, &CancellationToken::new())
            .context("status scan failed")?;

        if self.json {
            return print_json(&config, &report);
        }
        print_table(&config, &report);
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusJson<'a> {
    source: &'a std::path::Path,
    mirror: &'a std::path::Path,
    summary: SummaryJson,
    pending: Vec<&'a FileOutcome>,
    removals: &'a [RemovalOutcome],
}

#[derive(Serialize)]
struct SummaryJson {
    transcode: usize,
    link: usize,
    unchanged: usize,
    remove: usize,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "action")]
    action: String,
    #[tabled(rename = "path")]
    path: String,
}

fn summary(report: &RunReport) -> SummaryJson {
    SummaryJson {
        transcode: report.sync.transcoded(),
        link: report.sync.linked(),
        unchanged: report.sync.unchanged(),
        remove: report.reconcile.removals.len(),
    }
}

fn print_json(config: &MirrorConfig, report: &RunReport) -> Result<()> {
    let payload = StatusJson {
        source: &config.source,
        mirror: &config.mirror,
        summary: summary(report),
        pending: report
            .sync
            .outcomes
            .iter()
            .filter(|o| !matches!(o, FileOutcome::Unchanged { .. }))
            .collect(),
        removals: &report.reconcile.removals,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(config: &MirrorConfig, report: &RunReport) {
    let counts = summary(report);
    println!(
        "audioconv v{} | {} -> {}",
        env!("CARGO_PKG_VERSION"),
        config.source.display(),
        config.mirror.display(),
    );
    println!(
        "{} to transcode  {} to link  {} unchanged  {} to remove",
        counts.transcode.to_string().yellow().bold(),
        counts.link.to_string().cyan().bold(),
        counts.unchanged.to_string().green().bold(),
        counts.remove.to_string().red().bold(),
    );

    let mut rows: Vec<StatusTableRow> = report
        .sync
        .outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            FileOutcome::WouldTranscode { mirror, .. } => Some(("TRANSCODE", mirror)),
            FileOutcome::WouldLink { mirror, .. } => Some(("LINK", mirror)),
            _ => None,
        })
        .map(|(action, path)| StatusTableRow {
            action: action.to_string(),
            path: path.display().to_string(),
        })
        .collect();
    rows.extend(report.reconcile.removals.iter().map(|removal| StatusTableRow {
        action: "REMOVE".to_string(),
        path: removal.path().display().to_string(),
    }));

    if rows.is_empty() {
        println!("Mirror is up to date.");
        return;
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    println!("Run 'audioconv sync' to apply.");
}
