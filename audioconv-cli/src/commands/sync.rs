//! `audioconv sync` — transcode, link and reconcile once.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use audioconv_core::MirrorConfig;
use audioconv_sync::{FileOutcome, RemovalOutcome, RunReport, SyncOptions};

use super::config_args::ConfigArgs;

/// Arguments for `audioconv sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Show what would be transcoded, linked and removed without doing it.
    #[arg(long)]
    pub dry_run: bool,

    /// Stop at the first failed transcode and skip the cleanup pass.
    #[arg(long)]
    pub fail_fast: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        audioconv_daemon::init_tracing();
        let config = self.config.resolve()?;
        let options = SyncOptions {
            dry_run: self.dry_run,
            fail_fast: self.fail_fast,
        };

        let report = audioconv_daemon::run_once_blocking(&config, options).with_context(|| {
            format!(
                "sync failed for '{}' -> '{}'",
                config.source.display(),
                config.mirror.display()
            )
        })?;
        print_report(&config, &report, self.dry_run);

        let failed = report.sync.failures.len() + report.reconcile.failures.len();
        if failed > 0 {
            bail!("{failed} item(s) failed; see above");
        }
        Ok(())
    }
}

fn print_report(config: &MirrorConfig, report: &RunReport, dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };

    if dry_run {
        for outcome in &report.sync.outcomes {
            match outcome {
                FileOutcome::WouldTranscode { source, .. } => {
                    println!("  ~  transcode {}", source.display())
                }
                FileOutcome::WouldLink { source, .. } => println!("  ~  link {}", source.display()),
                _ => {}
            }
        }
        for removal in &report.reconcile.removals {
            if let RemovalOutcome::WouldRemoveFile { path } | RemovalOutcome::WouldRemoveDir { path } =
                removal
            {
                println!("  ~  remove {}", path.display());
            }
        }
    }

    for failure in &report.sync.failures {
        println!(
            "  {}  {}: {}",
            "✗".red().bold(),
            failure.source.display(),
            failure.error
        );
    }
    for failure in &report.reconcile.failures {
        println!(
            "  {}  {}: {}",
            "✗".red().bold(),
            failure.path.display(),
            failure.error
        );
    }

    let mark = if report.is_success() {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    println!(
        "{prefix}{mark} '{}' -> '{}' ({} transcoded, {} linked, {} unchanged, {} removed)",
        config.source.display(),
        config.mirror.display(),
        report.sync.transcoded(),
        report.sync.linked(),
        report.sync.unchanged(),
        report.reconcile.removals.len(),
    );
}
