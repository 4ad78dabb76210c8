//! `audioconv watch` — sync now, then on every source change until Ctrl-C.

use anyhow::{Context, Result};
use clap::Args;

use audioconv_sync::SyncOptions;

use super::config_args::ConfigArgs;

/// Arguments for `audioconv watch`.
#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

impl WatchArgs {
    pub fn run(self) -> Result<()> {
        audioconv_daemon::init_tracing();
        let config = self.config.resolve()?;
        println!(
            "Watching '{}' (Ctrl-C to stop)",
            config.source.display()
        );
        audioconv_daemon::watch_blocking(&config, SyncOptions::default())
            .context("watcher stopped with an error")
    }
}
