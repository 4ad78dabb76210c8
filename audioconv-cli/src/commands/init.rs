//! `audioconv init --source <dir> --dest <dir> [--config <file>] [--force]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use audioconv_core::{config, Bitrate, ConfigOverrides, Extension, ExtensionList};

/// Write a starter config file.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Source library root.
    #[arg(long, short = 's', value_name = "DIR")]
    pub source: PathBuf,

    /// Mirror root.
    #[arg(long, short = 'd', value_name = "DIR")]
    pub dest: PathBuf,

    /// Where to write the config. Defaults to ~/.audioconv/config.yaml.
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Overwrite an existing config file.
    #[arg(long)]
    pub force: bool,

    /// Output bitrate in bits per second.
    #[arg(long, value_name = "BPS")]
    pub bitrate: Option<Bitrate>,

    /// Extension given to transcoded files.
    #[arg(long, value_name = "EXT")]
    pub transcode_to: Option<Extension>,

    /// Comma-separated extensions that get transcoded.
    #[arg(long, value_name = "EXTS")]
    pub to_transcode: Option<ExtensionList>,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let path = match self.config {
            Some(path) => path,
            None => config::default_path().context("could not determine home directory")?,
        };
        let source = absolute(self.source)?;
        let dest = absolute(self.dest)?;
        let overrides = ConfigOverrides {
            bitrate: self.bitrate,
            transcode_to: self.transcode_to,
            to_transcode: self.to_transcode,
            ..Default::default()
        };

        config::init_at(&path, source.clone(), dest.clone(), &overrides, self.force)
            .with_context(|| format!("failed to write config '{}'", path.display()))?;

        println!("✓ Wrote {}", path.display());
        println!("  source: {}", source.display());
        println!("  dest:   {}", dest.display());
        Ok(())
    }
}

/// Roots are stored absolute; relative ones resolve against the cwd.
fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().context("could not determine working directory")?;
    Ok(cwd.join(path))
}
