//! Arguments shared by every command that runs the pipeline.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use audioconv_core::{config, Bitrate, ConfigOverrides, Extension, ExtensionList, MirrorConfig};

/// Roots and transcoding settings; each flag overrides the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Source library root (requires DEST).
    #[arg(value_name = "SOURCE", requires = "dest")]
    pub source: Option<PathBuf>,

    /// Mirror root.
    #[arg(value_name = "DEST")]
    pub dest: Option<PathBuf>,

    /// Config file. Defaults to ./audioconv.yaml, then ~/.audioconv/config.yaml.
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output bitrate in bits per second.
    #[arg(long, value_name = "BPS")]
    pub bitrate: Option<Bitrate>,

    /// Extension given to transcoded files (e.g. ".opus").
    #[arg(long, value_name = "EXT")]
    pub transcode_to: Option<Extension>,

    /// Comma-separated extensions that get transcoded (e.g. ".flac,.wav").
    #[arg(long, value_name = "EXTS")]
    pub to_transcode: Option<ExtensionList>,

    /// ffmpeg executable.
    #[arg(long, value_name = "PATH")]
    pub ffmpeg: Option<PathBuf>,

    /// Worker threads for linking and transcoding (0 = one per CPU).
    #[arg(long, short = 'j', value_name = "N")]
    pub jobs: Option<usize>,
}

impl ConfigArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            source: self.source.clone(),
            dest: self.dest.clone(),
            bitrate: self.bitrate,
            transcode_to: self.transcode_to.clone(),
            to_transcode: self.to_transcode.clone(),
            ffmpeg: self.ffmpeg.clone(),
            jobs: self.jobs,
        }
    }

    /// Load the config file (explicit or discovered) and apply the flags.
    pub fn resolve(&self) -> Result<MirrorConfig> {
        let file = match self.config_path()? {
            Some(path) => Some(
                config::load_at(&path)
                    .with_context(|| format!("failed to load config '{}'", path.display()))?,
            ),
            None => None,
        };
        config::resolve(file, self.overrides()).context("invalid configuration")
    }

    fn config_path(&self) -> Result<Option<PathBuf>> {
        if let Some(path) = &self.config {
            return Ok(Some(path.clone()));
        }
        let cwd = std::env::current_dir().context("could not determine working directory")?;
        Ok(discover(&cwd, dirs::home_dir().as_deref()))
    }
}

fn discover(cwd: &Path, home: Option<&Path>) -> Option<PathBuf> {
    match home {
        Some(home) => config::discover_at(cwd, home),
        None => {
            let local = cwd.join(config::LOCAL_CONFIG_NAME);
            local.is_file().then_some(local)
        }
    }
}
