//! audioconv — keep a lossy, portable mirror of a lossless music library.
//!
//! # Usage
//!
//! ```text
//! audioconv sync [SOURCE DEST] [--config FILE] [--bitrate BPS] [--transcode-to EXT]
//!                [--to-transcode EXTS] [--ffmpeg PATH] [--jobs N] [--dry-run] [--fail-fast]
//! audioconv status [SOURCE DEST] [--json]
//! audioconv watch [SOURCE DEST]
//! audioconv init --source DIR --dest DIR [--config FILE] [--force]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{init::InitArgs, status::StatusArgs, sync::SyncArgs, watch::WatchArgs};

#[derive(Parser, Debug)]
#[command(
    name = "audioconv",
    version,
    about = "Mirror a music library, transcoding lossless files and hard-linking the rest",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bring the mirror up to date and remove what no longer has a source.
    Sync(SyncArgs),

    /// Show what a sync would do, without touching anything.
    Status(StatusArgs),

    /// Sync, then keep syncing whenever the source tree changes.
    Watch(WatchArgs),

    /// Write a starter config file.
    Init(InitArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Watch(args) => args.run(),
        Commands::Init(args) => args.run(),
    }
}
