//! `climpd` CLI flags (spec §4.M). Grounded on mpdhaj's `cli.rs`
//! `clap::Parser` usage, generalized from the teacher's MPD-proxy flags
//! to climp's daemon configuration surface.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "climpd", about = "climp music player daemon")]
pub struct Cli {
    /// Directory to recursively scan for audio files at startup.
    #[arg(long)]
    pub music_dir: Option<PathBuf>,

    /// Directory searched for bare playlist/media names and saved
    /// playlists (defaults to the media-loader search root).
    #[arg(long)]
    pub playlist_dir: Option<PathBuf>,

    /// Override of the default config file path.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Skip daemonizing; also log to stderr in addition to the log file.
    #[arg(long)]
    pub foreground: bool,
}
