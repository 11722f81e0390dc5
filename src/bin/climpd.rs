//! `climpd`: the long-lived engine process (spec §4.I, §4.J).
//!
//! Grounded on mpdhaj's `main.rs` startup sequence (parse flags, install
//! tracing, run the tokio entrypoint) generalized to climp's socket +
//! daemonize + command-dispatch lifecycle, and
//! `original_source/.../climpd/main.c` for the startup scan / shutdown
//! persistence ordering.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use camino::Utf8PathBuf;
use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::Context;

use climp::cli::Cli;
use climp::commands::{self, Context as CmdContext};
use climp::config::Config;
use climp::daemon;
use climp::dispatcher::Dispatcher;
use climp::engine::Engine;
use climp::loader;
use climp::log::{self, Log};
use climp::playlist::Playlist;
use climp::scan::Scanner;
use climp::server::Server;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let log_path = log::default_path();
    let climpd_log = Log::open(&log_path).wrap_err("could not open log file")?;
    log::init(climpd_log.clone()).wrap_err("could not install tracing subscriber")?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(climp::config::default_path);
    let config = Config::load(&config_path).wrap_err("could not load config")?;

    if !cli.foreground {
        daemon::daemonize().wrap_err("could not daemonize")?;
    }

    daemon::install_fatal_signal_handlers(&climpd_log)
        .wrap_err("could not install fatal-signal handlers")?;

    run(cli, config, climpd_log).await
}

async fn run(cli: Cli, config: Config, log: Log) -> Result<()> {
    let socket_path = daemon::default_socket_path();
    let server = Server::bind(&socket_path).wrap_err("could not bind socket")?;

    let playlists_dir = home_dir().join(".config/climp/playlists");
    std::fs::create_dir_all(&playlists_dir).wrap_err("could not create playlists directory")?;
    let last_playlist_path = playlists_dir.join("__playlist.m3u");

    let search_root = cli
        .playlist_dir
        .clone()
        .unwrap_or_else(|| playlists_dir.clone());
    let search_dirs = vec![
        Utf8PathBuf::try_from(search_root).wrap_err("playlist search root is not valid utf8")?,
    ];

    let mut engine = Engine::open_default().wrap_err("could not open audio output")?;
    engine.set_volume(config.volume as i32);
    engine.set_pitch(config.pitch);
    engine.set_speed(config.speed);

    let mut playlist = Playlist::new();
    playlist.set_repeat(config.repeat);
    playlist.set_shuffle(config.shuffle);
    if last_playlist_path.is_file() {
        if let Err(e) = playlist.load(&last_playlist_path) {
            tracing::warn!(error = %e, "could not restore last playlist");
        }
    }

    let scanner = Arc::new(Scanner::new());
    if let Some(dir) = &cli.music_dir {
        let utf8_dir =
            Utf8PathBuf::try_from(dir.clone()).wrap_err("--music-dir is not valid utf8")?;
        match loader::scan_dir(&utf8_dir) {
            Ok(uris) => {
                for uri in uris {
                    match climp::media::Media::from_arg(&uri) {
                        Ok(media) => {
                            scanner.submit(media.clone());
                            playlist.insert_back(media);
                        }
                        Err(e) => tracing::warn!(uri, error = %e, "could not add scanned medium"),
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "startup music-dir scan failed"),
        }
    }

    let ctx = Arc::new(CmdContext {
        engine: Mutex::new(engine),
        playlist: Mutex::new(playlist),
        config: Mutex::new(config),
        log,
        scanner,
        search_dirs,
        quit: std::sync::atomic::AtomicBool::new(false),
    });

    let mut dispatcher = Dispatcher::new();
    commands::register_all(&mut dispatcher, ctx.clone());

    tracing::info!(path = %socket_path.display(), "climpd ready");
    main_loop(&server, &dispatcher, &ctx).await;

    shutdown(&ctx, &last_playlist_path);
    Ok(())
}

/// Single-threaded cooperative loop (spec §5): accept and fully serve
/// one connection at a time, racing it against the shutdown signal and
/// a periodic end-of-stream poll so playback advances between clients.
async fn main_loop(server: &Server, dispatcher: &Dispatcher, ctx: &Arc<CmdContext>) {
    let mut eos_tick = tokio::time::interval(std::time::Duration::from_millis(250));

    loop {
        if ctx.should_quit() {
            return;
        }

        tokio::select! {
            _ = daemon::wait_for_shutdown_signal() => return,
            _ = eos_tick.tick() => {
                let mut engine = ctx.engine.lock().unwrap();
                let mut pl = ctx.playlist.lock().unwrap();
                if let Err(e) = engine.poll_eos(&mut pl) {
                    tracing::warn!(error = %e, "end-of-stream advance failed");
                }
            }
            result = server.accept_one(|cwd, argv, stdin_fd| dispatcher.run_checked(cwd, argv, stdin_fd)) => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "connection failed");
                }
                if ctx.should_quit() {
                    return;
                }
            }
        }
    }
}

fn shutdown(ctx: &CmdContext, last_playlist_path: &std::path::Path) {
    tracing::info!("shutting down");
    if let Err(e) = ctx.playlist.lock().unwrap().save(last_playlist_path) {
        tracing::warn!(error = %e, "could not persist last playlist");
    }
    let config = ctx.config.lock().unwrap();
    if config.keep_changes {
        if let Err(e) = config.save() {
            tracing::warn!(error = %e, "could not persist config");
        }
    }
}

fn home_dir() -> std::path::PathBuf {
    dirs::home_dir().unwrap_or_else(|| std::path::PathBuf::from("/"))
}
