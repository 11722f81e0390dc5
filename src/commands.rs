//! Concrete command handlers (spec §4.F), wired onto a `Dispatcher`.
//! Grounded on `original_source/.../climpd/cmd/*.c` for the one
//! handler-per-command shape and the user-facing text each command
//! produces, and on `config.rs`'s column-width setting for the
//! playlist/current/files table layout.

use std::os::fd::{FromRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::engine::Engine;
use crate::error::{ClimpError, Result};
use crate::loader::{self, Resolved};
use crate::log::Log;
use crate::playlist::Playlist;
use crate::scan::Scanner;
use crate::strconvert::{str_to_bool, str_to_float, str_to_int, str_to_sec};

/// Shared mutable state every handler closes over. All mutation goes
/// through these locks; the dispatcher itself never interleaves two
/// connections, so no handler ever contends with another (spec §5).
pub struct Context {
    pub engine: Mutex<Engine>,
    pub playlist: Mutex<Playlist>,
    pub config: Mutex<Config>,
    pub log: Log,
    pub scanner: Arc<Scanner>,
    pub search_dirs: Vec<Utf8PathBuf>,
    pub quit: AtomicBool,
}

impl Context {
    pub fn should_quit(&self) -> bool {
        self.quit.load(Ordering::Relaxed)
    }
}

/// Joins a relative argument against the connecting client's cwd; a
/// URI or an already-absolute path is left untouched. The daemon's own
/// process cwd is `/` once daemonized (spec §4.J), so relative `add`/
/// `play` arguments are meaningless unless resolved against the
/// client's transferred cwd instead.
fn qualify(cwd: &str, arg: &str) -> String {
    if arg.contains("://") || Utf8Path::new(arg).is_absolute() {
        return arg.to_string();
    }
    Utf8Path::new(cwd).join(arg).into_string()
}

fn resolve_all(ctx: &Context, cwd: &str, args: &[String]) -> Result<Vec<crate::media::Media>> {
    let mut out = Vec::new();
    for arg in args {
        let qualified = qualify(cwd, arg);
        match loader::resolve(&qualified, &ctx.search_dirs)? {
            Resolved::Media(m) => out.push(m),
            Resolved::PlaylistEntries(entries) => out.extend(entries),
        }
    }
    Ok(out)
}

/// Reads the transferred stdin descriptor to completion and resolves
/// each non-blank, non-`#`-comment line the same way `add`/`playlist`
/// resolve their arguments (spec §4.F: "replace playlist from the
/// transferred stdin").
fn read_stdin_playlist(fd: RawFd, cwd: &str, ctx: &Context) -> Result<Vec<crate::media::Media>> {
    use std::io::Read;

    // SAFETY: borrowed only for this read; the connection's
    // `TransferredFds` retains and eventually closes the real fd.
    let mut stdin = unsafe { std::fs::File::from_raw_fd(fd) };
    let mut text = String::new();
    let result = stdin.read_to_string(&mut text);
    std::mem::forget(stdin);
    result?;

    let lines: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect();
    resolve_all(ctx, cwd, &lines)
}

fn fmt_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Column-aware one-line-per-track rendering, truncating/padding the
/// title field to `width` as `config.meta_column_width` specifies.
fn render_track(idx: usize, media: &crate::media::Media, width: usize, current: bool) -> String {
    let marker = if current { "*" } else { " " };
    let info = media.info();
    let title = if info.title.is_empty() {
        media.display_name().to_string()
    } else {
        info.title.clone()
    };
    let title = if title.len() > width {
        title[..width].to_string()
    } else {
        format!("{title:<width$}")
    };
    format!("{marker} {idx:>4}  {title}  {}", fmt_duration(info.duration))
}

pub fn register_all(dispatcher: &mut Dispatcher, ctx: Arc<Context>) {
    macro_rules! reg {
        ($long:expr, $short:expr, $ctx:ident, $body:expr) => {{
            let $ctx = ctx.clone();
            dispatcher.register($long, $short, Box::new($body));
        }};
    }

    reg!("add", "a", ctx, move |cwd: &str, argv: &[String], _stdin: RawFd| -> Result<String> {
        if argv.is_empty() {
            return Err(ClimpError::Usage("add requires at least one argument".into()));
        }
        let media = resolve_all(&ctx, cwd, argv)?;
        let n = media.len();
        for m in &media {
            ctx.scanner.submit(m.clone());
        }
        ctx.playlist.lock().unwrap().add_list(media);
        Ok(format!("added {n} track(s)"))
    });

    reg!("clear", "", ctx, move |_cwd: &str, _argv: &[String], _stdin: RawFd| -> Result<String> {
        ctx.playlist.lock().unwrap().clear();
        Ok("playlist cleared".into())
    });

    reg!("config", "", ctx, move |_cwd: &str, _argv: &[String], _stdin: RawFd| -> Result<String> {
        let path = ctx.config.lock().unwrap().path().to_path_buf();
        let reloaded = Config::load(&path)?;
        let text = format!(
            "ConsoleOutput.Meta_Column_Width = {}\n\
             AudioPlayer.Volume = {}\n\
             AudioPlayer.Pitch = {}\n\
             AudioPlayer.Speed = {}\n\
             AudioPlayer.Repeat = {}\n\
             AudioPlayer.Shuffle = {}\n\
             Config.Keep_Changes = {}",
            reloaded.meta_column_width,
            reloaded.volume,
            reloaded.pitch,
            reloaded.speed,
            reloaded.repeat,
            reloaded.shuffle,
            reloaded.keep_changes,
        );
        *ctx.config.lock().unwrap() = reloaded;
        Ok(text)
    });

    reg!("current", "", ctx, move |_cwd: &str, _argv: &[String], _stdin: RawFd| -> Result<String> {
        let engine = ctx.engine.lock().unwrap();
        let state = match engine.state() {
            crate::engine::PlayState::Stopped => "Stopped",
            crate::engine::PlayState::Paused => "Paused",
            crate::engine::PlayState::Playing => "Playing",
        };
        let Some(media) = engine.active_media() else {
            return Ok(format!("nothing is playing  [{state}]"));
        };
        let info = media.info();
        let index = ctx.playlist.lock().unwrap().current_index();
        Ok(format!(
            "#{}  {}  [{} / {}]  {state}",
            index.map_or("-".to_string(), |i| i.to_string()),
            if info.title.is_empty() { media.display_name() } else { &info.title },
            fmt_duration(engine.elapsed()),
            fmt_duration(info.duration),
        ))
    });

    reg!("files", "", ctx, move |_cwd: &str, _argv: &[String], _stdin: RawFd| -> Result<String> {
        let pl = ctx.playlist.lock().unwrap();
        Ok(pl
            .iter()
            .filter_map(|m| m.path().map(|p| p.to_string()))
            .collect::<Vec<_>>()
            .join("\n"))
    });

    reg!("uris", "", ctx, move |_cwd: &str, _argv: &[String], _stdin: RawFd| -> Result<String> {
        let pl = ctx.playlist.lock().unwrap();
        Ok(pl.iter().map(|m| m.uri().to_string()).collect::<Vec<_>>().join("\n"))
    });

    reg!("help", "h", ctx, move |_cwd: &str, _argv: &[String], _stdin: RawFd| -> Result<String> {
        Ok(HELP_TEXT.to_string())
    });

    reg!("mute", "", ctx, move |_cwd: &str, argv: &[String], _stdin: RawFd| -> Result<String> {
        let mut engine = ctx.engine.lock().unwrap();
        let muted = match argv.first() {
            Some(arg) => {
                let value = str_to_bool(arg)?;
                engine.set_mute(value);
                value
            }
            None => engine.toggle_mute(),
        };
        Ok(format!("mute: {muted}"))
    });

    reg!("next", "n", ctx, move |_cwd: &str, _argv: &[String], _stdin: RawFd| -> Result<String> {
        let mut engine = ctx.engine.lock().unwrap();
        let mut pl = ctx.playlist.lock().unwrap();
        match engine.play_next(&mut pl) {
            Ok(()) if engine.active_media().is_some() => Ok("playing next track".into()),
            Ok(()) => Ok("playlist finished".into()),
            Err(e) => Err(e),
        }
    });

    reg!("pause", "", ctx, move |_cwd: &str, _argv: &[String], _stdin: RawFd| -> Result<String> {
        let mut engine = ctx.engine.lock().unwrap();
        if engine.state() == crate::engine::PlayState::Stopped {
            return Err(ClimpError::Engine("cannot pause while stopped".into()));
        }
        if engine.state() == crate::engine::PlayState::Playing {
            engine.pause()?;
            Ok("paused".into())
        } else {
            let mut pl = ctx.playlist.lock().unwrap();
            engine.play(&mut pl)?;
            Ok("playing".into())
        }
    });

    reg!("play", "p", ctx, move |cwd: &str, argv: &[String], _stdin: RawFd| -> Result<String> {
        let mut engine = ctx.engine.lock().unwrap();
        let mut pl = ctx.playlist.lock().unwrap();

        if let Some(index_arg) = argv.first() {
            if let Ok(index) = str_to_int(index_arg) {
                engine.play_track(&mut pl, index as isize)?;
                return Ok(format!("playing track {index}"));
            }
        }

        if !argv.is_empty() {
            let media = resolve_all(&ctx, cwd, argv)?;
            for m in &media {
                ctx.scanner.submit(m.clone());
            }
            pl.clear();
            pl.add_list(media);
        }

        engine.play(&mut pl)?;
        Ok("playing".into())
    });

    reg!("playlist", "l", ctx, move |cwd: &str, argv: &[String], _stdin: RawFd| -> Result<String> {
        let mut pl = ctx.playlist.lock().unwrap();
        if !argv.is_empty() {
            let media = resolve_all(&ctx, cwd, argv)?;
            for m in &media {
                ctx.scanner.submit(m.clone());
            }
            pl.clear();
            pl.add_list(media);
            return Ok("playlist replaced".into());
        }
        let width = ctx.config.lock().unwrap().meta_column_width as usize;
        let current = pl.current_index();
        Ok(pl
            .iter()
            .enumerate()
            .map(|(i, m)| render_track(i, m, width, current == Some(i)))
            .collect::<Vec<_>>()
            .join("\n"))
    });

    reg!("pitch", "", ctx, move |_cwd: &str, argv: &[String], _stdin: RawFd| -> Result<String> {
        let mut engine = ctx.engine.lock().unwrap();
        match argv.first() {
            Some(v) => {
                let value = str_to_float(v)?;
                engine.set_pitch(value);
                ctx.config.lock().unwrap().pitch = engine.pitch();
                Ok(format!("pitch: {}", engine.pitch()))
            }
            None => Ok(format!("pitch: {}", engine.pitch())),
        }
    });

    reg!("speed", "", ctx, move |_cwd: &str, argv: &[String], _stdin: RawFd| -> Result<String> {
        let mut engine = ctx.engine.lock().unwrap();
        match argv.first() {
            Some(v) => {
                let value = str_to_float(v)?;
                engine.set_speed(value);
                ctx.config.lock().unwrap().speed = engine.speed();
                Ok(format!("speed: {}", engine.speed()))
            }
            None => Ok(format!("speed: {}", engine.speed())),
        }
    });

    reg!("volume", "v", ctx, move |_cwd: &str, argv: &[String], _stdin: RawFd| -> Result<String> {
        let mut engine = ctx.engine.lock().unwrap();
        match argv.first() {
            Some(v) => {
                let value = str_to_int(v)?;
                engine.set_volume(value);
                ctx.config.lock().unwrap().volume = engine.volume();
                Ok(format!("volume: {}", engine.volume()))
            }
            None => Ok(format!("volume: {}", engine.volume())),
        }
    });

    reg!("previous", "", ctx, move |_cwd: &str, _argv: &[String], _stdin: RawFd| -> Result<String> {
        Err(ClimpError::NotImplemented("previous"))
    });

    reg!("quit", "q", ctx, move |_cwd: &str, _argv: &[String], _stdin: RawFd| -> Result<String> {
        ctx.quit.store(true, Ordering::Relaxed);
        Ok("shutting down".into())
    });

    reg!("remove", "r", ctx, move |_cwd: &str, argv: &[String], _stdin: RawFd| -> Result<String> {
        if argv.is_empty() {
            return Err(ClimpError::Usage("remove requires at least one index".into()));
        }
        let mut indices = Vec::with_capacity(argv.len());
        for arg in argv {
            indices.push(str_to_int(arg)? as isize);
        }
        indices.sort_unstable_by(|a, b| b.cmp(a));
        let mut pl = ctx.playlist.lock().unwrap();
        let mut removed = 0;
        for idx in indices {
            if pl.take(idx).is_some() {
                removed += 1;
            }
        }
        Ok(format!("removed {removed} track(s)"))
    });

    reg!("repeat", "", ctx, move |_cwd: &str, argv: &[String], _stdin: RawFd| -> Result<String> {
        let mut pl = ctx.playlist.lock().unwrap();
        let value = match argv.first() {
            Some(v) => {
                let b = str_to_bool(v)?;
                pl.set_repeat(b);
                b
            }
            None => pl.toggle_repeat(),
        };
        ctx.config.lock().unwrap().repeat = value;
        Ok(format!("repeat: {value}"))
    });

    reg!("shuffle", "", ctx, move |_cwd: &str, argv: &[String], _stdin: RawFd| -> Result<String> {
        let mut pl = ctx.playlist.lock().unwrap();
        let value = match argv.first() {
            Some(v) => {
                let b = str_to_bool(v)?;
                pl.set_shuffle(b);
                b
            }
            None => pl.toggle_shuffle(),
        };
        ctx.config.lock().unwrap().shuffle = value;
        Ok(format!("shuffle: {value}"))
    });

    reg!("seek", "", ctx, move |_cwd: &str, argv: &[String], _stdin: RawFd| -> Result<String> {
        let arg = argv
            .first()
            .ok_or_else(|| ClimpError::Usage("seek requires a time argument".into()))?;
        let secs = str_to_sec(arg)?;
        ctx.engine.lock().unwrap().seek(secs as f64)?;
        Ok(format!("seeked to {secs}s"))
    });

    reg!("sort", "", ctx, move |_cwd: &str, _argv: &[String], _stdin: RawFd| -> Result<String> {
        ctx.playlist.lock().unwrap().sort();
        Ok("playlist sorted".into())
    });

    reg!("stdin", "", ctx, move |cwd: &str, _argv: &[String], stdin_fd: RawFd| -> Result<String> {
        let media = read_stdin_playlist(stdin_fd, cwd, &ctx)?;
        let n = media.len();
        for m in &media {
            ctx.scanner.submit(m.clone());
        }
        let mut pl = ctx.playlist.lock().unwrap();
        pl.clear();
        pl.add_list(media);
        Ok(format!("replaced playlist with {n} track(s) from stdin"))
    });

    reg!("stop", "s", ctx, move |_cwd: &str, _argv: &[String], _stdin: RawFd| -> Result<String> {
        ctx.engine.lock().unwrap().stop()?;
        Ok("stopped".into())
    });

    reg!("get-log", "", ctx, move |_cwd: &str, _argv: &[String], _stdin: RawFd| -> Result<String> {
        ctx.log.read_all().map_err(ClimpError::from)
    });
}

const HELP_TEXT: &str = "\
add ARGS                append resolved media to the playlist
clear                    remove every playlist entry
config                   print configuration (reloads from disk first)
current                  print cursor index, track, elapsed/total, and play state
files | uris             print playlist entries as paths or URIs
help                     print this text
mute [BOOL]              set or toggle mute
next                     play next; report if playlist finished
pause                    toggle Playing/Paused
play [ARGS]              jump to an index, replace the playlist, or resume
playlist [ARGS]          print or replace the playlist
pitch [F]                print or set the pitch ratio
speed [F]                print or set the speed ratio
volume [N]               print or set the volume
quit                     stop the daemon's main loop
remove N...              remove tracks by index
repeat BOOL              set the repeat flag
shuffle BOOL             set the shuffle flag
seek TIME                seek to m:ss, m.ss, m,ss, or plain seconds
sort                     natural-sort the playlist
stdin                    replace the playlist from the transferred stdin
stop                     stop playback
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::pipeline::Pipeline;
    use crate::engine::pitch::PitchParams;

    #[derive(Default)]
    struct NullPipeline {
        empty: bool,
    }

    impl Pipeline for NullPipeline {
        fn play_path(&mut self, _path: &Utf8Path, _params: Arc<PitchParams>) -> Result<()> {
            self.empty = false;
            Ok(())
        }
        fn pause(&mut self) {}
        fn resume(&mut self) {}
        fn stop(&mut self) {
            self.empty = true;
        }
        fn set_volume(&mut self, _gain: f32) {}
        fn is_empty(&self) -> bool {
            self.empty
        }
        fn try_seek(&mut self, _pos: std::time::Duration) -> Result<()> {
            Ok(())
        }
        fn elapsed(&self) -> std::time::Duration {
            std::time::Duration::ZERO
        }
    }

    fn new_ctx() -> (Arc<Context>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::open(&dir.path().join("log")).unwrap();
        let ctx = Arc::new(Context {
            engine: Mutex::new(Engine::with_pipeline(Box::new(NullPipeline::default()))),
            playlist: Mutex::new(Playlist::new()),
            config: Mutex::new(Config::default()),
            log,
            scanner: Arc::new(Scanner::new()),
            search_dirs: vec![],
            quit: AtomicBool::new(false),
        });
        (ctx, dir)
    }

    fn call(d: &Dispatcher, argv: &[&str]) -> Result<String> {
        let argv: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
        // No test below exercises `stdin`, so a dummy fd is never read.
        d.run_checked("/", &argv, -1)
    }

    #[test]
    fn clear_empties_the_playlist() {
        let (ctx, _dir) = new_ctx();
        ctx.playlist
            .lock()
            .unwrap()
            .insert_back(crate::media::Media::from_arg("https://example.invalid/a.mp3").unwrap());
        let mut d = Dispatcher::new();
        register_all(&mut d, ctx.clone());
        call(&d, &["clear"]).unwrap();
        assert_eq!(ctx.playlist.lock().unwrap().size(), 0);
    }

    #[test]
    fn quit_sets_the_shutdown_flag() {
        let (ctx, _dir) = new_ctx();
        let mut d = Dispatcher::new();
        register_all(&mut d, ctx.clone());
        call(&d, &["quit"]).unwrap();
        assert!(ctx.should_quit());
    }

    #[test]
    fn volume_with_no_argument_reports_current_value() {
        let (ctx, _dir) = new_ctx();
        let mut d = Dispatcher::new();
        register_all(&mut d, ctx.clone());
        let out = call(&d, &["volume"]).unwrap();
        assert!(out.contains("100"));
    }

    #[test]
    fn previous_is_reserved_and_errors() {
        let (ctx, _dir) = new_ctx();
        let mut d = Dispatcher::new();
        register_all(&mut d, ctx);
        assert!(call(&d, &["previous"]).is_err());
    }

    #[test]
    fn remove_drops_the_requested_indices() {
        let (ctx, _dir) = new_ctx();
        {
            let mut pl = ctx.playlist.lock().unwrap();
            for i in 0..3 {
                pl.insert_back(
                    crate::media::Media::from_arg(&format!("https://example.invalid/{i}.mp3"))
                        .unwrap(),
                );
            }
        }
        let mut d = Dispatcher::new();
        register_all(&mut d, ctx.clone());
        call(&d, &["remove", "0", "2"]).unwrap();
        assert_eq!(ctx.playlist.lock().unwrap().size(), 1);
    }

    #[test]
    fn add_qualifies_a_relative_argument_against_cwd() {
        let (ctx, dir) = new_ctx();
        std::fs::write(dir.path().join("song.mp3"), b"x").unwrap();
        let mut d = Dispatcher::new();
        register_all(&mut d, ctx.clone());
        d.run_checked(dir.path().to_str().unwrap(), &["add".into(), "song.mp3".into()], -1)
            .unwrap();
        assert_eq!(ctx.playlist.lock().unwrap().size(), 1);
    }

    #[test]
    fn stdin_replaces_playlist_from_the_transferred_fd() {
        use std::os::fd::AsRawFd;

        let (ctx, dir) = new_ctx();
        std::fs::write(dir.path().join("song.mp3"), b"x").unwrap();
        let listing = std::fs::File::open({
            let path = dir.path().join("list.txt");
            std::fs::write(&path, "song.mp3\n").unwrap();
            path
        })
        .unwrap();

        let mut d = Dispatcher::new();
        register_all(&mut d, ctx.clone());
        d.run_checked(dir.path().to_str().unwrap(), &["stdin".into()], listing.as_raw_fd())
            .unwrap();
        assert_eq!(ctx.playlist.lock().unwrap().size(), 1);
    }

    #[test]
    fn play_track_rejects_a_negative_index() {
        let (ctx, _dir) = new_ctx();
        ctx.playlist
            .lock()
            .unwrap()
            .insert_back(crate::media::Media::from_arg("https://example.invalid/a.mp3").unwrap());
        let mut d = Dispatcher::new();
        register_all(&mut d, ctx.clone());
        assert!(call(&d, &["play", "-1"]).is_err());
        assert_eq!(ctx.playlist.lock().unwrap().current_index(), None);
    }
}
