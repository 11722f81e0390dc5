//! Append-only leveled log (spec §4.K). Grounded on
//! `original_source/.../core/climpd-log.c`'s `log_vprintf`/`log_append`/
//! `log_print` trio, bridged here to `tracing` so the rest of the crate
//! logs through the ordinary `tracing` macros while still landing on
//! the exact per-user log file the spec names.
//!
//! `tracing-subscriber` already owns "format a record and write it
//! somewhere"; this module supplies the "somewhere" as a `Layer` that
//! also remembers the underlying file so `dump` can satisfy the
//! "copy the whole log to a given descriptor" requirement.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

use crate::error::Result;

/// Resolves the per-user log path: `CLIMPD_LOGFILE` if set, else
/// `/tmp/climpd-<uid>.log`.
pub fn default_path() -> PathBuf {
    if let Ok(p) = std::env::var("CLIMPD_LOGFILE") {
        return PathBuf::from(p);
    }
    PathBuf::from(format!("/tmp/climpd-{}.log", nix::unistd::getuid()))
}

/// An append-only log file shared between the `tracing` writer and the
/// `dump` operation invoked by the `stdin`/debug command path.
#[derive(Clone)]
pub struct Log {
    file: Arc<Mutex<File>>,
}

impl Log {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;
        Ok(Log {
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Appends a single already-formatted line, prefixed with a level
    /// tag the way `log_vprintf` tags each record.
    pub fn write(&self, level: &str, tag: &str, msg: &str) {
        let mut file = self.file.lock().unwrap();
        let _ = writeln!(file, "[{level}] {tag}: {msg}");
    }

    /// Appends raw text with no level tag or newline, continuing the
    /// previous line (`climpd_log_append`'s contract).
    pub fn append(&self, text: &str) {
        let mut file = self.file.lock().unwrap();
        let _ = file.write_all(text.as_bytes());
    }

    /// Copies the full log contents to `fd`, from the start of the
    /// file (`climpd_log_print`).
    pub fn dump(&self, fd: RawFd) -> io::Result<()> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        // SAFETY: `fd` is borrowed for the duration of this write only;
        // the caller retains ownership.
        let mut out = unsafe { File::from_raw_fd(fd) };
        let result = out.write_all(&buf);
        std::mem::forget(out);
        result
    }

    pub fn fd(&self) -> RawFd {
        self.file.lock().unwrap().as_raw_fd()
    }

    /// Reads the whole log back as a string (the `get-log` command's
    /// textual equivalent of `climpd_log_print`).
    pub fn read_all(&self) -> io::Result<String> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(0))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        Ok(buf)
    }
}

impl<'a> MakeWriter<'a> for Log {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter { file: self.file.clone() }
    }
}

pub struct LogWriter {
    file: Arc<Mutex<File>>,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().unwrap().flush()
    }
}

/// Installs a global `tracing` subscriber that writes formatted
/// records to `log` (debug/info/warning/error, matching the original's
/// four levels) in addition to whatever `RUST_LOG` filtering the
/// environment requests.
pub fn init(log: Log) -> Result<()> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let fmt_layer = fmt::layer().with_writer(log).with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_dump_round_trips_through_a_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("climpd.log");
        let log = Log::open(&path).unwrap();

        log.write("info", "test", "hello");
        log.append(" continued\n");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[info] test: hello"));
        assert!(contents.contains("continued"));
    }

    #[test]
    fn append_continues_the_previous_line_without_a_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("climpd.log");
        let log = Log::open(&path).unwrap();

        log.append("no");
        log.append("tag");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "notag");
    }
}
