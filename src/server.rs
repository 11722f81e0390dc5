//! Socket server (spec §4.I). Grounded on
//! `original_source/.../ipc/socket-server.c`: unlink-then-bind-then-
//! listen, `SO_PEERCRED` authorization, a monotonic per-connection
//! stopwatch, one connection served to completion before the next is
//! accepted.

use std::io::Write;
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::path::Path;
use std::time::Instant;

use tokio::net::{UnixListener, UnixStream};
use tracing::{info, warn};

use crate::error::Result;
use crate::ipc;

const BACKLOG_HINT: u32 = 5;

pub struct Server {
    listener: UnixListener,
    path: std::path::PathBuf,
}

impl Server {
    /// Removes a stale socket (ignoring `NotFound`), binds, and
    /// listens. `tokio::net::UnixListener` doesn't expose a backlog
    /// parameter directly; the OS default is at least the spec's
    /// required minimum of 1.
    pub fn bind(path: &Path) -> Result<Self> {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let _ = BACKLOG_HINT;
        let listener = UnixListener::bind(path)?;
        info!(path = %path.display(), "listening");
        Ok(Server {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// Accepts and fully serves one connection, handing its cwd, argv,
    /// and transferred stdin fd to `handle`. Never interleaves two
    /// connections (spec §5).
    pub async fn accept_one<F>(&self, handle: F) -> Result<()>
    where
        F: FnOnce(&str, &[String], RawFd) -> Result<String>,
    {
        let (mut stream, _addr) = self.listener.accept().await?;
        self.serve(&mut stream, handle).await
    }

    async fn serve<F>(&self, stream: &mut UnixStream, handle: F) -> Result<()>
    where
        F: FnOnce(&str, &[String], RawFd) -> Result<String>,
    {
        let started = Instant::now();

        if let Err(e) = ipc::fds::check_peer_uid(stream) {
            warn!(error = %e, "rejected unauthorized peer");
            return Err(e);
        }

        let request = ipc::read_request(stream).await?;
        info!(cwd = %request.cwd, "user connected");

        let status = match handle(
            &request.cwd,
            &request.argv,
            request.fds.stdin.as_raw_fd(),
        ) {
            Ok(text) => {
                if let Err(e) = write_to_fd(request.fds.stdout.as_raw_fd(), &text) {
                    warn!(error = %e, "failed to write reply to client stdout");
                }
                0
            }
            Err(e) => {
                if let Err(write_err) = write_to_fd(request.fds.stderr.as_raw_fd(), &e.to_string())
                {
                    warn!(error = %write_err, "failed to write error to client stderr");
                }
                e.errno_like()
            }
        };

        ipc::write_status(stream, status).await?;

        info!(elapsed_ms = started.elapsed().as_millis(), "served connection");
        Ok(())
    }
}

/// Writes `text` to a transferred descriptor (the client's stdout on
/// success, its stderr on a command-usage/engine error — spec §7). The
/// wire protocol carries no text payload of its own (spec §4.H) — all
/// command output is delivered straight to the fd the client handed
/// over in its setup record.
fn write_to_fd(fd: RawFd, text: &str) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    // SAFETY: borrowed only for this write; the caller (`Request`'s
    // `TransferredFds`) retains and eventually closes the real fd.
    let mut out = unsafe { std::fs::File::from_raw_fd(fd) };
    let payload = if text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{text}\n")
    };
    let result = out.write_all(payload.as_bytes());
    std::mem::forget(out);
    result.map_err(Into::into)
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "current_thread")]
    async fn bind_removes_a_stale_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("climpd.sock");
        std::fs::write(&path, b"not a socket").unwrap();

        let server = Server::bind(&path).unwrap();
        assert!(path.exists());
        drop(server);
        assert!(!path.exists());
    }
}
