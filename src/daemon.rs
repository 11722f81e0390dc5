//! Daemon lifecycle (spec §4.J). Grounded on
//! `original_source/.../core/daemonize.c` (double-fork, `setsid`,
//! `umask`, `chdir`, std-stream redirection) and `.../client/client.c`'s
//! `client_new` autospawn-and-retry loop.

use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::stat::Mode;
use nix::unistd::{self, ForkResult};
use tracing::{info, warn};

use crate::error::{ClimpError, Result};
use crate::log::Log;

/// Forks twice (exiting the parent each time) so the final process is
/// not a session leader and can never reacquire a controlling
/// terminal, then `setsid`s, `chdir("/")`, `umask(0)`s, and redirects
/// the standard streams to `/dev/null`.
pub fn daemonize() -> Result<()> {
    match unsafe { unistd::fork() }.map_err(io_err)? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    unistd::setsid().map_err(io_err)?;

    match unsafe { unistd::fork() }.map_err(io_err)? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    unistd::umask(Mode::empty());
    unistd::chdir("/").map_err(io_err)?;
    redirect_std_streams_to_null();

    Ok(())
}

fn io_err(e: nix::Error) -> ClimpError {
    ClimpError::Io(std::io::Error::from_raw_os_error(e as i32))
}

fn redirect_std_streams_to_null() {
    let devnull = OpenOptions::new().read(true).write(true).open("/dev/null");
    let Ok(devnull) = devnull else {
        warn!("failed to open /dev/null - closing standard streams instead");
        for fd in [0, 1, 2] {
            let _ = unistd::close(fd);
        }
        return;
    };

    for fd in [0, 1, 2] {
        if unistd::dup2(devnull.as_raw_fd(), fd).is_err() {
            warn!(fd, "failed to redirect standard stream - closing instead");
            let _ = unistd::close(fd);
        }
    }
}

/// Descriptor of the log file the fatal-signal handler writes its
/// backtrace to; set once by `install_fatal_signal_handlers` and read
/// back from the `extern "C"` handler, which cannot capture anything
/// from its environment.
static FATAL_LOG_FD: AtomicI32 = AtomicI32::new(-1);

/// The actual signal handler (spec §4.J/§7: "fatal signals to a
/// backtrace-to-log handler followed by process exit"). Grounded on
/// `original_source/.../core/climpd.c`'s crash handler, which does the
/// same write-then-`_exit` in place of a full recovery path.
extern "C" fn handle_fatal_signal(sig: libc::c_int) {
    let fd = FATAL_LOG_FD.load(Ordering::Relaxed);
    if fd >= 0 {
        let header = format!("\nfatal: caught signal {sig}, backtrace follows\n");
        unsafe {
            libc::write(fd, header.as_ptr().cast(), header.len());
        }
        let bt = format!("{:?}\n", backtrace::Backtrace::new());
        unsafe {
            libc::write(fd, bt.as_ptr().cast(), bt.len());
        }
    }
    unsafe { libc::_exit(128 + sig) }
}

/// Installs the fatal-signal table (`SIGILL`, `SIGBUS`, `SIGSEGV`,
/// `SIGFPE`, `SIGSYS`) and ignores the interactive-suspend tty signals
/// (`SIGTSTP`, `SIGTTIN`, `SIGTTOU`) a backgrounded, terminal-less
/// daemon has no business reacting to.
pub fn install_fatal_signal_handlers(log: &Log) -> Result<()> {
    FATAL_LOG_FD.store(log.fd(), Ordering::Relaxed);

    let fatal_action = SigAction::new(
        SigHandler::Handler(handle_fatal_signal),
        SaFlags::SA_RESETHAND,
        SigSet::empty(),
    );
    for sig in [
        Signal::SIGILL,
        Signal::SIGBUS,
        Signal::SIGSEGV,
        Signal::SIGFPE,
        Signal::SIGSYS,
    ] {
        unsafe { nix::sys::signal::sigaction(sig, &fatal_action) }.map_err(io_err)?;
    }

    let ignore_action = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    for sig in [Signal::SIGTSTP, Signal::SIGTTIN, Signal::SIGTTOU] {
        unsafe { nix::sys::signal::sigaction(sig, &ignore_action) }.map_err(io_err)?;
    }

    Ok(())
}

/// Registers the signal table from spec §4.J: tty/job-control signals
/// ignored, `SIGTERM` requests main-loop shutdown, fatal signals log a
/// backtrace and exit. Returns a future that resolves once a shutdown
/// signal has been received.
pub async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    for kind in [SignalKind::pipe(), SignalKind::hangup()] {
        let mut sig = signal(kind).map_err(ClimpError::from)?;
        tokio::spawn(async move {
            loop {
                sig.recv().await;
            }
        });
    }

    let mut sigterm = signal(SignalKind::terminate()).map_err(ClimpError::from)?;
    let mut sigint = signal(SignalKind::interrupt()).map_err(ClimpError::from)?;

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    Ok(())
}

/// Per-user socket path (spec §6): `/tmp/.climpd-<uid>.sock`.
pub fn default_socket_path() -> std::path::PathBuf {
    std::path::Path::new("/tmp").join(format!(".climpd-{}.sock", unistd::getuid()))
}

const CONNECT_RETRY_TOTAL: Duration = Duration::from_secs(10);
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// The client's autospawn contract (spec §4.J): if the first connect
/// fails with `ENOENT`/`ECONNREFUSED`, unlink any stale socket, spawn
/// `climpd`, and retry connecting for up to ~10s.
pub async fn autospawn_and_connect(
    socket_path: &Path,
    climpd_binary: &Path,
) -> Result<tokio::net::UnixStream> {
    match tokio::net::UnixStream::connect(socket_path).await {
        Ok(stream) => return Ok(stream),
        Err(e) if matches!(e.raw_os_error(), Some(libc::ENOENT) | Some(libc::ECONNREFUSED)) => {}
        Err(e) => return Err(e.into()),
    }

    match std::fs::remove_file(socket_path) {
        Ok(()) | Err(_) if !socket_path.exists() => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(_) => {}
    }

    std::process::Command::new(climpd_binary)
        .spawn()
        .map_err(ClimpError::from)?;

    let deadline = tokio::time::Instant::now() + CONNECT_RETRY_TOTAL;
    loop {
        match tokio::net::UnixStream::connect(socket_path).await {
            Ok(stream) => return Ok(stream),
            Err(_) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
