//! Error taxonomy (spec §7). Every variant maps to a negated POSIX
//! errno that becomes the IPC status reply; `color_eyre` only wraps at
//! the process boundary in `main`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClimpError {
    #[error("malformed ipc framing: {0}")]
    Protocol(String),

    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: u32, max: u32 },

    #[error("peer uid {peer} does not match server uid {server}")]
    PeerAuth { peer: u32, server: u32 },

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(String),

    #[error("'{0}' not found")]
    NotFound(String),

    #[error("invalid argument '{0}'")]
    InvalidArgument(String),

    #[error("playback engine error: {0}")]
    Engine(String),

    #[error("seek target is out of range")]
    SeekRange,

    #[error("stream is not seekable")]
    NotSeekable,

    #[error("command '{0}' is not implemented")]
    NotImplemented(&'static str),

    #[error("no playable media")]
    NoMedium,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ClimpError {
    /// Negated POSIX errno, suitable for the IPC status reply.
    pub fn errno_like(&self) -> i32 {
        use ClimpError::*;
        let errno = match self {
            Protocol(_) => libc::EPROTO,
            PayloadTooLarge { .. } => libc::E2BIG,
            PeerAuth { .. } => libc::EPERM,
            UnknownCommand(_) | Usage(_) | InvalidArgument(_) => libc::EINVAL,
            NotFound(_) => libc::ENOENT,
            Engine(_) => libc::EIO,
            SeekRange => libc::ERANGE,
            NotSeekable => libc::ENOTSUP,
            NotImplemented(_) => libc::ENOSYS,
            NoMedium => libc::ENOMEDIUM,
            Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        };
        -errno
    }
}

pub type Result<T> = std::result::Result<T, ClimpError>;
