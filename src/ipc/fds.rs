//! `SCM_RIGHTS` ancillary fd transfer and peer-credential check (spec
//! §4.H, §4.I). Grounded on
//! `original_source/.../socket-server.c`'s `SO_PEERCRED` check,
//! translated to `nix`'s socket API since Rust's std doesn't expose
//! ancillary messages.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use nix::sys::socket::{self, ControlMessage, ControlMessageOwned, MsgFlags};
use nix::unistd;
use tokio::net::UnixStream;

use crate::error::{ClimpError, Result};

/// The client's stdin/stdout/stderr, transferred as part of the setup
/// record so the daemon can write straight to the invoking terminal.
pub struct TransferredFds {
    pub stdin: OwnedFd,
    pub stdout: OwnedFd,
    pub stderr: OwnedFd,
}

/// Sends `fds` as ancillary data alongside one byte of regular payload
/// (some platforms drop a zero-length `sendmsg`).
pub fn send_fds(stream: &UnixStream, fds: [RawFd; 3]) -> Result<()> {
    let iov = [std::io::IoSlice::new(&[0u8])];
    let cmsg = [ControlMessage::ScmRights(&fds)];
    socket::sendmsg::<()>(
        stream.as_raw_fd(),
        &iov,
        &cmsg,
        MsgFlags::empty(),
        None,
    )
    .map_err(|e| ClimpError::Protocol(format!("sendmsg failed: {e}")))?;
    Ok(())
}

/// Receives the three setup fds. Errors if fewer or more than three
/// fds were attached (spec: "three fds for the setup record").
pub fn recv_fds(stream: &UnixStream) -> Result<TransferredFds> {
    let mut buf = [0u8; 1];
    let mut iov = [std::io::IoSliceMut::new(&mut buf)];
    let mut cmsg_buf = nix::cmsg_space!([RawFd; 3]);

    let msg = socket::recvmsg::<()>(
        stream.as_raw_fd(),
        &mut iov,
        Some(&mut cmsg_buf),
        MsgFlags::empty(),
    )
    .map_err(|e| ClimpError::Protocol(format!("recvmsg failed: {e}")))?;

    let mut fds = Vec::new();
    for cmsg in msg.cmsgs().map_err(|e| ClimpError::Protocol(e.to_string()))? {
        if let ControlMessageOwned::ScmRights(received) = cmsg {
            fds.extend(received);
        }
    }

    if fds.len() != 3 {
        for fd in fds {
            let _ = unistd::close(fd);
        }
        return Err(ClimpError::Protocol(format!(
            "expected 3 setup fds, got {}",
            fds.len()
        )));
    }

    // SAFETY: each fd came from a just-received SCM_RIGHTS message and
    // is owned by nobody else yet.
    let mut iter = fds.into_iter();
    Ok(TransferredFds {
        stdin: unsafe { OwnedFd::from_raw_fd(iter.next().unwrap()) },
        stdout: unsafe { OwnedFd::from_raw_fd(iter.next().unwrap()) },
        stderr: unsafe { OwnedFd::from_raw_fd(iter.next().unwrap()) },
    })
}

/// Authenticates the connection per spec §4.I: the peer's uid must
/// equal the server's own uid.
pub fn check_peer_uid(stream: &UnixStream) -> Result<()> {
    let cred = socket::getsockopt(stream, socket::sockopt::PeerCredentials)
        .map_err(|e| ClimpError::Protocol(format!("SO_PEERCRED failed: {e}")))?;
    let server_uid = unistd::getuid().as_raw();
    let peer_uid = cred.uid();
    if peer_uid != server_uid {
        return Err(ClimpError::PeerAuth {
            peer: peer_uid,
            server: server_uid,
        });
    }
    Ok(())
}
