//! IPC transport (spec §4.H). Grounded on `original_source/.../client.c`
//! and `.../socket-server.c` for the setup → argv → status → goodbye
//! handshake this module's `framing`/`fds` submodules implement.

pub mod fds;
pub mod framing;

use tokio::net::UnixStream;

use crate::error::{ClimpError, Result};
use fds::TransferredFds;
use framing::Message;

/// One fully-received client request: its transferred descriptors, its
/// working directory, and its argv.
pub struct Request {
    pub fds: TransferredFds,
    pub cwd: String,
    pub argv: Vec<String>,
}

/// Reads the strict setup-then-argv handshake off a freshly accepted
/// connection (spec: "setup must precede argv").
pub async fn read_request(stream: &mut UnixStream) -> Result<Request> {
    let fds = fds::recv_fds(stream)?;

    let cwd = match framing::read_message(stream).await? {
        Message::Setup(cwd) => cwd,
        _ => return Err(ClimpError::Protocol("expected setup record first".into())),
    };

    let argv = match framing::read_message(stream).await? {
        Message::Argv(argv) => argv,
        _ => return Err(ClimpError::Protocol("expected argv record after setup".into())),
    };

    Ok(Request { fds, cwd, argv })
}

/// Sends the status reply and tears the connection down (spec: "status
/// reply must precede connection close").
pub async fn write_status(stream: &mut UnixStream, status: i32) -> Result<()> {
    framing::write_message(stream, &Message::Status(status)).await
}

/// Client side of the handshake: transfers stdin/stdout/stderr and the
/// cwd, then the argv, then awaits the status reply.
pub async fn send_request(
    stream: &mut UnixStream,
    fds: [std::os::fd::RawFd; 3],
    cwd: String,
    argv: Vec<String>,
) -> Result<i32> {
    fds::send_fds(stream, fds)?;
    framing::write_message(stream, &Message::Setup(cwd)).await?;
    framing::write_message(stream, &Message::Argv(argv)).await?;

    match framing::read_message(stream).await? {
        Message::Status(code) => Ok(code),
        _ => Err(ClimpError::Protocol("expected status reply".into())),
    }
}
