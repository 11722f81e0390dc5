//! Wire framing (spec §4.H, §6). Grounded on the message-kind set
//! inferred from `original_source/.../client.c` and
//! `.../socket-server.c`'s read/write pairs, made explicit here as a
//! small fixed header plus a length-prefixed payload.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::error::{ClimpError, Result};

/// Payloads above this size are a protocol error, not an allocation.
pub const MAX_PAYLOAD: u32 = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Kind {
    Setup = 0,
    Argv = 1,
    Status = 2,
    Goodbye = 3,
}

impl Kind {
    fn from_u8(b: u8) -> Result<Self> {
        match b {
            0 => Ok(Kind::Setup),
            1 => Ok(Kind::Argv),
            2 => Ok(Kind::Status),
            3 => Ok(Kind::Goodbye),
            _ => Err(ClimpError::Protocol(format!("unknown message kind {b}"))),
        }
    }
}

pub enum Message {
    /// cwd string; the three ancillary fds travel alongside via
    /// `ipc::fds` and aren't part of this payload.
    Setup(String),
    Argv(Vec<String>),
    Status(i32),
    Goodbye,
}

async fn write_u32(stream: &mut UnixStream, v: u32) -> Result<()> {
    stream.write_all(&v.to_ne_bytes()).await?;
    Ok(())
}

async fn read_u32(stream: &mut UnixStream) -> Result<u32> {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await?;
    Ok(u32::from_ne_bytes(buf))
}

async fn write_string(stream: &mut UnixStream, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    if bytes.len() as u64 > MAX_PAYLOAD as u64 {
        return Err(ClimpError::PayloadTooLarge {
            len: bytes.len() as u32,
            max: MAX_PAYLOAD,
        });
    }
    write_u32(stream, bytes.len() as u32).await?;
    stream.write_all(bytes).await?;
    Ok(())
}

async fn read_string(stream: &mut UnixStream) -> Result<String> {
    let len = read_u32(stream).await?;
    if len > MAX_PAYLOAD {
        return Err(ClimpError::PayloadTooLarge {
            len,
            max: MAX_PAYLOAD,
        });
    }
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf).await?;
    String::from_utf8(buf).map_err(|e| ClimpError::Protocol(e.to_string()))
}

pub async fn write_message(stream: &mut UnixStream, msg: &Message) -> Result<()> {
    match msg {
        Message::Setup(cwd) => {
            stream.write_u8(Kind::Setup as u8).await?;
            write_string(stream, cwd).await?;
        }
        Message::Argv(argv) => {
            stream.write_u8(Kind::Argv as u8).await?;
            write_u32(stream, argv.len() as u32).await?;
            for arg in argv {
                write_string(stream, arg).await?;
            }
        }
        Message::Status(code) => {
            stream.write_u8(Kind::Status as u8).await?;
            stream.write_all(&code.to_ne_bytes()).await?;
        }
        Message::Goodbye => {
            stream.write_u8(Kind::Goodbye as u8).await?;
        }
    }
    stream.flush().await?;
    Ok(())
}

pub async fn read_message(stream: &mut UnixStream) -> Result<Message> {
    let kind = Kind::from_u8(stream.read_u8().await?)?;
    match kind {
        Kind::Setup => Ok(Message::Setup(read_string(stream).await?)),
        Kind::Argv => {
            let count = read_u32(stream).await?;
            if count > MAX_PAYLOAD {
                return Err(ClimpError::Protocol("argv count out of bounds".into()));
            }
            let mut argv = Vec::with_capacity(count as usize);
            for _ in 0..count {
                argv.push(read_string(stream).await?);
            }
            Ok(Message::Argv(argv))
        }
        Kind::Status => {
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await?;
            Ok(Message::Status(i32::from_ne_bytes(buf)))
        }
        Kind::Goodbye => Ok(Message::Goodbye),
    }
}
