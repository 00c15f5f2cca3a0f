//! Accepted connection kinds and their socket-level controls.
//!
//! The set of transports is closed: a TCP stream or a unix domain stream.
//! Both expose the same capabilities to the worker (keep-alive tuning, a
//! read/write split for the child's stdio, half-close and close), so the
//! kind only matters once, at accept time.

use std::io;
use std::net::Shutdown;
use std::time::Duration;

use socket2::{SockRef, Socket, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

/// Read side of a session, bound to the child's stdin.
pub type SessionReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write side of a session, bound to the child's stdout.
pub type SessionWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One accepted connection.
#[derive(Debug)]
pub enum Transport {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Transport {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Tcp(_) => "tcp",
            #[cfg(unix)]
            Self::Unix(_) => "unix",
        }
    }

    /// Printable identity of the remote end.
    pub fn peer(&self) -> String {
        match self {
            Self::Tcp(stream) => stream
                .peer_addr()
                .map_or_else(|_| "unknown".to_string(), |addr| addr.to_string()),
            #[cfg(unix)]
            Self::Unix(stream) => match stream.peer_addr() {
                Ok(addr) => addr
                    .as_pathname()
                    .map_or_else(|| "@".to_string(), |path| path.display().to_string()),
                Err(_) => "unknown".to_string(),
            },
        }
    }

    /// Enable TCP keep-alive probing after `period` of idleness, repeating
    /// every `period`. Returns `false` for transports without keep-alive.
    pub fn set_keepalive(&self, period: Duration) -> io::Result<bool> {
        match self {
            Self::Tcp(stream) => {
                let keepalive = TcpKeepalive::new().with_time(period);
                #[cfg(any(
                    target_os = "linux",
                    target_os = "android",
                    target_os = "macos",
                    target_os = "freebsd",
                    target_os = "windows"
                ))]
                let keepalive = keepalive.with_interval(period);
                SockRef::from(stream).set_tcp_keepalive(&keepalive)?;
                Ok(true)
            }
            #[cfg(unix)]
            Self::Unix(_) => Ok(false),
        }
    }

    /// Split into independently owned halves plus a control handle for
    /// shutting the socket down.
    pub fn into_session(self) -> io::Result<Session> {
        match self {
            Self::Tcp(stream) => {
                let control = SockRef::from(&stream).try_clone()?;
                let (reader, writer) = stream.into_split();
                Ok(Session {
                    reader: Box::new(reader),
                    writer: Box::new(writer),
                    control: SessionControl { socket: control },
                })
            }
            #[cfg(unix)]
            Self::Unix(stream) => {
                let control = SockRef::from(&stream).try_clone()?;
                let (reader, writer) = stream.into_split();
                Ok(Session {
                    reader: Box::new(reader),
                    writer: Box::new(writer),
                    control: SessionControl { socket: control },
                })
            }
        }
    }
}

/// A connection split for wiring into a child process.
pub struct Session {
    pub reader: SessionReader,
    pub writer: SessionWriter,
    pub control: SessionControl,
}

/// Shutdown handle sharing the session's underlying socket.
#[derive(Debug)]
pub struct SessionControl {
    socket: Socket,
}

impl SessionControl {
    /// Stop consuming input from the peer; the write direction stays open.
    pub fn close_read(&self) -> io::Result<()> {
        shutdown(&self.socket, Shutdown::Read)
    }

    /// Close the connection in both directions.
    pub fn close(self) -> io::Result<()> {
        shutdown(&self.socket, Shutdown::Both)
    }
}

/// `shutdown(2)` that treats an already disconnected peer as success.
fn shutdown(socket: &Socket, how: Shutdown) -> io::Result<()> {
    match socket.shutdown(how) {
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}
