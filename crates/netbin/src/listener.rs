//! Listening endpoint for every supported domain.

use std::io;
#[cfg(unix)]
use std::path::PathBuf;

use netbin_core::Domain;
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tracing::{debug, warn};

use crate::transport::Transport;

/// The bound endpoint. Closed exactly once, by [`Listener::close`].
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix { listener: UnixListener, path: PathBuf },
}

impl Listener {
    /// Bind `addr` in `domain`.
    ///
    /// For `tcp4`/`tcp6` the address is resolved and only results of the
    /// matching family are tried.
    pub async fn bind(domain: Domain, addr: &str) -> io::Result<Self> {
        match domain {
            Domain::Tcp => Ok(Self::Tcp(TcpListener::bind(addr).await?)),
            Domain::Tcp4 | Domain::Tcp6 => {
                let mut last_err = None;
                for candidate in tokio::net::lookup_host(addr).await? {
                    if !domain.accepts(&candidate) {
                        continue;
                    }
                    match TcpListener::bind(candidate).await {
                        Ok(listener) => return Ok(Self::Tcp(listener)),
                        Err(e) => {
                            debug!(%candidate, error = %e, "Bind attempt failed");
                            last_err = Some(e);
                        }
                    }
                }
                Err(last_err.unwrap_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::AddrNotAvailable,
                        format!("no {domain} address found for {addr}"),
                    )
                }))
            }
            #[cfg(unix)]
            Domain::Unix => {
                let path = PathBuf::from(addr);
                let listener = UnixListener::bind(&path)?;
                Ok(Self::Unix { listener, path })
            }
            #[cfg(not(unix))]
            Domain::Unix => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix domain sockets are not supported on this platform",
            )),
        }
    }

    /// Printable bound address; for TCP this reflects the actual port.
    pub fn local_addr(&self) -> String {
        match self {
            Self::Tcp(listener) => listener
                .local_addr()
                .map_or_else(|_| "unknown".to_string(), |addr| addr.to_string()),
            #[cfg(unix)]
            Self::Unix { path, .. } => path.display().to_string(),
        }
    }

    /// Wait for the next connection.
    pub async fn accept(&self) -> io::Result<Transport> {
        match self {
            Self::Tcp(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok(Transport::Tcp(stream))
            }
            #[cfg(unix)]
            Self::Unix { listener, .. } => {
                let (stream, _) = listener.accept().await?;
                Ok(Transport::Unix(stream))
            }
        }
    }

    /// Stop listening. A unix socket file created by [`Listener::bind`] is
    /// removed.
    pub fn close(self) {
        match self {
            Self::Tcp(listener) => drop(listener),
            #[cfg(unix)]
            Self::Unix { listener, path } => {
                drop(listener);
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "Failed to remove socket file");
                }
            }
        }
    }
}
