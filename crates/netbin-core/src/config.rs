//! Bridge configuration.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default listen address.
pub const DEFAULT_ADDR: &str = "127.0.0.1:5877";

/// Default admission pool size.
pub const DEFAULT_MAX_CONCURRENT: usize = 20;

/// Default TCP keep-alive period in seconds.
pub const DEFAULT_TCP_KEEPALIVE_SECS: u64 = 120;

/// Transport kind to listen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Domain {
    /// TCP over whichever address families `addr` resolves to.
    #[default]
    Tcp,
    /// TCP over IPv4 only.
    Tcp4,
    /// TCP over IPv6 only.
    Tcp6,
    /// Unix domain stream socket; `addr` is a filesystem path.
    Unix,
}

impl Domain {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Tcp4 => "tcp4",
            Self::Tcp6 => "tcp6",
            Self::Unix => "unix",
        }
    }

    pub const fn is_tcp(self) -> bool {
        !matches!(self, Self::Unix)
    }

    /// Whether a resolved socket address belongs to this domain.
    pub const fn accepts(self, addr: &SocketAddr) -> bool {
        match self {
            Self::Tcp => true,
            Self::Tcp4 => addr.is_ipv4(),
            Self::Tcp6 => addr.is_ipv6(),
            Self::Unix => false,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Transport kind.
    pub domain: Domain,

    /// Listen address, or socket path for [`Domain::Unix`].
    pub addr: String,

    /// Maximum concurrently served connections; 0 disables admission control.
    pub max_concurrent: usize,

    /// TCP keep-alive period in seconds; 0 disables keep-alive tuning.
    pub tcp_keepalive_secs: u64,

    /// Program run for every connection.
    pub program: String,

    /// Arguments passed to `program`.
    pub args: Vec<String>,
}

impl Config {
    /// Create a config with default listener settings for `command`
    /// (program followed by its arguments).
    pub fn new<I, S>(command: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut command = command.into_iter().map(Into::into);
        let program = command.next().ok_or(Error::MissingCommand)?;
        Ok(Self {
            domain: Domain::default(),
            addr: DEFAULT_ADDR.to_string(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            tcp_keepalive_secs: DEFAULT_TCP_KEEPALIVE_SECS,
            program,
            args: command.collect(),
        })
    }

    #[must_use]
    pub const fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }

    #[must_use]
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Set the admission pool size (0 = unlimited).
    #[must_use]
    pub const fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Set the TCP keep-alive period in seconds (0 = disabled).
    #[must_use]
    pub const fn with_tcp_keepalive(mut self, secs: u64) -> Self {
        self.tcp_keepalive_secs = secs;
        self
    }

    /// Keep-alive period, or `None` when disabled.
    pub const fn keepalive(&self) -> Option<Duration> {
        if self.tcp_keepalive_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.tcp_keepalive_secs))
        }
    }

    /// Admission pool size, or `None` when admission control is disabled.
    pub const fn admission_limit(&self) -> Option<usize> {
        if self.max_concurrent == 0 {
            None
        } else {
            Some(self.max_concurrent)
        }
    }

    /// Check the settings for contradictions before binding anything.
    pub fn validate(&self) -> Result<()> {
        if self.program.is_empty() {
            return Err(Error::MissingCommand);
        }
        if self.addr.is_empty() {
            return Err(Error::Config("listen address is empty".into()));
        }
        // Host names are resolved and filtered at bind time; only literal
        // addresses can be checked here.
        match self.addr.parse::<SocketAddr>() {
            Ok(addr) if self.domain.is_tcp() && !self.domain.accepts(&addr) => Err(Error::Config(format!(
                "address {addr} is not valid for domain {}",
                self.domain
            ))),
            _ => Ok(()),
        }
    }
}
