//! netbin Library
//!
//! Serves one subprocess per accepted socket connection:
//! - Listener for tcp, tcp4, tcp6 and unix domains
//! - Admission control bounding concurrent sessions
//! - Per-connection worker wiring the socket to the child's stdio
//! - Diagnostic drain logging the child's stderr
//! - Graceful shutdown that lets running children finish

pub mod acceptor;
pub mod admission;
pub mod drain;
pub mod error;
pub mod launcher;
pub mod listener;
pub mod server;
pub mod shutdown;
pub mod transport;
pub mod worker;

#[cfg(test)]
mod test_log;

pub use admission::{Admission, AdmissionToken};
pub use error::ServerError;
pub use launcher::{LaunchError, Launcher, RunningChild};
pub use server::Server;
pub use shutdown::{Coordinator, Phase};
pub use transport::Transport;
pub use worker::ConnectionWorker;
