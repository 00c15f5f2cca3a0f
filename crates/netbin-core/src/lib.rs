//! `netbin` Core Library
//!
//! Shared functionality for the `netbin` bridge:
//! - Listener and session configuration with validation
//! - Tracing subscriber initialisation
//! - Common error types

pub mod config;
pub mod error;
pub mod tracing_init;

pub use config::{Config, Domain};
pub use error::{Error, Result};
