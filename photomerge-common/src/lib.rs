//! Photomerge Common - shared configuration, errors and logging.
//!
//! This crate provides:
//! - Configuration types and loading (file + environment)
//! - Configuration validation
//! - Error types and context helpers
//! - Logging setup
//! - Small utilities for log hygiene

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    BotConfig, Config, DocumentConfig, MailServerConfig, NetworkConfig, ObservabilityConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};
