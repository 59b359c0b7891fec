//! Configuration validation.
//!
//! Runs once at startup. A missing bot token is fatal; an unconfigured mail
//! relay is not, since mail delivery reports its own error per attempt.

use thiserror::Error;

use crate::config::{
    parse_socket, BotConfig, Config, DocumentConfig, MailServerConfig, NetworkConfig,
    ObservabilityConfig,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

impl From<ValidationError> for crate::error::Error {
    fn from(err: ValidationError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors: Vec<ValidationError> = [
            self.bot.validate(),
            self.mail.validate(),
            self.document.validate(),
            self.network.validate(),
            self.observability.validate(),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load with environment overrides and validate.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(crate::error::Error::from)?;
        Ok(config)
    }
}

impl Validate for BotConfig {
    fn validate(&self) -> ValidationResult<()> {
        match self.bot_token.as_deref() {
            Some(token) if !token.trim().is_empty() => {}
            _ => {
                return Err(ValidationError::MissingField {
                    field: "bot.bot_token".into(),
                })
            }
        }

        if !(self.api_base.starts_with("http://") || self.api_base.starts_with("https://")) {
            return Err(ValidationError::InvalidValue {
                field: "bot.api_base".into(),
                reason: format!("'{}' is not an http(s) URL", self.api_base),
            });
        }

        Ok(())
    }
}

impl Validate for MailServerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if let Some(ref socket) = self.smtp_socket {
            if parse_socket(socket).is_none() {
                return Err(ValidationError::InvalidValue {
                    field: "mail.smtp_socket".into(),
                    reason: format!("'{socket}' is not host[:port]"),
                });
            }
        }
        Ok(())
    }
}

impl Validate for DocumentConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !(self.resolution_dpi.is_finite() && self.resolution_dpi > 0.0) {
            return Err(ValidationError::InvalidValue {
                field: "document.resolution_dpi".into(),
                reason: "must be a positive number".into(),
            });
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ValidationError::InvalidValue {
                field: "document.jpeg_quality".into(),
                reason: "must be between 1 and 100".into(),
            });
        }
        if self.extension.is_empty() || self.extension.contains('.') {
            return Err(ValidationError::InvalidValue {
                field: "document.extension".into(),
                reason: "must be a bare extension such as 'pdf'".into(),
            });
        }
        Ok(())
    }
}

impl Validate for NetworkConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.request_timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "network.request_timeout_secs".into(),
                reason: "must be at least 1 second".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of {valid_levels:?}"),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of {valid_formats:?}"),
            });
        }

        Ok(())
    }
}
