use std::net::IpAddr;

use crate::config::models::GatewayConfig;

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid port '{port}': {reason}")]
    InvalidPort { port: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// A port is either empty (assign automatically) or a non-zero u16.
///
/// Returns the parsed port so callers store `8080` rather than ` +8080`.
pub fn validate_port(port: &str) -> ValidationResult<Option<u16>> {
    let port = port.trim();
    if port.is_empty() {
        return Ok(None);
    }
    match port.parse::<u16>() {
        Ok(0) => Err(ValidationError::InvalidPort {
            port: port.to_string(),
            reason: "port 0 is not allowed".to_string(),
        }),
        Ok(port) => Ok(Some(port)),
        Err(e) => Err(ValidationError::InvalidPort {
            port: port.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Gateway configuration validator
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the whole configuration, reporting every problem at once.
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if config.common.runtime_path.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "common.RuntimePath".to_string(),
            });
        }
        if config.gateway.www_path.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "gateway.WWWPath".to_string(),
            });
        }
        if let Err(e) = validate_port(&config.gateway.port) {
            errors.push(e);
        }
        if config.gateway.bind_host.parse::<IpAddr>().is_err() {
            errors.push(ValidationError::InvalidField {
                field: "gateway.BindHost".to_string(),
                message: format!("'{}' is not an IP address", config.gateway.bind_host),
            });
        }
        if config.gateway.probe_attempts == 0 {
            errors.push(ValidationError::InvalidField {
                field: "gateway.ProbeAttempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if config.gateway.probe_timeout_millis == 0 {
            errors.push(ValidationError::InvalidField {
                field: "gateway.ProbeTimeoutMillis".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(&errors),
            }),
        }
    }

    fn format_multiple_errors(errors: &[ValidationError]) -> String {
        let mut message = format!("{} configuration errors:", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("\n  {}. {}", i + 1, error));
        }
        message
    }
}
