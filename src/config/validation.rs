//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, known formats)
//! - Compile every route pattern up front
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::ServerConfig;
use crate::encoding::Encoding;
use crate::routing::RoutePattern;

/// A single semantic problem, naming the offending field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.hostname.trim().is_empty() {
        errors.push(ValidationError::new("listener.hostname", "must not be empty"));
    }
    if !config.listener.pathname.starts_with('/') {
        errors.push(ValidationError::new("listener.pathname", "must start with '/'"));
    }

    if let Some(tls) = &config.tls {
        if tls.cert_path.is_empty() {
            errors.push(ValidationError::new("tls.cert_path", "must not be empty"));
        }
        if tls.key_path.is_empty() {
            errors.push(ValidationError::new("tls.key_path", "must not be empty"));
        }
    }

    for (i, path) in config.statics.paths.iter().enumerate() {
        if !path.starts_with('/') {
            errors.push(ValidationError::new(format!("statics.paths[{i}]"), "must start with '/'"));
        }
    }

    if config.timeouts.request_ms == Some(0) {
        errors.push(ValidationError::new("timeouts.request_ms", "must be greater than 0"));
    }

    if config.limits.max_decoded_body == 0 {
        errors.push(ValidationError::new("limits.max_decoded_body", "must be greater than 0"));
    }

    if config.rate_limit.enabled {
        if config.rate_limit.timeout_ms == 0 {
            errors.push(ValidationError::new("rate_limit.timeout_ms", "must be greater than 0"));
        }
        if config.rate_limit.max_requests == 0 {
            errors.push(ValidationError::new("rate_limit.max_requests", "must be greater than 0"));
        }
    }

    match Encoding::parse(&config.compression.format) {
        Some(Encoding::Gzip | Encoding::Deflate) => {}
        _ => errors.push(ValidationError::new(
            "compression.format",
            format!("unsupported format {:?}, expected gzip or deflate", config.compression.format),
        )),
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address {:?}", config.observability.metrics_address),
        ));
    }

    for (i, route) in config.routes.iter().enumerate() {
        if route.handler.trim().is_empty() {
            errors.push(ValidationError::new(format!("routes[{i}].handler"), "must not be empty"));
        }
        if let Err(err) = RoutePattern::parse(&route.pattern, &config.listener.pathname) {
            errors.push(ValidationError::new(format!("routes[{i}].pattern"), err.to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
