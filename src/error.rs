//! Top-level error type for devgrid SDK operations
//!
//! Each subsystem defines its own error enum next to the code that raises it
//! (`AuthError`, `TransportError`, `DispatchError`, `ConfigError`). This module
//! folds them into the single [`SdkError`] surfaced at the public API boundary
//! and provides the detail sanitizer applied to anything that may echo a remote
//! response back to the caller.

use thiserror::Error;

/// Main error type for devgrid SDK operations
#[derive(Debug, Error)]
pub enum SdkError {
    #[error("Authorization error: {0}")]
    Auth(#[from] crate::auth::AuthError),

    #[error("Transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] crate::dispatch::DispatchError),

    #[error("Handler error: {0}")]
    Handler(#[from] crate::dispatch::HandlerError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Result type for SDK operations
pub type SdkResult<T> = Result<T, SdkError>;

/// Sanitize detail strings that may embed remote response bodies before they
/// reach logs or error displays. Redacts common secret patterns and caps the
/// length at 500 characters.
pub(crate) fn sanitize_error_detail(detail: &str) -> String {
    let mut sanitized = detail.to_string();

    // Redact common secret patterns
    sanitized = regex::Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+")
        .unwrap()
        .replace_all(&sanitized, "${1}=***")
        .to_string();

    // Truncate very long bodies - ensure total length is <= 500
    if sanitized.len() > 500 {
        let truncate_suffix = "...[truncated]";
        let max_content_len = 500 - truncate_suffix.len();
        sanitized = format!("{}{}", &sanitized[..max_content_len], truncate_suffix);
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthError;
    use crate::dispatch::DispatchError;

    #[test]
    fn test_sanitize_redacts_secrets() {
        let detail = "exchange denied: password=hunter2 refresh_token: abc123";
        let sanitized = sanitize_error_detail(detail);

        assert!(!sanitized.contains("hunter2"));
        assert!(!sanitized.contains("abc123"));
        assert!(sanitized.contains("password=***"));
        assert!(sanitized.contains("token=***"));
    }

    #[test]
    fn test_sanitize_case_insensitive() {
        let detail = "PASSWORD=topsecret Token: abc";
        let sanitized = sanitize_error_detail(detail);

        assert!(!sanitized.contains("topsecret"));
        assert!(!sanitized.contains("abc"));
    }

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let detail = "x".repeat(600);
        let sanitized = sanitize_error_detail(&detail);

        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_sanitize_leaves_short_bodies_alone() {
        let detail = "x".repeat(500);
        let sanitized = sanitize_error_detail(&detail);
        assert_eq!(sanitized.len(), 500);
        assert!(!sanitized.contains("truncated"));
    }

    #[test]
    fn test_sdk_error_conversions() {
        let err: SdkError = AuthError::Expired.into();
        assert!(matches!(err, SdkError::Auth(AuthError::Expired)));

        let err: SdkError = DispatchError::AlreadyConnected.into();
        assert!(matches!(
            err,
            SdkError::Dispatch(DispatchError::AlreadyConnected)
        ));
    }

    #[test]
    fn test_sdk_error_display_prefixes() {
        let err: SdkError = AuthError::NonRenewable.into();
        assert!(err.to_string().starts_with("Authorization error"));
    }
}
