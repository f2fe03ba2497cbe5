//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into
//! core services. Request handlers never read process-wide environment
//! variables, which keeps behaviour consistent across multi-threaded runtimes
//! and test harnesses.

use crate::crypto::decode_hex;
use crate::error::{CoreError, CoreResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fixed AES-256 message key used when no override is configured.
///
/// Matches the fixed test settings the original deployment seeded its data
/// with. Not secure; a real deployment must supply its own key material.
pub const DEFAULT_MESSAGE_KEY: [u8; 32] = *b"0123456789abcdef0123456789abcdef";

/// Idle timeout applied to sessions when none is configured.
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    db_path: PathBuf,
    audit_dir: PathBuf,
    session_idle_timeout: Duration,
    message_key: [u8; 32],
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if the session idle timeout is zero.
    pub fn new(
        db_path: PathBuf,
        audit_dir: PathBuf,
        session_idle_timeout: Duration,
        message_key: [u8; 32],
    ) -> CoreResult<Self> {
        if session_idle_timeout.is_zero() {
            return Err(CoreError::Validation(
                "session idle timeout cannot be zero".into(),
            ));
        }

        Ok(Self {
            db_path,
            audit_dir,
            session_idle_timeout,
            message_key,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn audit_dir(&self) -> &Path {
        &self.audit_dir
    }

    pub fn session_idle_timeout(&self) -> Duration {
        self.session_idle_timeout
    }

    pub fn message_key(&self) -> [u8; 32] {
        self.message_key
    }
}

/// Parse the message key from an optional hex string value.
///
/// If `value` is `None` or empty/whitespace, returns [`DEFAULT_MESSAGE_KEY`].
///
/// # Errors
///
/// Returns [`CoreError::Validation`] if the value is not 64 hex characters.
pub fn message_key_from_env_value(value: Option<String>) -> CoreResult<[u8; 32]> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let Some(value) = value else {
        return Ok(DEFAULT_MESSAGE_KEY);
    };

    decode_hex(&value)
        .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
        .ok_or_else(|| {
            CoreError::Validation("message key must be 64 hexadecimal characters".into())
        })
}

/// Parse the session idle timeout from an optional seconds value.
///
/// If `value` is `None` or empty/whitespace, returns
/// [`DEFAULT_SESSION_IDLE_TIMEOUT`].
///
/// # Errors
///
/// Returns [`CoreError::Validation`] if the value is not a positive integer.
pub fn session_timeout_from_env_value(value: Option<String>) -> CoreResult<Duration> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let Some(value) = value else {
        return Ok(DEFAULT_SESSION_IDLE_TIMEOUT);
    };

    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(CoreError::Validation(
            "session timeout must be a positive number of seconds".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_key_defaults_when_absent() {
        let key = message_key_from_env_value(None).expect("default key should resolve");
        assert_eq!(key, DEFAULT_MESSAGE_KEY);

        let key = message_key_from_env_value(Some("   ".into())).expect("blank treated as absent");
        assert_eq!(key, DEFAULT_MESSAGE_KEY);
    }

    #[test]
    fn test_message_key_parses_hex_override() {
        let hex = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";
        let key = message_key_from_env_value(Some(hex.into())).expect("should parse");
        assert_eq!(key[0], 0x00);
        assert_eq!(key[31], 0xff);
    }

    #[test]
    fn test_message_key_rejects_bad_length() {
        let err = message_key_from_env_value(Some("abcd".into()))
            .expect_err("short key should be rejected");
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_session_timeout_rejects_zero() {
        let err = session_timeout_from_env_value(Some("0".into()))
            .expect_err("zero timeout should be rejected");
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_config_rejects_zero_timeout() {
        let err = CoreConfig::new(
            PathBuf::from("medilink.db"),
            PathBuf::from("audit-logs"),
            Duration::ZERO,
            DEFAULT_MESSAGE_KEY,
        )
        .expect_err("zero timeout should be rejected");
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
