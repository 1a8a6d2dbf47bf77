//! Conversions from external infrastructure errors into domain errors.

use recordcache_domain::RecordCacheError;
use redis::RedisError;
use reqwest::Error as HttpError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub RecordCacheError);

impl From<InfraError> for RecordCacheError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<RecordCacheError> for InfraError {
    fn from(value: RecordCacheError) -> Self {
        InfraError(value)
    }
}

impl std::fmt::Display for InfraError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for InfraError {}

trait IntoRecordCacheError {
    fn into_domain(self) -> RecordCacheError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → RecordCacheError */
/* -------------------------------------------------------------------------- */

impl IntoRecordCacheError for HttpError {
    fn into_domain(self) -> RecordCacheError {
        if self.is_timeout() {
            return RecordCacheError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return RecordCacheError::Network("HTTP connection failure".into());
        }

        if self.is_decode() {
            return RecordCacheError::Store(format!("undecodable store response: {self}"));
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => RecordCacheError::Auth(message),
                404 => RecordCacheError::NotFound(message),
                429 => RecordCacheError::RateLimited(message),
                400..=499 => RecordCacheError::InvalidInput(message),
                _ => RecordCacheError::Store(message),
            };
        }

        RecordCacheError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_domain())
    }
}

/* -------------------------------------------------------------------------- */
/* redis::RedisError → RecordCacheError */
/* -------------------------------------------------------------------------- */

impl IntoRecordCacheError for RedisError {
    fn into_domain(self) -> RecordCacheError {
        let reason = if self.is_timeout() {
            "timed out"
        } else if self.is_connection_refusal() {
            "connection refused"
        } else if self.is_connection_dropped() || self.is_io_error() {
            "connection lost"
        } else {
            "command failed"
        };
        RecordCacheError::Backend(format!("redis {reason}: {self}"))
    }
}

impl From<RedisError> for InfraError {
    fn from(value: RedisError) -> Self {
        InfraError(value.into_domain())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
