use kdb::errors::{ErrorKind, KdbError};
use redis::RedisError;

/// Wraps a redis error, keeping it as the cause.
pub(crate) fn to_kdb_error(operation: &str, err: RedisError) -> KdbError {
    let kind = if err.is_io_error() || err.is_connection_refusal() || err.is_timeout() {
        ErrorKind::IOError
    } else if err.kind() == redis::ErrorKind::TypeError {
        ErrorKind::Encoding
    } else if err.kind() == redis::ErrorKind::InvalidClientConfig {
        ErrorKind::InvalidConnectionString
    } else {
        ErrorKind::Backend
    };
    KdbError::new_with_cause(&format!("redis {} failed: {}", operation, err), kind, err)
}
