use etcd_client::Error;
use kdb::errors::{ErrorKind, KdbError};

/// Wraps an etcd client error, keeping it as the cause.
pub(crate) fn to_kdb_error(operation: &str, err: Error) -> KdbError {
    let kind = match &err {
        Error::IoError(_) | Error::TransportError(_) => ErrorKind::IOError,
        Error::InvalidArgs(_) | Error::InvalidUri(_) => ErrorKind::InvalidConnectionString,
        Error::Utf8Error(_) => ErrorKind::Encoding,
        _ => ErrorKind::Backend,
    };
    KdbError::new_with_cause(&format!("etcd {} failed: {}", operation, err), kind, err)
}
