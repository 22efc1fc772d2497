use backtrace::Backtrace;
use parking_lot::Mutex;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;
use std::sync::Arc;

/// Error kinds for kdb operations.
///
/// Every fallible operation of the registry, the codecs and the backend
/// adapters reports one of these kinds, so callers can branch on the category
/// without depending on a particular backend's error type.
///
/// # Examples
///
/// ```rust,ignore
/// use kdb::errors::{ErrorKind, KdbError, KdbResult};
///
/// fn lookup() -> KdbResult<Vec<u8>> {
///     Err(KdbError::new("key 6b31 not found", ErrorKind::NotFound))
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Lookup
    /// The requested key does not exist
    NotFound,

    // Construction
    /// The connection string could not be parsed
    InvalidConnectionString,
    /// No backend is registered under the connection string's scheme
    BackendNotRegistered,
    /// A configuration value (compression mode, threshold, limits) is invalid
    InvalidConfiguration,

    // Operation
    /// The arguments of an operation are not acceptable for this store
    InvalidArgument,
    /// An entry does not fit in the write batch even after a flush
    BatchOverflow,
    /// The caller cancelled the operation
    Cancelled,
    /// The caller's deadline passed before the operation finished
    DeadlineExceeded,
    /// The store has already been closed
    StoreClosed,

    // Backend and data
    /// Error reported by the storage backend
    Backend,
    /// Error encoding or decoding keys or values
    Encoding,
    /// Generic IO error
    IOError,
    /// Internal error (usually indicates a bug)
    Internal,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "Not found"),
            ErrorKind::InvalidConnectionString => write!(f, "Invalid connection string"),
            ErrorKind::BackendNotRegistered => write!(f, "Backend not registered"),
            ErrorKind::InvalidConfiguration => write!(f, "Invalid configuration"),
            ErrorKind::InvalidArgument => write!(f, "Invalid argument"),
            ErrorKind::BatchOverflow => write!(f, "Batch overflow"),
            ErrorKind::Cancelled => write!(f, "Cancelled"),
            ErrorKind::DeadlineExceeded => write!(f, "Deadline exceeded"),
            ErrorKind::StoreClosed => write!(f, "Store closed"),
            ErrorKind::Backend => write!(f, "Backend error"),
            ErrorKind::Encoding => write!(f, "Encoding error"),
            ErrorKind::IOError => write!(f, "IO error"),
            ErrorKind::Internal => write!(f, "Internal error"),
        }
    }
}

impl ErrorKind {
    /// Kinds raised on hot, expected paths do not capture a backtrace.
    fn wants_backtrace(&self) -> bool {
        !matches!(
            self,
            ErrorKind::NotFound | ErrorKind::Cancelled | ErrorKind::DeadlineExceeded
        )
    }
}

/// Custom kdb error type.
///
/// `KdbError` carries a message, a kind and an optional underlying cause. The
/// cause can be any error type (a backend client error, an IO error, another
/// `KdbError`) and stays reachable through [`Error::source`], so callers can
/// downcast it when they need backend specifics.
///
/// # Examples
///
/// ```rust,ignore
/// use kdb::errors::{ErrorKind, KdbError};
///
/// let io = std::io::Error::other("connection reset");
/// let err = KdbError::new_with_cause("failed to flush staged writes", ErrorKind::Backend, io);
/// assert!(std::error::Error::source(&err).is_some());
/// ```
#[derive(Clone)]
pub struct KdbError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Arc<dyn Error + Send + Sync + 'static>>,
    backtrace: Option<Arc<Mutex<Backtrace>>>,
}

impl KdbError {
    /// Creates a new `KdbError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        let backtrace = capture(&error_kind);
        KdbError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace,
        }
    }

    /// Creates a new `KdbError` wrapping the error that caused it.
    pub fn new_with_cause<E>(message: &str, error_kind: ErrorKind, cause: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        let backtrace = capture(&error_kind);
        KdbError {
            message: message.to_string(),
            error_kind,
            cause: Some(Arc::new(cause)),
            backtrace,
        }
    }

    /// Shorthand for the not-found sentinel of a key.
    pub fn not_found(key: &[u8]) -> Self {
        KdbError::new(
            &format!("key {} not found", hex::encode(key)),
            ErrorKind::NotFound,
        )
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    pub fn is_not_found(&self) -> bool {
        self.error_kind == ErrorKind::NotFound
    }
}

fn capture(kind: &ErrorKind) -> Option<Arc<Mutex<Backtrace>>> {
    if kind.wants_backtrace() {
        Some(Arc::new(Mutex::new(Backtrace::new_unresolved())))
    } else {
        None
    }
}

impl Display for KdbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for KdbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // message with stack trace, followed by the cause chain
        match (&self.cause, &self.backtrace) {
            (Some(cause), _) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            (None, Some(backtrace)) => {
                let mut backtrace = backtrace.lock();
                backtrace.resolve();
                write!(f, "{}\n{:?}", self.message, backtrace)
            }
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

impl Error for KdbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for kdb operations.
pub type KdbResult<T> = Result<T, KdbError>;

impl From<std::io::Error> for KdbError {
    fn from(err: std::io::Error) -> Self {
        let message = format!("IO error: {}", err);
        KdbError::new_with_cause(&message, ErrorKind::IOError, err)
    }
}

impl From<hex::FromHexError> for KdbError {
    fn from(err: hex::FromHexError) -> Self {
        let message = format!("invalid hex key encoding: {}", err);
        KdbError::new_with_cause(&message, ErrorKind::Encoding, err)
    }
}

impl From<std::num::ParseIntError> for KdbError {
    fn from(err: std::num::ParseIntError) -> Self {
        let message = format!("Integer parsing error: {}", err);
        KdbError::new_with_cause(&message, ErrorKind::InvalidConfiguration, err)
    }
}

impl From<String> for KdbError {
    fn from(msg: String) -> Self {
        KdbError::new(&msg, ErrorKind::Internal)
    }
}

impl From<&str> for KdbError {
    fn from(msg: &str) -> Self {
        KdbError::new(msg, ErrorKind::Internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_io_error() -> std::io::Error {
        std::io::Error::other("IO Error")
    }

    #[test]
    fn kdb_error_new_creates_error() {
        let error = KdbError::new("An error occurred", ErrorKind::Backend);
        assert_eq!(error.message, "An error occurred");
        assert_eq!(error.error_kind, ErrorKind::Backend);
        assert!(error.cause.is_none());
    }

    #[test]
    fn kdb_error_new_with_cause_keeps_cause() {
        let error =
            KdbError::new_with_cause("flush failed", ErrorKind::Backend, create_io_error());
        assert_eq!(error.message(), "flush failed");
        assert_eq!(error.kind(), &ErrorKind::Backend);
        assert_eq!(error.cause().map(|c| c.to_string()), Some("IO Error".into()));
    }

    #[test]
    fn kdb_error_cause_can_be_downcast() {
        let error =
            KdbError::new_with_cause("flush failed", ErrorKind::Backend, create_io_error());
        let source = error.source().expect("source");
        assert!(source.downcast_ref::<std::io::Error>().is_some());
    }

    #[test]
    fn kdb_error_source_returns_none_when_no_cause() {
        let error = KdbError::new("An error occurred", ErrorKind::Backend);
        assert!(error.source().is_none());
    }

    #[test]
    fn kdb_error_display_formats_message_only() {
        let error = KdbError::new_with_cause("outer", ErrorKind::Backend, create_io_error());
        assert_eq!(format!("{}", error), "outer");
    }

    #[test]
    fn kdb_error_debug_formats_with_cause() {
        let error = KdbError::new_with_cause("outer", ErrorKind::Backend, create_io_error());
        let formatted = format!("{:?}", error);
        assert!(formatted.contains("outer"));
        assert!(formatted.contains("Caused by:"));
    }

    #[test]
    fn kdb_error_debug_formats_without_backtrace() {
        let error = KdbError::not_found(b"k1");
        assert_eq!(format!("{:?}", error), "key 6b31 not found");
    }

    #[test]
    fn not_found_skips_backtrace() {
        let error = KdbError::not_found(b"key");
        assert!(error.is_not_found());
        assert!(error.backtrace.is_none());
    }

    #[test]
    fn other_kinds_capture_backtrace() {
        let error = KdbError::new("boom", ErrorKind::Internal);
        assert!(error.backtrace.is_some());
    }

    #[test]
    fn nested_kdb_error_is_a_cause() {
        let inner = KdbError::new("inner", ErrorKind::Encoding);
        let outer = KdbError::new_with_cause("outer", ErrorKind::Backend, inner);
        let source = outer.source().expect("source");
        let inner = source.downcast_ref::<KdbError>().expect("kdb error");
        assert_eq!(inner.kind(), &ErrorKind::Encoding);
    }

    #[test]
    fn from_io_error_maps_to_io_kind() {
        let error: KdbError = create_io_error().into();
        assert_eq!(error.kind(), &ErrorKind::IOError);
        assert!(error.message().contains("IO Error"));
    }

    #[test]
    fn from_hex_error_maps_to_encoding() {
        let error: KdbError = hex::decode("zz").unwrap_err().into();
        assert_eq!(error.kind(), &ErrorKind::Encoding);
    }

    #[test]
    fn from_parse_int_error_maps_to_configuration() {
        let error: KdbError = "abc".parse::<i64>().unwrap_err().into();
        assert_eq!(error.kind(), &ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn from_str_maps_to_internal() {
        let error: KdbError = "oops".into();
        assert_eq!(error.kind(), &ErrorKind::Internal);
        let error: KdbError = String::from("oops").into();
        assert_eq!(error.message(), "oops");
    }

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::NotFound.to_string(), "Not found");
        assert_eq!(ErrorKind::BatchOverflow.to_string(), "Batch overflow");
        assert_eq!(ErrorKind::StoreClosed.to_string(), "Store closed");
    }
}
