use kdb::errors::{ErrorKind, KdbError};
use std::error::Error;

/// Maps a fjall error to a kdb error, tagging it with the operation that
/// failed.
///
/// - "closed" / "poisoned" → StoreClosed
/// - "corrupt" / "decode" → Encoding
/// - IO-ish messages → IOError
/// - other → Backend
pub(crate) fn to_kdb_error(operation: &str, error: impl Error) -> KdbError {
    let error_msg = error.to_string();
    let lowered = error_msg.to_lowercase();
    let error_kind = if lowered.contains("closed") || lowered.contains("poison") {
        ErrorKind::StoreClosed
    } else if lowered.contains("corrupt") || lowered.contains("decode") {
        ErrorKind::Encoding
    } else if lowered.contains("io error")
        || lowered.contains("permission")
        || lowered.contains("no space")
    {
        ErrorKind::IOError
    } else {
        ErrorKind::Backend
    };
    KdbError::new(&format!("fjall {} failed: {}", operation, error_msg), error_kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn maps_generic_error_to_backend() {
        let err = to_kdb_error("get", io::Error::other("something odd"));
        assert_eq!(err.kind(), &ErrorKind::Backend);
        assert_eq!(err.message(), "fjall get failed: something odd");
    }

    #[test]
    fn maps_poisoned_to_store_closed() {
        let err = to_kdb_error("commit batch", io::Error::other("keyspace is poisoned"));
        assert_eq!(err.kind(), &ErrorKind::StoreClosed);
    }

    #[test]
    fn maps_corruption_to_encoding() {
        let err = to_kdb_error("scan", io::Error::other("block is corrupted"));
        assert_eq!(err.kind(), &ErrorKind::Encoding);
    }

    #[test]
    fn maps_permission_to_io() {
        let err = to_kdb_error("open keyspace", io::Error::other("Permission denied"));
        assert_eq!(err.kind(), &ErrorKind::IOError);
    }
}
