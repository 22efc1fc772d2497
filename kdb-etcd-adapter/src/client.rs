use kdb::errors::KdbResult;

/// One page of a range read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    /// First key, inclusive. Empty means the start of the keyspace.
    pub start: String,
    /// Exclusive end, `None` reads to the end of the keyspace.
    pub end: Option<String>,
    /// Maximum keys returned, always positive.
    pub limit: i64,
    pub keys_only: bool,
}

/// The raw coordination-store primitives the etcd store is built on.
///
/// Keys are the encoded (hex) strings and values the stored payloads. Range
/// reads return keys in ascending order.
pub trait CoordinationClient: Send + Sync {
    fn get(&self, key: &str) -> KdbResult<Option<Vec<u8>>>;

    fn put(&self, key: &str, value: &[u8]) -> KdbResult<()>;

    fn delete(&self, keys: &[String]) -> KdbResult<()>;

    /// Keys (and values unless `keys_only`) in `[start, end)`, at most
    /// `limit` of them.
    fn range(&self, request: &RangeRequest) -> KdbResult<Vec<(String, Vec<u8>)>>;

    fn close(&self) -> KdbResult<()>;
}

/// Exclusive end of the range holding every key starting with `prefix`.
///
/// Encoded keys are ASCII so bumping the last byte never overflows. An empty
/// prefix spans the whole keyspace.
pub fn prefix_end(prefix: &str) -> Option<String> {
    let mut end = prefix.as_bytes().to_vec();
    let last = end.pop()?;
    end.push(last + 1);
    String::from_utf8(end).ok()
}

/// The key right after `key`, where the next page starts.
pub(crate) fn successor(key: &str) -> String {
    format!("{}\0", key)
}
