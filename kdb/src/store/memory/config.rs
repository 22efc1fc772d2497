use crate::dsn::ConnectionString;
use crate::errors::KdbResult;
use crate::store::{BatchLimits, DEFAULT_ITERATOR_BUFFER};

/// Configuration of an in-memory store.
///
/// Parsed from `memory://[?batch_size=N&batch_bytes=N&buffer=N]` or built
/// through [`MemoryModule`](super::MemoryModule).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    batch_limits: BatchLimits,
    buffer: usize,
}

impl MemoryConfig {
    pub fn new() -> MemoryConfig {
        MemoryConfig {
            batch_limits: BatchLimits::default(),
            buffer: DEFAULT_ITERATOR_BUFFER,
        }
    }

    pub fn from_dsn(dsn: &str) -> KdbResult<MemoryConfig> {
        let dsn = ConnectionString::parse(dsn)?;
        Ok(MemoryConfig {
            batch_limits: dsn.batch_limits()?,
            buffer: dsn.buffer()?,
        })
    }

    pub fn batch_limits(&self) -> BatchLimits {
        self.batch_limits
    }

    pub fn buffer(&self) -> usize {
        self.buffer
    }

    pub(crate) fn set_batch_limits(&mut self, batch_limits: BatchLimits) {
        self.batch_limits = batch_limits;
    }

    pub(crate) fn set_buffer(&mut self, buffer: usize) {
        self.buffer = buffer;
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn defaults() {
        let config = MemoryConfig::new();
        assert_eq!(config.batch_limits(), BatchLimits::default());
        assert_eq!(config.buffer(), DEFAULT_ITERATOR_BUFFER);
    }

    #[test]
    fn from_dsn_reads_limits() {
        let config = MemoryConfig::from_dsn("memory://?batch_size=2&buffer=4").unwrap();
        assert_eq!(config.batch_limits().max_entries, 2);
        assert_eq!(config.buffer(), 4);
    }

    #[test]
    fn from_dsn_rejects_bad_limits() {
        let err = MemoryConfig::from_dsn("memory://?batch_size=many").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidConnectionString);
    }
}
