use crate::common::{HexKey, Kv};
use crate::errors::{ErrorKind, KdbError, KdbResult};
use parking_lot::Mutex;
use std::fmt::{Display, Formatter};

/// Staged entry count that triggers an automatic flush.
pub const DEFAULT_MAX_BATCH_ENTRIES: usize = 500;
/// Staged byte budget of a write batch.
pub const DEFAULT_MAX_BATCH_BYTES: usize = 64 * 1024 * 1024;

/// Size limits of a store's write batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_entries: usize,
    pub max_bytes: usize,
}

impl BatchLimits {
    pub fn new(max_entries: usize, max_bytes: usize) -> BatchLimits {
        BatchLimits {
            max_entries: max_entries.max(1),
            max_bytes,
        }
    }
}

impl Default for BatchLimits {
    fn default() -> Self {
        BatchLimits {
            max_entries: DEFAULT_MAX_BATCH_ENTRIES,
            max_bytes: DEFAULT_MAX_BATCH_BYTES,
        }
    }
}

impl Display for BatchLimits {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "batch of {} entries / {} bytes", self.max_entries, self.max_bytes)
    }
}

/// Ordered list of staged puts, not yet visible to reads.
#[derive(Debug, Default)]
pub struct WriteBatch {
    entries: Vec<Kv>,
    size: usize,
}

impl WriteBatch {
    pub fn new() -> WriteBatch {
        WriteBatch::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Staged bytes, keys and values combined.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn entries(&self) -> &[Kv] {
        &self.entries
    }

    /// True if `kv` can be staged without exceeding the byte budget.
    pub fn fits(&self, kv: &Kv, limits: &BatchLimits) -> bool {
        self.size + kv.size() <= limits.max_bytes
    }

    pub fn push(&mut self, kv: Kv) {
        self.size += kv.size();
        self.entries.push(kv);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.size = 0;
    }

    /// Writes staged entries one by one, oldest first.
    ///
    /// Entries written before a failure are removed; the failing entry and
    /// everything after it stay staged for the next flush.
    pub fn commit_each<F>(&mut self, mut write: F) -> KdbResult<usize>
    where
        F: FnMut(&Kv) -> KdbResult<()>,
    {
        let mut written = 0;
        let mut result = Ok(());
        for kv in &self.entries {
            if let Err(err) = write(kv) {
                result = Err(err);
                break;
            }
            written += 1;
        }
        let removed: usize = self.entries.drain(..written).map(|kv| kv.size()).sum();
        self.size -= removed;
        result.map(|_| written)
    }

    /// Writes all staged entries in one backend call; on success the batch
    /// is emptied, on failure it is left untouched.
    pub fn commit_all<F>(&mut self, write: F) -> KdbResult<usize>
    where
        F: FnOnce(&[Kv]) -> KdbResult<()>,
    {
        write(&self.entries)?;
        let written = self.entries.len();
        self.clear();
        Ok(written)
    }
}

/// Backend side of a flush.
pub trait BatchWriter {
    /// Persists the staged entries. Entries that were written must be removed
    /// from `batch`, entries that were not must stay.
    fn write_batch(&self, batch: &mut WriteBatch) -> KdbResult<()>;
}

/// A store's write batch guarded by its lock, with the flush discipline
/// shared by every adapter.
///
/// - staging auto-flushes once `max_entries` entries are staged;
/// - an entry that would exceed the byte budget flushes the batch and is
///   staged again, a second overflow is returned as [`ErrorKind::BatchOverflow`];
/// - a failed flush keeps whatever was not written.
///
/// [`close`](StagedWrites::close) flushes and seals the batch under the same
/// lock, so every `stage` either lands before the final flush or fails with
/// [`ErrorKind::StoreClosed`].
pub struct StagedWrites {
    state: Mutex<StagedState>,
    limits: BatchLimits,
}

#[derive(Default)]
struct StagedState {
    batch: WriteBatch,
    closed: bool,
}

impl StagedWrites {
    pub fn new(limits: BatchLimits) -> StagedWrites {
        StagedWrites {
            state: Mutex::new(StagedState::default()),
            limits,
        }
    }

    pub fn limits(&self) -> &BatchLimits {
        &self.limits
    }

    pub fn len(&self) -> usize {
        self.state.lock().batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().batch.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn stage<W>(&self, kv: Kv, writer: &W) -> KdbResult<()>
    where
        W: BatchWriter + ?Sized,
    {
        let mut state = self.state.lock();
        if state.closed {
            return Err(KdbError::new(
                &format!("cannot stage key {}: store is closed", HexKey(&kv.key)),
                ErrorKind::StoreClosed,
            ));
        }

        let batch = &mut state.batch;
        if !batch.fits(&kv, &self.limits) {
            log::debug!(
                "write batch of {} bytes cannot take {}, flushing before retry",
                batch.size(),
                kv
            );
            flush_locked(batch, writer)?;
            if !batch.fits(&kv, &self.limits) {
                log::error!(
                    "Entry {} exceeds the write batch budget of {} bytes",
                    HexKey(&kv.key),
                    self.limits.max_bytes
                );
                return Err(KdbError::new(
                    &format!(
                        "entry of {} bytes exceeds the write batch budget of {} bytes",
                        kv.size(),
                        self.limits.max_bytes
                    ),
                    ErrorKind::BatchOverflow,
                ));
            }
        }

        batch.push(kv);
        if batch.len() >= self.limits.max_entries {
            log::debug!("write batch reached {} entries, flushing", batch.len());
            flush_locked(batch, writer)?;
        }
        Ok(())
    }

    pub fn flush<W>(&self, writer: &W) -> KdbResult<()>
    where
        W: BatchWriter + ?Sized,
    {
        let mut state = self.state.lock();
        flush_locked(&mut state.batch, writer)
    }

    /// Flushes the batch one last time and rejects every later `stage`.
    ///
    /// The batch is sealed even when the flush fails; the flush error is
    /// returned. Closing an already closed batch does nothing.
    pub fn close<W>(&self, writer: &W) -> KdbResult<()>
    where
        W: BatchWriter + ?Sized,
    {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        let flushed = flush_locked(&mut state.batch, writer);
        if !state.batch.is_empty() {
            log::error!(
                "Write batch closed with {} unwritten entries",
                state.batch.len()
            );
        }
        flushed
    }
}

fn flush_locked<W>(batch: &mut WriteBatch, writer: &W) -> KdbResult<()>
where
    W: BatchWriter + ?Sized,
{
    if batch.is_empty() {
        return Ok(());
    }
    let staged = batch.len();
    writer.write_batch(batch)?;
    log::debug!("flushed {} staged entries", staged - batch.len());
    Ok(())
}
