use crate::errors::{ErrorKind, KdbError, KdbResult};

/// Runs `op` on its own named thread.
///
/// Streaming reads use one such thread per call as the producer side of a
/// [`KvIterator`](crate::store::KvIterator).
#[inline]
pub fn async_task<OP>(name: &str, op: OP) -> KdbResult<()>
where
    OP: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(op)
        .map(|_| ())
        .map_err(|err| {
            log::error!("Failed to spawn worker thread {}: {}", name, err);
            KdbError::new_with_cause("failed to spawn worker thread", ErrorKind::Internal, err)
        })
}
