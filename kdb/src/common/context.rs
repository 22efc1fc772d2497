use crate::errors::{ErrorKind, KdbError, KdbResult};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cancellation scope passed to every store operation.
///
/// A `Context` is cheap to clone and all clones observe the same
/// cancellation. It is done once [`Context::cancel`] has been called or its
/// deadline has passed. Point operations check it before touching the
/// backend; streaming producers check it between items and stop pushing once
/// it is done.
///
/// Internally the context owns the only sender of a zero-capacity channel.
/// Cancelling drops that sender, which disconnects the channel and wakes every
/// thread selecting on [`Context::done`].
///
/// # Examples
///
/// ```rust,ignore
/// use kdb::common::Context;
/// use std::time::Duration;
///
/// let ctx = Context::with_timeout(Duration::from_secs(5));
/// let mut iter = store.scan(&ctx, b"a", b"z", Limit::UNBOUNDED, &[]);
/// while iter.next() {
///     if done_early(iter.item()) {
///         ctx.cancel();
///     }
/// }
/// ```
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    cancelled: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context without deadline, done only when cancelled.
    pub fn background() -> Context {
        Context::build(None)
    }

    /// A context that becomes done at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Context {
        Context::build(Some(deadline))
    }

    /// A context that becomes done after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Context {
        Context::build(Some(Instant::now() + timeout))
    }

    fn build(deadline: Option<Instant>) -> Context {
        let (trigger, done) = channel::bounded(0);
        Context {
            inner: Arc::new(ContextInner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                done,
                deadline,
            }),
        }
    }

    /// Cancels the context. Calling it more than once has no further effect.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            log::debug!("context cancelled");
            self.inner.trigger.lock().take();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    pub fn is_expired(&self) -> bool {
        match self.inner.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.is_expired()
    }

    /// The reason the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<KdbError> {
        if self.is_cancelled() {
            Some(KdbError::new("operation cancelled", ErrorKind::Cancelled))
        } else if self.is_expired() {
            Some(KdbError::new(
                "operation deadline exceeded",
                ErrorKind::DeadlineExceeded,
            ))
        } else {
            None
        }
    }

    /// Fails with the cancellation reason once the context is done.
    pub fn check(&self) -> KdbResult<()> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Channel that disconnects when the context is cancelled.
    pub(crate) fn done(&self) -> Receiver<()> {
        self.inner.done.clone()
    }

    /// Channel that fires when the deadline passes, never for a context
    /// without deadline.
    pub(crate) fn expiry(&self) -> Receiver<Instant> {
        match self.inner.deadline {
            Some(deadline) => channel::at(deadline),
            None => channel::never(),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::background()
    }
}

impl Debug for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.is_cancelled())
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}
