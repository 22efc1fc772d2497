use crate::common::{async_task, Context, Kv};
use crate::errors::{ErrorKind, KdbError, KdbResult};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Default number of items buffered between a producer and its consumer.
pub const DEFAULT_ITERATOR_BUFFER: usize = 64;

/// Lifecycle of a [`KvIterator`] as seen by its consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorState {
    /// Nothing pulled yet.
    Pending,
    /// At least one item delivered, more may follow.
    Active,
    /// The producer finished and every item was delivered.
    Exhausted,
    /// The producer reported an error, see [`KvIterator::err`].
    Failed,
    /// The caller's context was cancelled or expired.
    Cancelled,
}

impl IteratorState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IteratorState::Exhausted | IteratorState::Failed | IteratorState::Cancelled
        )
    }
}

// Terminal slot shared by both halves. The error is read by the consumer
// before every pull so it takes precedence over buffered items.
#[derive(Default)]
struct Terminal {
    error: Mutex<Option<KdbError>>,
    finished: AtomicBool,
}

/// Creates a connected producer/consumer pair with a buffer of `capacity`.
pub fn kv_channel(ctx: &Context, capacity: usize) -> (KvProducer, KvIterator) {
    let (sender, receiver) = channel::bounded(capacity.max(1));
    let terminal = Arc::new(Terminal::default());
    let producer = KvProducer {
        ctx: ctx.clone(),
        sender,
        terminal: terminal.clone(),
    };
    let iterator = KvIterator {
        ctx: ctx.clone(),
        receiver: Some(receiver),
        terminal,
        state: IteratorState::Pending,
        current: None,
        error: None,
    };
    (producer, iterator)
}

/// Runs `produce` on a dedicated thread and returns the consuming side.
///
/// The closure's result becomes the single terminal signal of the stream:
/// `Ok` finishes it, `Err` fails it.
pub fn spawn_producer<F>(ctx: &Context, capacity: usize, name: &str, produce: F) -> KvIterator
where
    F: FnOnce(&KvProducer) -> KdbResult<()> + Send + 'static,
{
    let (producer, iterator) = kv_channel(ctx, capacity);
    // if the thread cannot be spawned the producer is dropped unsignalled and
    // the consumer fails on its first pull
    let _ = async_task(name, move || match produce(&producer) {
        Ok(()) => producer.push_finished(),
        Err(err) => {
            log::debug!("producer {} failed: {}", name_of_current(), err);
            producer.push_error(err)
        }
    });
    iterator
}

fn name_of_current() -> String {
    std::thread::current()
        .name()
        .unwrap_or("unnamed")
        .to_string()
}

/// Writing half of a streaming read, owned by the backend producer.
pub struct KvProducer {
    ctx: Context,
    sender: Sender<Kv>,
    terminal: Arc<Terminal>,
}

impl KvProducer {
    /// Hands one item to the consumer, blocking while the buffer is full.
    ///
    /// Returns `false` once the consumer is gone or the context is done; the
    /// producer should stop producing at that point.
    pub fn push_item(&self, kv: Kv) -> bool {
        if self.ctx.is_done() {
            return false;
        }
        let done = self.ctx.done();
        let expiry = self.ctx.expiry();
        crossbeam::select! {
            send(self.sender, kv) -> res => res.is_ok(),
            recv(done) -> _ => false,
            recv(expiry) -> _ => false,
        }
    }

    /// Fails the stream. Items already buffered are discarded.
    pub fn push_error(self, err: KdbError) {
        *self.terminal.error.lock() = Some(err);
    }

    /// Marks the stream as successfully finished.
    pub fn push_finished(self) {
        self.terminal.finished.store(true, Ordering::SeqCst);
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }
}

enum Pulled {
    Item(Kv),
    Closed,
    Cancelled,
}

/// Consuming half of a streaming read.
///
/// Pull items with [`KvIterator::next`] and read each with
/// [`KvIterator::item`]. Once `next` returns `false` the iterator is terminal;
/// inspect [`KvIterator::err`] or [`KvIterator::state`] to tell exhaustion
/// from failure and cancellation. Dropping the iterator early releases the
/// producer.
///
/// ```rust,ignore
/// let mut iter = store.prefix(&ctx, b"key", Limit::new(3), &[]);
/// while iter.next() {
///     println!("{}", iter.item());
/// }
/// if let Some(err) = iter.err() {
///     return Err(err.clone());
/// }
/// ```
pub struct KvIterator {
    ctx: Context,
    receiver: Option<Receiver<Kv>>,
    terminal: Arc<Terminal>,
    state: IteratorState,
    current: Option<Kv>,
    error: Option<KdbError>,
}

static EMPTY_KV: Kv = Kv {
    key: Vec::new(),
    value: Vec::new(),
};

impl KvIterator {
    /// An iterator that is already failed with `err`.
    pub fn failed(ctx: &Context, err: KdbError) -> KvIterator {
        let (producer, iterator) = kv_channel(ctx, 1);
        producer.push_error(err);
        iterator
    }

    /// Advances to the next item. Returns `false` once the stream ended.
    pub fn next(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.current = None;

        if self.ctx.is_done() {
            self.cancel();
            return false;
        }
        if let Some(err) = self.take_error() {
            self.fail(err);
            return false;
        }

        let pulled = match &self.receiver {
            Some(receiver) => {
                let done = self.ctx.done();
                let expiry = self.ctx.expiry();
                crossbeam::select! {
                    recv(receiver) -> msg => match msg {
                        Ok(kv) => Pulled::Item(kv),
                        Err(_) => Pulled::Closed,
                    },
                    recv(done) -> _ => Pulled::Cancelled,
                    recv(expiry) -> _ => Pulled::Cancelled,
                }
            }
            None => Pulled::Closed,
        };

        match pulled {
            Pulled::Item(kv) => {
                // an item raced with cancellation is not delivered
                if self.ctx.is_done() {
                    self.cancel();
                    return false;
                }
                self.current = Some(kv);
                self.state = IteratorState::Active;
                true
            }
            Pulled::Cancelled => {
                self.cancel();
                false
            }
            Pulled::Closed => {
                if self.ctx.is_done() {
                    self.cancel();
                } else if let Some(err) = self.take_error() {
                    self.fail(err);
                } else if self.terminal.finished.load(Ordering::SeqCst) {
                    self.state = IteratorState::Exhausted;
                    self.receiver = None;
                } else {
                    self.fail(KdbError::new(
                        "producer stopped without signalling completion",
                        ErrorKind::Internal,
                    ));
                }
                false
            }
        }
    }

    /// The item of the last successful [`KvIterator::next`].
    pub fn item(&self) -> &Kv {
        self.current.as_ref().unwrap_or(&EMPTY_KV)
    }

    /// Moves the current item out of the iterator.
    pub fn take_item(&mut self) -> Kv {
        self.current.take().unwrap_or_default()
    }

    /// The producer's error, set only when the iterator failed.
    pub fn err(&self) -> Option<&KdbError> {
        self.error.as_ref()
    }

    pub fn state(&self) -> IteratorState {
        self.state
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == IteratorState::Cancelled
    }

    /// Pulls every remaining item.
    ///
    /// Fails with the producer's error, or with the context's error when the
    /// stream was cancelled.
    pub fn drain(mut self) -> KdbResult<Vec<Kv>> {
        let mut items = Vec::new();
        while self.next() {
            items.push(self.take_item());
        }
        match self.state {
            IteratorState::Failed => Err(self
                .error
                .take()
                .unwrap_or_else(|| KdbError::new("iterator failed", ErrorKind::Internal))),
            IteratorState::Cancelled => Err(self
                .ctx
                .err()
                .unwrap_or_else(|| KdbError::new("operation cancelled", ErrorKind::Cancelled))),
            _ => Ok(items),
        }
    }

    fn take_error(&self) -> Option<KdbError> {
        self.terminal.error.lock().take()
    }

    fn fail(&mut self, err: KdbError) {
        self.state = IteratorState::Failed;
        self.error = Some(err);
        self.receiver = None;
    }

    fn cancel(&mut self) {
        self.state = IteratorState::Cancelled;
        self.receiver = None;
    }
}
