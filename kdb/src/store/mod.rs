//! The store contract and the machinery adapters build on.
//!
//! - [`StoreProvider`] / [`Store`]: the operations every backend implements
//!   and the shared handle callers hold.
//! - [`KvIterator`] / [`KvProducer`]: the bounded bridge between a backend
//!   scan on a worker thread and a pull-style consumer.
//! - [`StagedWrites`] / [`WriteBatch`]: the write batch and its flush
//!   discipline.
//! - [`memory`]: the in-process reference store.

mod iters;
mod kv_store;
pub mod memory;
mod write_batch;

pub use iters::*;
pub use kv_store::*;
pub use write_batch::*;
