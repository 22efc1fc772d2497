//! # kdb - pluggable key-value storage
//!
//! kdb puts one key-value contract (put / get / delete / batch / scan) in
//! front of interchangeable backends: an embedded LSM store, a remote
//! coordination store and a remote cache store, selected at runtime from a
//! connection string.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kdb::common::{Context, Limit};
//! use kdb::registry::Registry;
//!
//! let registry = Registry::new();
//! registry.register(kdb::store::memory::registration());
//!
//! let store = registry.open("memory://", &[])?;
//! let ctx = Context::background();
//!
//! store.put(&ctx, b"key1", b"value1")?;
//! store.flush_puts(&ctx)?;
//!
//! let mut iter = store.prefix(&ctx, b"key", Limit::new(10), &[]);
//! while iter.next() {
//!     println!("{}", iter.item());
//! }
//! store.close()?;
//! ```
//!
//! ## Module Organization
//!
//! - [`common`] - context, key-value pair, limits and options
//! - [`compression`] - identity and threshold (zstd) value codecs
//! - [`dsn`] - connection string parsing
//! - [`errors`] - error types and result definitions
//! - [`registry`] - backend registration and dispatch
//! - [`store`] - the store contract, streaming iterator, write batch and the
//!   in-memory reference store
//!
//! Backends live in their own crates (`kdb-fjall-adapter`,
//! `kdb-redis-adapter`, `kdb-etcd-adapter`), each exposing a
//! `registration()` for the registry.

pub mod common;
pub mod compression;
pub mod dsn;
pub mod errors;
pub mod registry;
pub mod store;
