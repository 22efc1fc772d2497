//! Common types shared by the registry, the store contract and the adapters.

mod context;
mod options;
mod task;
mod types;

pub use context::*;
pub use options::*;
pub use task::*;
pub use types::*;
