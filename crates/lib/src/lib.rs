//! sharedstate-lib: a shared value for cooperating processes.
//!
//! Independent processes on one filesystem exchange a single serialized value
//! through a file, serializing their writes with an advisory lock file:
//! - `lock`: the cross-process lock primitive (`LockFile`, `LockGuard`)
//! - `store`: `SharedStore`, load/save/update of one JSON value
//! - `config`: `StoreOptions` and environment overrides
//! - `error`: `LockError` and `StoreError`

pub mod config;
pub mod consts;
pub mod error;
pub mod lock;
pub mod store;

pub use config::{ReadMode, StoreOptions};
pub use error::{LockError, StoreError};
pub use lock::{LockFile, LockGuard, LockMetadata, LockStrategy};
pub use store::{SharedMap, SharedStore};
