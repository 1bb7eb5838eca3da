//! Session persistence for the order pipeline.
//!
//! Provides the `SessionStore` trait plus in-memory and file-backed
//! implementations. Values are JSON documents stamped with their write
//! time; TTL-aware reads treat stale entries as misses.

pub mod error;
pub mod file;
pub mod memory;
pub mod session;

pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use session::{get_json, get_json_fresh, put_json, SessionStore, Stored, StoreKey};
