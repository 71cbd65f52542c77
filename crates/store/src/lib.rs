//! `bottega-store` — local persistence for the management console.
//!
//! **Responsibility:** a durable key-value store of JSON blobs, standing in
//! for the browser storage the console originally relied on.
//!
//! This crate provides:
//! - [`KvStore`]: SQLite-backed get/set of JSON values under well-known keys
//! - a versioned envelope (`{version, payload}`) with migration on read
//! - full-snapshot backups with restore
//!
//! A corrupt stored value never escapes as an error from the read path: it
//! falls back to the documented default and is logged.

pub mod backup;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod kv;

pub use backup::BackupInfo;
pub use error::StoreError;
pub use kv::KvStore;
