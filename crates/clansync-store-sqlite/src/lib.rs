//! SQLite storage backend for the clan sync system.
//!
//! Wraps [`tokio_rusqlite`] so every query runs on the connection's own
//! thread without blocking the async runtime. One [`SqliteStore`] implements
//! all four storage traits of `clansync-core`; share it with
//! [`Storage::from_backend`](clansync_core::Storage::from_backend).

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
