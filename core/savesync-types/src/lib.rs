//! Core type definitions for savesync.
//!
//! This crate defines the types shared by the storage and sync layers:
//! - [`Timestamp`], a UTC instant with RFC 3339 parsing and an explicit
//!   failure mode for unparsable values
//! - [`PersistedState`], the application's save document
//!
//! The save document is mostly opaque. Only the fields the sync engine reasons
//! about (character progress, gems, currency, analytics history) are typed;
//! everything else is carried through untouched.

mod state;
mod timestamp;

pub use state::{Analytics, Character, CycleRecord, Gem, MapResult, PersistedState};
pub use timestamp::Timestamp;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
