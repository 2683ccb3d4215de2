//! Remote storage for the save document.
//!
//! [`RemoteDocumentStore`] is what the engine talks to. [`LabeledDocumentStore`]
//! implements it on top of any [`DocumentBackend`], which only has to speak
//! the four-call create/update/fetch/find wire contract. [`GistBackend`] is
//! the GitHub Gist implementation of that contract.

pub mod gist;
pub mod labeled;
pub mod store;

pub use gist::{GistBackend, GistConfig};
pub use labeled::LabeledDocumentStore;
pub use store::{DocumentBackend, RemoteDocumentStore, Revision, UpdateOutcome};
