//! Shared vocabulary for the Regulus workspace: configuration, the error
//! taxonomy, provider stream events, conversation turns, and the
//! document/chunk model used by the cache and the vector index.

pub mod config;
pub mod document;
pub mod error;
pub mod stream;
pub mod turn;

pub use error::{Error, Result};
