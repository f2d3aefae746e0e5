//! Conversation persistence: an append-only turn store with gap-free
//! sequence numbers, plus the per-conversation personal-document memo.

pub mod memo;
pub mod store;

pub use memo::MemoStore;
pub use store::TurnStore;
