//! Conversation context kept between questions.
//!
//! This is a best-effort in-memory cache: conversations expire after a period of
//! inactivity, the least recently used ones are dropped when the store is full, and
//! nothing survives a restart.

pub mod store;
pub mod types;

pub use store::{ConversationStore, ConversationStoreConfig, StoreError, StoreResult};
pub use types::{Conversation, Message, Role};
