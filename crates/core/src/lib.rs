//! # tabtally Core
//!
//! Domain types, traits, and error definitions for the tabtally session
//! reconciler. Every other crate in the workspace implements against the
//! model defined here.
//!
//! ## Design Philosophy
//!
//! Each collaborator of the reconciliation engine is a trait here:
//! - [`SessionStore`]: the session table (SQLite, in-memory)
//! - [`Classifier`]: title → [`Topic`]
//! - [`Provider`]: the chat-completion backend a classifier talks to
//!
//! Implementations live in their own crates, so the engine can be exercised
//! against scripted stand-ins in tests.

pub mod classifier;
pub mod error;
pub mod message;
pub mod provider;
pub mod session;
pub mod store;
pub mod topic;

// Re-export key types at crate root for ergonomics
pub use classifier::{Classifier, NoopClassifier};
pub use error::{ProviderError, StoreError};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
pub use session::{
    GroupKey, GroupTotal, IncomingBatch, IncomingSession, MergeOutcome, MergeRequest, NewSession,
    Phase, SessionRecord, StoreStats,
};
pub use store::SessionStore;
pub use topic::Topic;
