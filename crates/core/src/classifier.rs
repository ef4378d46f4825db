//! Classifier trait: title in, [`Topic`] out.
//!
//! Classification never fails from the caller's point of view. Transport
//! failures and replies outside the vocabulary come back as
//! [`Topic::Unknown`].

use async_trait::async_trait;
use std::sync::Arc;

use crate::topic::Topic;

#[async_trait]
pub trait Classifier: Send + Sync {
    /// A human-readable name for log lines.
    fn name(&self) -> &str;

    /// Pick a topic for a page title.
    async fn classify(&self, title: &str) -> Topic;
}

#[async_trait]
impl<C: Classifier + ?Sized> Classifier for Arc<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn classify(&self, title: &str) -> Topic {
        (**self).classify(title).await
    }
}

/// Labels everything [`Topic::Unknown`]. Used when no classifier endpoint is
/// configured, so sessions still get merged.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopClassifier;

#[async_trait]
impl Classifier for NoopClassifier {
    fn name(&self) -> &str {
        "none"
    }

    async fn classify(&self, _title: &str) -> Topic {
        Topic::Unknown
    }
}
