//! Topic classifier backed by a chat-completion [`Provider`].
//!
//! Asks the model for a single word from the closed vocabulary and validates
//! the reply. Every failure mode (transport, timeout, HTTP status, a reply
//! with extra words or wrong casing) is logged and collapses to
//! [`Topic::Unknown`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tabtally_core::message::Message;
use tabtally_core::provider::{Provider, ProviderRequest};
use tabtally_core::{Classifier, Topic};
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Sampling and timeout settings for classification calls.
#[derive(Debug, Clone)]
pub struct ClassifierOptions {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: 1.0,
            top_p: 1.0,
            max_tokens: 1000,
            timeout: Duration::from_secs(30),
        }
    }
}

impl From<&tabtally_config::ClassifierConfig> for ClassifierOptions {
    fn from(config: &tabtally_config::ClassifierConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Classifies page titles by prompting an LLM.
pub struct TopicClassifier {
    provider: Arc<dyn Provider>,
    options: ClassifierOptions,
}

impl TopicClassifier {
    pub fn new(provider: Arc<dyn Provider>, options: ClassifierOptions) -> Self {
        Self { provider, options }
    }

    /// The instruction sent for one title.
    pub fn prompt(title: &str) -> String {
        let labels = Topic::LABELS
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "You are provided with the title of a website. Analyze every word in the title \
             carefully for clues about the website's subject matter. Then, using only the tags \
             from the following list:\n\n\
             {{{labels}}}\n\n\
             determine the single, most appropriate tag for the website. If the title indicates \
             that the page is simply the main homepage of a website (i.e., it is generic and not \
             specific to any topic), then choose the tag \"Browsing\".\n\n\
             Your answer must consist of exactly one word from the list with no additional \
             commentary.\n\n\
             Title: {title}\n"
        )
    }

    fn request(&self, title: &str) -> ProviderRequest {
        ProviderRequest {
            model: self.options.model.clone(),
            messages: vec![Message::system(SYSTEM_PROMPT), Message::user(Self::prompt(title))],
            temperature: self.options.temperature,
            top_p: Some(self.options.top_p),
            max_tokens: Some(self.options.max_tokens),
        }
    }
}

#[async_trait]
impl Classifier for TopicClassifier {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn classify(&self, title: &str) -> Topic {
        let call = self.provider.complete(self.request(title));

        let reply = match tokio::time::timeout(self.options.timeout, call).await {
            Ok(Ok(response)) => response.message.content,
            Ok(Err(e)) => {
                warn!(provider = %self.provider.name(), title = %title, error = %e, "Classification failed, using Unknown");
                return Topic::Unknown;
            }
            Err(_) => {
                warn!(
                    provider = %self.provider.name(),
                    title = %title,
                    timeout_secs = self.options.timeout.as_secs(),
                    "Classification timed out, using Unknown"
                );
                return Topic::Unknown;
            }
        };

        let topic = Topic::from_reply(&reply);
        if topic.is_unknown() {
            warn!(title = %title, reply = %reply.trim(), "Classifier reply is not a known topic");
        } else {
            debug!(title = %title, topic = %topic, "Classified title");
        }
        topic
    }
}
