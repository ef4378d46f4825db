//! The closed topic vocabulary.
//!
//! A session's topic is either absent (not yet classified), one of the fixed
//! labels below, or [`Topic::Unknown`]. Nothing else can be represented, so a
//! malformed classifier reply can never reach the store verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Text stored for [`Topic::Unknown`].
pub const UNKNOWN_LABEL: &str = "[Unknown Topic]";

/// A topic label from the closed vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    Finance,
    Job,
    Tech,
    Programming,
    Browsing,
    Cooking,
    Sports,
    Health,
    Education,
    Entertainment,
    Travel,
    Science,
    Politics,
    Art,
    History,
    Lifestyle,
    Music,
    Nature,
    Business,
    Fashion,
    Gaming,
    Literature,
    /// Sentinel for a failed or unrecognised classification.
    #[serde(rename = "[Unknown Topic]")]
    Unknown,
}

impl Topic {
    /// Every real label, in prompt order. Excludes [`Topic::Unknown`].
    pub const LABELS: [Topic; 22] = [
        Topic::Finance,
        Topic::Job,
        Topic::Tech,
        Topic::Programming,
        Topic::Browsing,
        Topic::Cooking,
        Topic::Sports,
        Topic::Health,
        Topic::Education,
        Topic::Entertainment,
        Topic::Travel,
        Topic::Science,
        Topic::Politics,
        Topic::Art,
        Topic::History,
        Topic::Lifestyle,
        Topic::Music,
        Topic::Nature,
        Topic::Business,
        Topic::Fashion,
        Topic::Gaming,
        Topic::Literature,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Finance => "Finance",
            Topic::Job => "Job",
            Topic::Tech => "Tech",
            Topic::Programming => "Programming",
            Topic::Browsing => "Browsing",
            Topic::Cooking => "Cooking",
            Topic::Sports => "Sports",
            Topic::Health => "Health",
            Topic::Education => "Education",
            Topic::Entertainment => "Entertainment",
            Topic::Travel => "Travel",
            Topic::Science => "Science",
            Topic::Politics => "Politics",
            Topic::Art => "Art",
            Topic::History => "History",
            Topic::Lifestyle => "Lifestyle",
            Topic::Music => "Music",
            Topic::Nature => "Nature",
            Topic::Business => "Business",
            Topic::Fashion => "Fashion",
            Topic::Gaming => "Gaming",
            Topic::Literature => "Literature",
            Topic::Unknown => UNKNOWN_LABEL,
        }
    }

    /// Exact, case-sensitive match against the vocabulary.
    ///
    /// Returns `None` for anything that is not precisely one label, including
    /// the empty string, different casing, or extra words.
    pub fn from_label(label: &str) -> Option<Topic> {
        if label == UNKNOWN_LABEL {
            return Some(Topic::Unknown);
        }
        Self::LABELS.iter().copied().find(|t| t.as_str() == label)
    }

    /// Classifier-side parse: anything unrecognised collapses to `Unknown`.
    pub fn from_reply(reply: &str) -> Topic {
        Self::from_label(reply.trim()).unwrap_or(Topic::Unknown)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Topic::Unknown)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a topic label")]
pub struct UnknownLabel(pub String);

impl FromStr for Topic {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::from_label(s).ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_label_round_trips_through_text() {
        for topic in Topic::LABELS {
            assert_eq!(Topic::from_label(topic.as_str()), Some(topic));
        }
        assert_eq!(Topic::from_label(UNKNOWN_LABEL), Some(Topic::Unknown));
    }

    #[test]
    fn matching_is_case_sensitive_and_exact() {
        assert_eq!(Topic::from_label("tech"), None);
        assert_eq!(Topic::from_label("TECH"), None);
        assert_eq!(Topic::from_label("Tech."), None);
        assert_eq!(Topic::from_label("Tech Programming"), None);
        assert_eq!(Topic::from_label(""), None);
    }

    #[test]
    fn replies_are_trimmed_then_collapsed() {
        assert_eq!(Topic::from_reply("  Music\n"), Topic::Music);
        assert_eq!(Topic::from_reply("The answer is Music"), Topic::Unknown);
        assert_eq!(Topic::from_reply(""), Topic::Unknown);
    }

    #[test]
    fn unknown_serializes_as_stored_text() {
        let json = serde_json::to_string(&Topic::Unknown).unwrap();
        assert_eq!(json, "\"[Unknown Topic]\"");
        let json = serde_json::to_string(&Topic::Gaming).unwrap();
        assert_eq!(json, "\"Gaming\"");
    }

    #[test]
    fn from_str_rejects_unlisted_labels() {
        assert_eq!("Nature".parse::<Topic>(), Ok(Topic::Nature));
        assert!("Weather".parse::<Topic>().is_err());
    }
}
