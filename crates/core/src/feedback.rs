//! C-LEAR Feedback Tagging
//!
//! Labels a trainee's message with the communication skills it displays. The
//! default tagger is a keyword heuristic; the `FeedbackTagger` trait lets a
//! better classifier replace it without touching the session logic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A communication-skill label from the C-LEAR approach.
///
/// The derived ordering is the canonical order tags are reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClearTag {
    Counsel,
    Listen,
    Empathize,
    /// Exploring the parent's question, i.e. the "Answer" step.
    Explore,
    Restate,
    Acknowledge,
}

impl ClearTag {
    pub fn description(&self) -> &'static str {
        match self {
            ClearTag::Counsel => "Provide guidance",
            ClearTag::Listen => "Show active listening",
            ClearTag::Empathize => "Show understanding",
            ClearTag::Explore => "Address the content of the question",
            ClearTag::Restate => "Summarize understanding",
            ClearTag::Acknowledge => "Recognize concerns",
        }
    }
}

impl fmt::Display for ClearTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ClearTag::Counsel => "Counsel",
            ClearTag::Listen => "Listen",
            ClearTag::Empathize => "Empathize",
            ClearTag::Explore => "Explore",
            ClearTag::Restate => "Restate",
            ClearTag::Acknowledge => "Acknowledge",
        };
        f.write_str(label)
    }
}

/// Maps a trainee message to the skills it shows.
pub trait FeedbackTagger: Send + Sync {
    /// Returns the detected tags, deduplicated and in canonical order.
    fn tag(&self, message: &str) -> Vec<ClearTag>;
}

/// One entry of the keyword table: any keyword present yields `tag`.
#[derive(Debug, Clone)]
pub struct TagRule {
    pub keywords: Vec<String>,
    pub tag: ClearTag,
}

impl TagRule {
    pub fn new(tag: ClearTag, keywords: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            tag,
        }
    }

    fn matches(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }
}

/// Case-insensitive substring matching against a fixed rule table.
#[derive(Debug, Clone)]
pub struct KeywordTagger {
    rules: Vec<TagRule>,
}

impl KeywordTagger {
    pub fn new(rules: Vec<TagRule>) -> Self {
        Self { rules }
    }
}

impl Default for KeywordTagger {
    fn default() -> Self {
        Self::new(vec![
            TagRule::new(ClearTag::Counsel, &["recommend", "suggest"]),
            TagRule::new(ClearTag::Listen, &["understand", "hear"]),
            TagRule::new(ClearTag::Empathize, &["feel", "concern"]),
            TagRule::new(ClearTag::Explore, &["what", "tell me"]),
            TagRule::new(ClearTag::Restate, &["so you", "let me"]),
            TagRule::new(ClearTag::Acknowledge, &["valid", "normal"]),
        ])
    }
}

impl FeedbackTagger for KeywordTagger {
    fn tag(&self, message: &str) -> Vec<ClearTag> {
        let lowered = message.to_lowercase();
        self.rules
            .iter()
            .filter(|rule| rule.matches(&lowered))
            .map(|rule| rule.tag)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
