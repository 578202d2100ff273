//! Weight-class assignment for individual matches.
//!
//! A [`ContextPolicy`] decides how strongly a posting asks for a term based
//! on where the match sits. [`SectionPolicy`] reads list headings and is the
//! default; [`KeywordWindowPolicy`] looks for cue words around the match.

use std::ops::Range;

use jobsignal_shared::{ContextPolicyKind, WeightClass};

use crate::document::{Document, LineKind};

/// Headings longer than this are prose, not section titles.
const MAX_HEADING_CHARS: usize = 80;

const HEADING_PREFERRED: &[&str] = &[
    "desirable",
    "nice to have",
    "nice-to-have",
    "preferred",
    "highly regarded",
    "advantageous",
    "bonus points",
    "a plus",
    "ideally",
];

const HEADING_REQUIRED: &[&str] = &[
    "requirements",
    "required",
    "essential",
    "mandatory",
    "skills and experience",
    "what you will bring",
    "what you'll bring",
    "to succeed in this role",
    "selection criteria",
    "must have",
    "qualifications",
    "about you",
    "you will have",
    "you'll have",
    "what we're looking for",
    "what we are looking for",
];

/// Inline cues that downgrade a single bullet to preferred.
const INLINE_PREFERRED: &[&str] = &[
    "desirable",
    "preferred",
    "advantageous",
    "highly regarded",
    "nice to have",
    "a plus",
];

const WINDOW_REQUIRED: &[&str] = &[
    "required",
    "must have",
    "must",
    "need",
    "minimum requirements",
    "mandatory",
    "essential",
    "key criteria",
    "selection criteria",
    "you will have",
    "you'll have",
    "to succeed in this role",
];

const WINDOW_PREFERRED: &[&str] = &[
    "preferred",
    "desirable",
    "nice to have",
    "advantage",
    "beneficial",
    "highly regarded",
    "highly desirable",
];

const WINDOW_BONUS: &[&str] = &["bonus", "plus", "would be great", "great if", "helpful if"];

const WINDOW_SECTION_REQUIRED: &[&str] = &[
    "requirements",
    "minimum requirements",
    "essential",
    "mandatory",
    "key requirements",
    "skills required",
    "skills and experience",
    "what you will bring",
    "what you'll bring",
    "to succeed in this role",
    "selection criteria",
];

const WINDOW_SECTION_PREFERRED: &[&str] = &[
    "desirable",
    "nice to have",
    "preferred",
    "highly regarded",
    "highly desirable",
    "advantageous",
];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Assigns a [`WeightClass`] to a match at `span` in `doc`.
pub trait ContextPolicy: Send + Sync {
    fn classify(&self, doc: &Document, span: Range<usize>) -> WeightClass;
}

/// Build the policy selected in configuration.
pub fn policy_for(kind: ContextPolicyKind) -> Box<dyn ContextPolicy> {
    match kind {
        ContextPolicyKind::Section => Box::new(SectionPolicy),
        ContextPolicyKind::KeywordWindow => Box::new(KeywordWindowPolicy::default()),
    }
}

// ---------------------------------------------------------------------------
// Section headings
// ---------------------------------------------------------------------------

/// Classifies by the heading of the bulleted block containing the match.
///
/// Matches outside any bulleted block, or in a block without a recognised
/// heading, are `context`. Headings never yield `bonus`; that class belongs
/// to catalog perks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectionPolicy;

impl ContextPolicy for SectionPolicy {
    fn classify(&self, doc: &Document, span: Range<usize>) -> WeightClass {
        let line = doc.line_at(span.start);
        if doc.line_kind(line) != LineKind::Bullet {
            return WeightClass::Context;
        }

        let Some(heading) = doc.heading_above(line) else {
            return WeightClass::Context;
        };
        if heading.trim().chars().count() > MAX_HEADING_CHARS {
            return WeightClass::Context;
        }

        let class = if contains_any(heading, HEADING_PREFERRED) {
            WeightClass::Preferred
        } else if contains_any(heading, HEADING_REQUIRED) {
            WeightClass::Required
        } else {
            return WeightClass::Context;
        };

        if class == WeightClass::Required && contains_any(doc.line_text(line), INLINE_PREFERRED) {
            return WeightClass::Preferred;
        }
        class
    }
}

// ---------------------------------------------------------------------------
// Keyword window
// ---------------------------------------------------------------------------

/// Classifies by cue words within `radius` bytes of the match. Bullets with
/// no cue default to `required`.
#[derive(Debug, Clone, Copy)]
pub struct KeywordWindowPolicy {
    pub radius: usize,
}

impl Default for KeywordWindowPolicy {
    fn default() -> Self {
        Self { radius: 100 }
    }
}

impl ContextPolicy for KeywordWindowPolicy {
    fn classify(&self, doc: &Document, span: Range<usize>) -> WeightClass {
        let window = doc.window(span.clone(), self.radius);

        if contains_any(window, WINDOW_SECTION_REQUIRED) {
            if contains_any(window, WINDOW_PREFERRED) && !contains_any(window, WINDOW_REQUIRED) {
                return WeightClass::Preferred;
            }
            return WeightClass::Required;
        }
        if contains_any(window, WINDOW_SECTION_PREFERRED) {
            return WeightClass::Preferred;
        }
        if contains_any(window, WINDOW_REQUIRED) {
            return WeightClass::Required;
        }
        if contains_any(window, WINDOW_PREFERRED) {
            return WeightClass::Preferred;
        }
        if contains_any(window, WINDOW_BONUS) {
            return WeightClass::Bonus;
        }

        if doc.line_kind(doc.line_at(span.start)) == LineKind::Bullet {
            WeightClass::Required
        } else {
            WeightClass::Context
        }
    }
}
