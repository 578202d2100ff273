//! Prepared posting text with a line index for structure lookups.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-•*·]|\d+[.)])\s+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    Bullet,
    Text,
}

#[derive(Debug, Clone)]
struct Line {
    span: Range<usize>,
    kind: LineKind,
}

/// Posting text normalized for matching (NFKC, `\n` line endings, lowercase).
///
/// All byte offsets produced by matching refer to [`Document::text`].
#[derive(Debug, Clone)]
pub struct Document {
    text: String,
    lines: Vec<Line>,
}

impl Document {
    pub fn new(raw: &str) -> Self {
        let text = raw
            .nfkc()
            .collect::<String>()
            .replace("\r\n", "\n")
            .replace('\r', "\n")
            .to_lowercase();

        let mut lines = Vec::new();
        let mut start = 0;
        for line in text.split('\n') {
            let end = start + line.len();
            let kind = if line.trim().is_empty() {
                LineKind::Blank
            } else if BULLET.is_match(line) {
                LineKind::Bullet
            } else {
                LineKind::Text
            };
            lines.push(Line {
                span: start..end,
                kind,
            });
            start = end + 1;
        }

        Self { text, lines }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Index of the line containing byte `offset`.
    pub fn line_at(&self, offset: usize) -> usize {
        self.lines
            .partition_point(|line| line.span.end < offset)
            .min(self.lines.len().saturating_sub(1))
    }

    pub fn line_kind(&self, index: usize) -> LineKind {
        self.lines.get(index).map_or(LineKind::Blank, |l| l.kind)
    }

    pub fn line_text(&self, index: usize) -> &str {
        self.lines
            .get(index)
            .map_or("", |l| &self.text[l.span.clone()])
    }

    /// The nearest non-bullet text line above `index`, skipping blank lines
    /// and the bullets of the same list.
    pub fn heading_above(&self, index: usize) -> Option<&str> {
        (0..index)
            .rev()
            .find(|&i| self.lines[i].kind == LineKind::Text)
            .map(|i| self.line_text(i))
    }

    /// `span` widened by `radius` bytes on each side, clamped to char boundaries.
    pub fn window(&self, span: Range<usize>, radius: usize) -> &str {
        let mut start = span.start.saturating_sub(radius);
        while !self.text.is_char_boundary(start) {
            start -= 1;
        }
        let mut end = span.end.saturating_add(radius).min(self.text.len());
        while !self.text.is_char_boundary(end) {
            end += 1;
        }
        &self.text[start..end]
    }

    /// Like [`Document::window`], but never reaching past the line holding
    /// the start of `span`.
    pub fn line_window(&self, span: Range<usize>, radius: usize) -> &str {
        let Some(line) = self.lines.get(self.line_at(span.start)) else {
            return self.window(span, radius);
        };
        let mut start = span.start.saturating_sub(radius).max(line.span.start);
        while !self.text.is_char_boundary(start) {
            start -= 1;
        }
        let mut end = span
            .end
            .saturating_add(radius)
            .min(line.span.end.max(span.end))
            .min(self.text.len());
        while !self.text.is_char_boundary(end) {
            end += 1;
        }
        &self.text[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_lines() {
        let doc = Document::new("Requirements:\r\n\r\n- CCNA\n2) ITIL\n* Linux\nAbout us");
        let kinds: Vec<_> = (0..6).map(|i| doc.line_kind(i)).collect();
        assert_eq!(
            kinds,
            vec![
                LineKind::Text,
                LineKind::Blank,
                LineKind::Bullet,
                LineKind::Bullet,
                LineKind::Bullet,
                LineKind::Text
            ]
        );
    }

    #[test]
    fn bold_heading_is_not_a_bullet() {
        let doc = Document::new("**Requirements**\n- CCNA");
        assert_eq!(doc.line_kind(0), LineKind::Text);
        assert_eq!(doc.line_kind(1), LineKind::Bullet);
    }

    #[test]
    fn line_lookup_and_heading() {
        let doc = Document::new("Preferred:\n\n- AZ-900\n- MS-900");
        let offset = doc.text().find("ms-900").unwrap();
        let line = doc.line_at(offset);
        assert_eq!(doc.line_text(line), "- ms-900");
        assert_eq!(doc.heading_above(line), Some("preferred:"));
        assert_eq!(doc.line_at(0), 0);
    }

    #[test]
    fn window_respects_char_boundaries() {
        let doc = Document::new("ééééé ccna ééééé");
        let start = doc.text().find("ccna").unwrap();
        let window = doc.window(start..start + 4, 3);
        assert!(window.contains("ccna"));
    }

    #[test]
    fn line_window_stays_on_its_line() {
        let doc = Document::new("Requirements:\n- CCNA\n- Degree not required");
        let start = doc.text().find("ccna").unwrap();
        assert_eq!(doc.line_window(start..start + 4, 60), "- ccna");
        assert!(doc.window(start..start + 4, 60).contains("not required"));
    }

    #[test]
    fn normalizes_text() {
        let doc = Document::new("ＣＣＮＡ Required");
        assert_eq!(doc.text(), "ccna required");
    }
}
