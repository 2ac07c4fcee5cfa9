//! Anchor-bounded text replacement
//!
//! This module is the pure half of a patch: it maps original text to patched
//! text and never touches the filesystem. A region starts at the first
//! occurrence of the start anchor and runs, non-greedily, to the first end
//! anchor after it. Both anchors are kept verbatim; only the interior between
//! them is replaced.

use std::fmt;
use std::ops::Range;

use regex::Regex;

use crate::error::PatchError;

/// Default number of characters shown when a patch misses.
pub const DEFAULT_SNIPPET_CHARS: usize = 500;

/// A compiled start/end anchor pair.
#[derive(Debug, Clone)]
pub struct AnchorPattern {
    start: String,
    end: String,
    regex: Regex,
}

impl AnchorPattern {
    pub fn new(start: &str, end: &str) -> Result<Self, PatchError> {
        if start.is_empty() {
            return Err(PatchError::InvalidRecipe("start anchor is empty".to_string()));
        }
        if end.is_empty() {
            return Err(PatchError::InvalidRecipe("end anchor is empty".to_string()));
        }

        // (?s) lets the lazy interior cross newlines; anchors are literal text.
        let source = format!(
            "(?s){}(.*?){}",
            regex::escape(start),
            regex::escape(end)
        );
        let regex = Regex::new(&source)
            .map_err(|e| PatchError::InvalidRecipe(format!("anchor pattern failed to compile: {}", e)))?;

        Ok(Self {
            start: start.to_string(),
            end: end.to_string(),
            regex,
        })
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn end(&self) -> &str {
        &self.end
    }

    /// Locate the anchored region. Returns the byte range of the whole match
    /// (anchors included) and of the interior.
    pub fn find(&self, text: &str) -> Option<AnchorMatch> {
        let caps = self.regex.captures(text)?;
        let whole = caps.get(0)?;
        let interior = caps.get(1)?;
        Some(AnchorMatch {
            region: whole.range(),
            interior: interior.range(),
        })
    }
}

/// Byte offsets of a matched region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorMatch {
    pub region: Range<usize>,
    pub interior: Range<usize>,
}

/// Why a patch did not apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    StartAnchorMissing,
    EndAnchorMissing,
    InteriorGuardMissing,
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissReason::StartAnchorMissing => write!(f, "start anchor not found"),
            MissReason::EndAnchorMissing => write!(f, "no end anchor after the start anchor"),
            MissReason::InteriorGuardMissing => {
                write!(f, "region found but its interior lacks the required text")
            }
        }
    }
}

/// Bounded excerpt of the file used to debug a miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    /// Byte offset of the marker in the file
    pub offset: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// Interior replaced; `span` is the byte range of the new interior in `content`
    Patched { content: String, span: Range<usize> },
    /// Interior already equals the replacement
    AlreadyApplied,
    NotMatched {
        reason: MissReason,
        /// `None` when the marker itself is absent
        snippet: Option<Snippet>,
    },
}

impl PatchOutcome {
    pub fn is_patched(&self) -> bool {
        matches!(self, PatchOutcome::Patched { .. })
    }
}

/// Everything the pure transformation needs.
#[derive(Debug, Clone)]
pub struct AnchorPatch {
    pattern: AnchorPattern,
    replacement: String,
    marker: String,
    require_interior: Option<String>,
    snippet_chars: usize,
}

impl AnchorPatch {
    /// Build a patch, refusing replacements that would re-trigger the pattern.
    ///
    /// Matching stops at the first end anchor, so the first occurrence of the
    /// end anchor in `replacement + end` must be the appended one. Otherwise a
    /// second run stops inside the replacement (or across its tail when the
    /// end anchor overlaps itself, like `"\n\n"`) and the file keeps growing.
    pub fn new(pattern: AnchorPattern, replacement: impl Into<String>) -> Result<Self, PatchError> {
        let replacement = replacement.into();
        let rejoined = format!("{}{}", replacement, pattern.end());
        if rejoined.find(pattern.end()) != Some(replacement.len()) {
            return Err(PatchError::InvalidRecipe(format!(
                "the end anchor {:?} would match inside the replacement; a second run would stop early",
                pattern.end()
            )));
        }
        let marker = default_marker(pattern.start());
        Ok(Self {
            pattern,
            replacement,
            marker,
            require_interior: None,
            snippet_chars: DEFAULT_SNIPPET_CHARS,
        })
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        let marker = marker.into();
        if !marker.is_empty() {
            self.marker = marker;
        }
        self
    }

    pub fn with_required_interior(mut self, needle: Option<String>) -> Self {
        self.require_interior = needle.filter(|n| !n.is_empty());
        self
    }

    pub fn with_snippet_chars(mut self, chars: usize) -> Self {
        self.snippet_chars = chars;
        self
    }

    pub fn pattern(&self) -> &AnchorPattern {
        &self.pattern
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Apply the patch to `original`.
    pub fn apply(&self, original: &str) -> PatchOutcome {
        let Some(found) = self.pattern.find(original) else {
            return self.miss(original, self.classify_miss(original));
        };

        let interior = &original[found.interior.clone()];
        // Checked before the guard: the replacement need not contain the guard text
        if interior == self.replacement {
            return PatchOutcome::AlreadyApplied;
        }

        if let Some(needle) = &self.require_interior {
            if !interior.contains(needle.as_str()) {
                return self.miss(original, MissReason::InteriorGuardMissing);
            }
        }

        let mut content = String::with_capacity(
            original.len() - interior.len() + self.replacement.len(),
        );
        content.push_str(&original[..found.interior.start]);
        let span_start = content.len();
        content.push_str(&self.replacement);
        let span = span_start..content.len();
        content.push_str(&original[found.interior.end..]);

        PatchOutcome::Patched { content, span }
    }

    fn classify_miss(&self, original: &str) -> MissReason {
        if original.contains(self.pattern.start()) {
            MissReason::EndAnchorMissing
        } else {
            MissReason::StartAnchorMissing
        }
    }

    fn miss(&self, original: &str, reason: MissReason) -> PatchOutcome {
        PatchOutcome::NotMatched {
            reason,
            snippet: snippet_at_marker(original, &self.marker, self.snippet_chars),
        }
    }
}

/// First line of the start anchor, trimmed; falls back to the whole anchor.
fn default_marker(start: &str) -> String {
    start
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or(start)
        .to_string()
}

/// Up to `max_chars` characters of `text` starting at the first `marker`.
///
/// Counts characters rather than bytes so the cut never splits a code point.
pub fn snippet_at_marker(text: &str, marker: &str, max_chars: usize) -> Option<Snippet> {
    if marker.is_empty() {
        return None;
    }
    let offset = text.find(marker)?;
    let tail = &text[offset..];
    let end = tail
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(tail.len());
    Some(Snippet {
        offset,
        text: tail[..end].to_string(),
    })
}

/// Interpret `\n`, `\t`, `\r` and `\\` in anchors typed on the command line.
pub fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
