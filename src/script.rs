//! Prompt script parsing
//!
//! A script is a flat block of text: one prompt per line, blank lines
//! ignored, and `#####` config directive lines that retarget the output
//! folder, file prefix, and variation mode for the prompts that follow.
//! Parsing is pure; all run-time bookkeeping (dedup, skip, numbering)
//! happens in the run loop.

use crate::error::Result;
use crate::types::FilePrefix;
use regex::Regex;
use tracing::warn;

/// One parsed script line, immutable once produced
#[derive(Clone, Debug, PartialEq)]
pub enum QueueEntry {
    /// Retargets output naming for the prompts that follow
    ConfigDirective {
        /// Starting file prefix for the block
        prefix: FilePrefix,
        /// Output folder (relative, may contain spaces)
        folder: String,
        /// Whether prompts in the block are variations of an earlier image
        is_variation: bool,
    },

    /// A prompt to submit
    Prompt {
        /// The prompt text, trimmed
        text: String,
        /// 1-based position among prompt lines, directives excluded
        ordinal: usize,
    },
}

/// Parses prompt scripts into ordered queue entries.
///
/// Directive grammar: `#####`, optional `Variation` keyword (any case), an
/// integer prefix, then a double-quoted folder name. Example:
///
/// ```text
/// ##### 00005 "Castle Series"
/// A castle at dawn, oil painting
/// ##### Variation 00010 "Castle Variants"
/// The same castle in winter
/// ```
#[derive(Debug)]
pub struct ScriptParser {
    directive: Regex,
}

impl ScriptParser {
    /// Build a parser with the directive grammar compiled
    pub fn new() -> Result<Self> {
        Ok(Self {
            directive: Regex::new(r#"(?i)^#####\s+(Variation\s+)?(\d+)\s+"([^"]*)""#)?,
        })
    }

    /// Parse a script into entries, in source order.
    ///
    /// Handles both bare and carriage-return line terminators. Lines that
    /// start like a directive but do not match the grammar are kept as
    /// prompts, so a typo surfaces visibly in the conversation instead of
    /// being dropped. A directive whose prefix overflows is skipped with a
    /// warning; it cannot have been meant as a prompt.
    pub fn parse(&self, script: &str) -> Vec<QueueEntry> {
        let mut entries = Vec::new();
        let mut ordinal = 0;

        for line in script.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(caps) = self.directive.captures(line) {
                let digits = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
                let Some(prefix) = FilePrefix::from_digits(digits) else {
                    warn!(line, "skipping config directive with out-of-range prefix");
                    continue;
                };
                entries.push(QueueEntry::ConfigDirective {
                    prefix,
                    folder: caps.get(3).map(|m| m.as_str()).unwrap_or_default().to_string(),
                    is_variation: caps.get(1).is_some(),
                });
            } else {
                ordinal += 1;
                entries.push(QueueEntry::Prompt {
                    text: line.to_string(),
                    ordinal,
                });
            }
        }

        entries
    }
}

/// Number of prompt entries in a parsed script
pub fn prompt_count(entries: &[QueueEntry]) -> usize {
    entries
        .iter()
        .filter(|entry| matches!(entry, QueueEntry::Prompt { .. }))
        .count()
}
