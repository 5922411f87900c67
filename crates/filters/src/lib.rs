#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Pattern lists deciding which newly-found entries are versioned. A
//! pattern is a shell glob or a regex plus optional type predicates (mode,
//! device, inode), carries a polarity - `ignore` drops matching entries,
//! `take` keeps them - and may belong to a named group with auto-props for
//! entries it captures.
//!
//! Evaluation is strictly first-match-wins over the list order, which is
//! how take patterns override later ignore patterns.

mod pattern;

pub use pattern::{Matcher, Pattern, PatternError, Polarity};

use base::{Error, ErrorKind, Result};
use metadata::StatInfo;

/// What the pattern list says about one path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// No pattern matched; the entry is versioned normally.
    Unmatched,
    /// An ignore pattern matched first.
    Ignored,
    /// A take pattern matched first; the group name (if any) selects
    /// auto-props.
    Taken {
        /// Group the winning pattern belongs to.
        group: Option<String>,
    },
}

/// Where a new pattern is inserted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Position {
    /// In front of all existing patterns.
    Front,
    /// Behind all existing patterns.
    End,
}

/// An ordered pattern list.
#[derive(Clone, Debug, Default)]
pub struct PatternList {
    patterns: Vec<Pattern>,
}

impl PatternList {
    /// An empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True when no patterns are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Adds a pattern at `position`.
    pub fn insert(&mut self, pattern: Pattern, position: Position) {
        match position {
            Position::Front => self.patterns.insert(0, pattern),
            Position::End => self.patterns.push(pattern),
        }
    }

    /// Parses and adds a batch of pattern specifications.
    pub fn add_specs<'a, I>(&mut self, specs: I, position: Position) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut batch = Vec::new();
        for spec in specs {
            batch.push(Pattern::parse(spec).map_err(|e| {
                Error::new(ErrorKind::Io, format!("pattern \"{spec}\": {e}"))
            })?);
        }
        match position {
            Position::Front => {
                for pattern in batch.into_iter().rev() {
                    self.patterns.insert(0, pattern);
                }
            }
            Position::End => self.patterns.extend(batch),
        }
        Ok(())
    }

    /// First-match-wins evaluation for a working-copy-relative path.
    #[must_use]
    pub fn decide(&self, rel_path: &str, st: &StatInfo) -> Decision {
        for pattern in &self.patterns {
            if pattern.matches(rel_path, st) {
                return match pattern.polarity() {
                    Polarity::Ignore => Decision::Ignored,
                    Polarity::Take => Decision::Taken {
                        group: pattern.group().map(str::to_owned),
                    },
                };
            }
        }
        Decision::Unmatched
    }

    /// Convenience wrapper: is the entry to be ignored?
    #[must_use]
    pub fn is_ignored(&self, rel_path: &str, st: &StatInfo) -> bool {
        self.decide(rel_path, st) == Decision::Ignored
    }

    /// The auto-props of the group winning for this path, if any.
    #[must_use]
    pub fn auto_props(&self, rel_path: &str, st: &StatInfo) -> &[(String, String)] {
        for pattern in &self.patterns {
            if pattern.matches(rel_path, st) {
                return pattern.auto_props();
            }
        }
        &[]
    }

    /// The serialized form, one specification per line, round-trippable
    /// through [`PatternList::parse`].
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for pattern in &self.patterns {
            out.push_str(pattern.spec());
            out.push('\n');
        }
        out
    }

    /// Parses the serialized form.
    pub fn parse(text: &str) -> Result<Self> {
        let mut list = Self::new();
        list.add_specs(
            text.lines().filter(|l| !l.is_empty() && !l.starts_with('#')),
            Position::End,
        )?;
        Ok(list)
    }
}
