//! Ordered include/exclude filter rules.
//!
//! Rules are evaluated in declaration order and the first matching rule
//! decides. A path no rule matches is included.
//!
//! Patterns are matched against the full root-relative path: `*`, `?` and
//! `[...]` stay within one path segment, `**` spans directories. A trailing
//! `/` selects everything beneath that directory, and a leading `/` is
//! accepted but redundant since patterns are always anchored at the root.

use globset::{GlobBuilder, GlobMatcher};
use std::fmt;
use std::path::Path;

use crate::error::FilterError;

/// Whether a rule keeps or drops the paths it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Include,
    Exclude,
}

/// Result of evaluating a path against a rule list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Included,
    Excluded,
}

/// A single compiled rule.
#[derive(Debug, Clone)]
pub struct FilterRule {
    pub pattern: String,
    pub polarity: Polarity,
    pub order: usize,
    matcher: GlobMatcher,
}

impl FilterRule {
    pub fn new(pattern: &str, polarity: Polarity, order: usize) -> Result<Self, FilterError> {
        let trimmed = pattern.trim();
        let anchored = trimmed.trim_start_matches('/');
        if anchored.is_empty() {
            return Err(FilterError::EmptyPattern);
        }

        let glob = if anchored.ends_with('/') {
            format!("{}**", anchored)
        } else {
            anchored.to_string()
        };

        let matcher = GlobBuilder::new(&glob)
            .literal_separator(true)
            .backslash_escape(true)
            .build()
            .map_err(|source| FilterError::InvalidPattern {
                pattern: trimmed.to_string(),
                source,
            })?
            .compile_matcher();

        Ok(Self {
            pattern: trimmed.to_string(),
            polarity,
            order,
            matcher,
        })
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }
}

impl fmt::Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = match self.polarity {
            Polarity::Include => '+',
            Polarity::Exclude => '-',
        };
        write!(f, "{} {}", sign, self.pattern)
    }
}

/// Evaluate `path` against `rules` in order.
pub fn matches(path: &str, rules: &[FilterRule]) -> FilterDecision {
    rules
        .iter()
        .find(|rule| rule.is_match(path))
        .map(|rule| match rule.polarity {
            Polarity::Include => FilterDecision::Included,
            Polarity::Exclude => FilterDecision::Excluded,
        })
        .unwrap_or(FilterDecision::Included)
}

/// Ordered rule list assembled from CLI flags and filter files.
#[derive(Debug, Clone, Default)]
pub struct FilterRules {
    rules: Vec<FilterRule>,
}

impl FilterRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule at the end of the evaluation order.
    pub fn push(&mut self, pattern: &str, polarity: Polarity) -> Result<(), FilterError> {
        let rule = FilterRule::new(pattern, polarity, self.rules.len())?;
        self.rules.push(rule);
        Ok(())
    }

    pub fn include(&mut self, pattern: &str) -> Result<(), FilterError> {
        self.push(pattern, Polarity::Include)
    }

    pub fn exclude(&mut self, pattern: &str) -> Result<(), FilterError> {
        self.push(pattern, Polarity::Exclude)
    }

    /// Build from `(pattern, polarity)` pairs in the order given.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = (&'a str, Polarity)>,
    {
        let mut rules = Self::new();
        for (pattern, polarity) in pairs {
            rules.push(pattern, polarity)?;
        }
        Ok(rules)
    }

    /// Append the rules of a filter file's contents.
    ///
    /// `#` starts a comment line, blank lines are ignored, every other line
    /// is `+ PATTERN` or `- PATTERN`. `source` names the file in errors.
    pub fn extend_from_str(&mut self, content: &str, source: &Path) -> Result<(), FilterError> {
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let malformed = || FilterError::MalformedLine {
                file: source.to_path_buf(),
                line: index + 1,
                content: line.to_string(),
            };

            let (polarity, pattern) = if let Some(rest) = line.strip_prefix("+ ") {
                (Polarity::Include, rest)
            } else if let Some(rest) = line.strip_prefix("- ") {
                (Polarity::Exclude, rest)
            } else {
                return Err(malformed());
            };

            if pattern.trim().is_empty() {
                return Err(malformed());
            }
            self.push(pattern, polarity)?;
        }
        Ok(())
    }

    /// Read and append a filter file.
    pub fn extend_from_file(&mut self, path: &Path) -> Result<(), FilterError> {
        let content = std::fs::read_to_string(path).map_err(|source| FilterError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.extend_from_str(&content, path)
    }

    pub fn evaluate(&self, path: &str) -> FilterDecision {
        matches(path, &self.rules)
    }

    pub fn is_included(&self, path: &str) -> bool {
        self.evaluate(path) == FilterDecision::Included
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}
