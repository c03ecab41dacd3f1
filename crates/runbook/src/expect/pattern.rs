//! Candidate patterns and ordered expectations.

use std::fmt;
use std::time::Duration;

use regex::Regex;

/// One candidate match target.
#[derive(Clone)]
pub enum Pattern {
    /// Match an exact substring.
    Literal(String),

    /// Match a regular expression.
    Regex(CompiledRegex),

    /// Satisfied once the child's output has ended.
    Eof,

    /// Satisfied when the wait reaches its deadline.
    ///
    /// The duration shortens the wait's deadline when it is smaller.
    Timeout(Duration),
}

impl Pattern {
    /// Create a literal pattern.
    #[must_use]
    pub fn literal(s: impl Into<String>) -> Self {
        Self::Literal(s.into())
    }

    /// Create a regex pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex pattern is invalid.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(pattern)?;
        Ok(Self::Regex(CompiledRegex::new(pattern.to_string(), regex)))
    }

    /// Create an EOF sentinel.
    #[must_use]
    pub const fn eof() -> Self {
        Self::Eof
    }

    /// Create a timeout sentinel.
    #[must_use]
    pub const fn timeout(duration: Duration) -> Self {
        Self::Timeout(duration)
    }

    /// Get the pattern as a string for display purposes.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Literal(s) => s,
            Self::Regex(r) => r.pattern(),
            Self::Eof => "<EOF>",
            Self::Timeout(_) => "<TIMEOUT>",
        }
    }

    /// Find this pattern in `text`.
    ///
    /// Sentinels never match text.
    #[must_use]
    pub fn matches(&self, text: &str) -> Option<PatternMatch> {
        match self {
            Self::Literal(s) => text.find(s.as_str()).map(|pos| PatternMatch {
                start: pos,
                end: pos + s.len(),
                captures: Vec::new(),
            }),
            Self::Regex(r) => r.captures(text),
            Self::Eof | Self::Timeout(_) => None,
        }
    }

    /// Check if this is a timeout sentinel.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this is an EOF sentinel.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }

    /// Get the timeout duration if this is a timeout sentinel.
    #[must_use]
    pub const fn timeout_duration(&self) -> Option<Duration> {
        match self {
            Self::Timeout(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(s) => write!(f, "Literal({s:?})"),
            Self::Regex(r) => write!(f, "Regex({:?})", r.pattern()),
            Self::Eof => write!(f, "Eof"),
            Self::Timeout(d) => write!(f, "Timeout({d:?})"),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(s) => write!(f, "'{s}'"),
            Self::Regex(r) => write!(f, "/{}/", r.pattern()),
            Self::Eof | Self::Timeout(_) => f.write_str(self.as_str()),
        }
    }
}

impl From<&str> for Pattern {
    fn from(s: &str) -> Self {
        Self::Literal(s.to_string())
    }
}

impl From<String> for Pattern {
    fn from(s: String) -> Self {
        Self::Literal(s)
    }
}

/// A compiled regular expression with its source pattern.
#[derive(Clone)]
pub struct CompiledRegex {
    pattern: String,
    regex: Regex,
}

impl CompiledRegex {
    /// Create a new compiled regex.
    #[must_use]
    pub const fn new(pattern: String, regex: Regex) -> Self {
        Self { pattern, regex }
    }

    /// Get the source pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Find the leftmost match with its capture groups.
    fn captures(&self, text: &str) -> Option<PatternMatch> {
        let caps = self.regex.captures(text)?;
        let whole = caps.get(0)?;
        Some(PatternMatch {
            start: whole.start(),
            end: whole.end(),
            captures: caps
                .iter()
                .skip(1)
                .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
                .collect(),
        })
    }
}

/// Location of a pattern within searched text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    /// Start position of the match in the text.
    pub start: usize,
    /// End position of the match in the text.
    pub end: usize,
    /// Capture groups (for regex patterns).
    pub captures: Vec<String>,
}

impl PatternMatch {
    /// Get the matched text from the original input.
    #[must_use]
    pub fn as_str<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }
}

/// An ordered list of candidates for one wait.
///
/// Candidates are tested in list order and the lowest-index satisfied
/// candidate wins, wherever in the output it matched. Abort patterns fail the
/// wait when they show up before any candidate is satisfied.
///
/// ```
/// use runbook::expect::{Expectation, Pattern};
///
/// let expectation = Expectation::new()
///     .with("Android build completed successfully!")
///     .with("Error:")
///     .with(Pattern::Eof);
/// assert_eq!(expectation.eof_index(), Some(2));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Expectation {
    candidates: Vec<Pattern>,
    abort: Vec<Pattern>,
}

impl Expectation {
    /// Create an empty expectation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an expectation from candidates in order.
    #[must_use]
    pub const fn from_patterns(candidates: Vec<Pattern>) -> Self {
        Self {
            candidates,
            abort: Vec::new(),
        }
    }

    /// Append a candidate.
    #[must_use]
    pub fn with(mut self, pattern: impl Into<Pattern>) -> Self {
        self.candidates.push(pattern.into());
        self
    }

    /// Append a candidate in place.
    pub fn add(&mut self, pattern: impl Into<Pattern>) -> &mut Self {
        self.candidates.push(pattern.into());
        self
    }

    /// Fail the wait with `PatternNotFound` if `pattern` appears first.
    #[must_use]
    pub fn abort_on(mut self, pattern: impl Into<Pattern>) -> Self {
        self.abort.push(pattern.into());
        self
    }

    /// Number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Check if there are no candidates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Get a candidate by index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Pattern> {
        self.candidates.get(index)
    }

    /// Iterate over the candidates in order.
    pub fn iter(&self) -> impl Iterator<Item = &Pattern> {
        self.candidates.iter()
    }

    /// The lowest-index text candidate found in `text`.
    #[must_use]
    pub fn find_match(&self, text: &str) -> Option<(usize, PatternMatch)> {
        self.candidates
            .iter()
            .enumerate()
            .find_map(|(idx, pattern)| pattern.matches(text).map(|m| (idx, m)))
    }

    /// The first abort pattern present in `text`.
    #[must_use]
    pub fn find_abort(&self, text: &str) -> Option<&Pattern> {
        self.abort.iter().find(|p| p.matches(text).is_some())
    }

    /// Index of the first `Eof` sentinel.
    #[must_use]
    pub fn eof_index(&self) -> Option<usize> {
        self.candidates.iter().position(Pattern::is_eof)
    }

    /// Index of the first `Timeout` sentinel.
    #[must_use]
    pub fn timeout_index(&self) -> Option<usize> {
        self.candidates.iter().position(Pattern::is_timeout)
    }

    /// The smallest duration carried by a `Timeout` sentinel.
    #[must_use]
    pub fn min_timeout(&self) -> Option<Duration> {
        self.candidates
            .iter()
            .filter_map(Pattern::timeout_duration)
            .min()
    }

    /// Human-readable list of candidates, for errors and logs.
    #[must_use]
    pub fn describe(&self) -> String {
        self.candidates
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

impl From<Pattern> for Expectation {
    fn from(pattern: Pattern) -> Self {
        Self::from_patterns(vec![pattern])
    }
}

impl From<&str> for Expectation {
    fn from(s: &str) -> Self {
        Self::from(Pattern::from(s))
    }
}

impl From<Vec<Pattern>> for Expectation {
    fn from(candidates: Vec<Pattern>) -> Self {
        Self::from_patterns(candidates)
    }
}

impl<const N: usize> From<[&str; N]> for Expectation {
    fn from(candidates: [&str; N]) -> Self {
        Self::from_patterns(candidates.into_iter().map(Pattern::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn literal_pattern_matches() {
        let m = Pattern::literal("hello").matches("say hello world").unwrap();
        assert_eq!(m.start, 4);
        assert_eq!(m.end, 9);
    }

    #[test]
    fn regex_pattern_captures() {
        let pattern = Pattern::regex(r"(\w+)@(\w+)").unwrap();
        let m = pattern.matches("email: user@domain here").unwrap();
        assert_eq!(m.as_str("email: user@domain here"), "user@domain");
        assert_eq!(m.captures, vec!["user", "domain"]);
    }

    #[test]
    fn sentinels_never_match_text() {
        assert!(Pattern::Eof.matches("<EOF>").is_none());
        assert!(Pattern::timeout(Duration::from_secs(1)).matches("<TIMEOUT>").is_none());
    }

    #[test]
    fn earliest_listed_candidate_wins() {
        let expectation = Expectation::from(["world", "hello"]);
        let (idx, m) = expectation.find_match("hello world").unwrap();
        // "hello" appears first in the text but "world" is listed first.
        assert_eq!(idx, 0);
        assert_eq!(m.start, 6);
    }

    #[test]
    fn sentinel_positions() {
        let expectation = Expectation::new()
            .with("#")
            .with(Pattern::timeout(Duration::from_secs(10)))
            .with(Pattern::Eof)
            .with(Pattern::timeout(Duration::from_secs(5)));

        assert_eq!(expectation.timeout_index(), Some(1));
        assert_eq!(expectation.eof_index(), Some(2));
        assert_eq!(expectation.min_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn abort_patterns() {
        let expectation = Expectation::from(["$"]).abort_on("Operation not permitted");
        assert!(expectation.find_abort("run-as: Operation not permitted").is_some());
        assert!(expectation.find_abort("u0_a123@device:/ $").is_none());
    }

    #[test]
    fn describe_lists_candidates() {
        let expectation = Expectation::new()
            .with("(lldb)")
            .with(Pattern::regex("error:.*").unwrap())
            .with(Pattern::Eof);
        assert_eq!(expectation.describe(), "'(lldb)' | /error:.*/ | <EOF>");
    }

    proptest! {
        #[test]
        fn identical_candidates_report_lowest_index(
            prefix in "[a-z ]{0,20}",
            needle in "[A-Z]{1,8}",
            suffix in "[a-z ]{0,20}",
            copies in 2usize..5,
        ) {
            let text = format!("{prefix}{needle}{suffix}");
            let expectation = Expectation::from_patterns(
                (0..copies).map(|_| Pattern::literal(needle.clone())).collect(),
            );
            let (idx, m) = expectation.find_match(&text).unwrap();
            prop_assert_eq!(idx, 0);
            prop_assert_eq!(m.as_str(&text), needle.as_str());
        }

        #[test]
        fn winner_is_first_satisfied_in_list_order(
            present in proptest::collection::vec(any::<bool>(), 1..6),
        ) {
            let tokens: Vec<String> = (0..present.len()).map(|i| format!("<T{i}>")).collect();
            let text: String = tokens
                .iter()
                .zip(&present)
                .rev()
                .filter(|(_, p)| **p)
                .map(|(t, _)| t.as_str())
                .collect();
            let expectation = Expectation::from_patterns(
                tokens.iter().map(|t| Pattern::literal(t.clone())).collect(),
            );

            let expected = present.iter().position(|p| *p);
            let actual = expectation.find_match(&text).map(|(idx, _)| idx);
            prop_assert_eq!(actual, expected);
        }
    }
}
