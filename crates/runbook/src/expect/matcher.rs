//! Matching engine combining the output buffer with an expectation.

use std::time::{Duration, Instant};

use super::buffer::RingBuffer;
use super::pattern::Expectation;
use crate::types::Match;

/// The pattern matching engine behind a session's waits.
#[derive(Debug)]
pub struct Matcher {
    buffer: RingBuffer,
    default_timeout: Duration,
}

impl Matcher {
    /// Create a new matcher with the specified buffer size.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer: RingBuffer::new(buffer_size),
            default_timeout: crate::config::DEFAULT_TIMEOUT,
        }
    }

    /// Set the default timeout.
    pub const fn set_default_timeout(&mut self, timeout: Duration) {
        self.default_timeout = timeout;
    }

    /// The default timeout.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Append raw output to the buffer.
    pub fn append(&mut self, data: &[u8]) {
        self.buffer.append(data);
    }

    /// Decode any held-back partial character once output has ended.
    pub fn finish(&mut self) {
        self.buffer.flush_pending();
    }

    /// Get the current buffer.
    #[must_use]
    pub const fn buffer(&self) -> &RingBuffer {
        &self.buffer
    }

    /// Get the current buffer contents.
    #[must_use]
    pub fn buffer_str(&self) -> &str {
        self.buffer.as_str()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Remove and return everything buffered.
    pub fn take_all(&mut self) -> String {
        self.buffer.take_all()
    }

    /// The lowest-index text candidate satisfied by the buffer.
    #[must_use]
    pub fn try_match_any(&self, expectation: &Expectation) -> Option<MatchResult> {
        expectation
            .find_match(self.buffer.as_str())
            .map(|(pattern_index, m)| MatchResult {
                pattern_index,
                start: m.start,
                end: m.end,
                captures: m.captures,
            })
    }

    /// Consume the buffer through a text match and return the [`Match`].
    pub fn consume_match(&mut self, result: &MatchResult) -> Match {
        let before = self.buffer.consume(result.start);
        let matched = self.buffer.consume(result.end - result.start);
        let after = self.buffer.as_str().to_string();

        Match::new(result.pattern_index, matched, before, after)
            .with_captures(result.captures.clone())
    }

    /// Resolve an `Eof` sentinel: everything buffered becomes `before`.
    pub fn consume_eof(&mut self, pattern_index: usize) -> Match {
        Match::new(pattern_index, "", self.take_all(), "")
    }

    /// Resolve a `Timeout` sentinel. The buffer is kept for the next wait.
    #[must_use]
    pub fn snapshot_timeout(&self, pattern_index: usize) -> Match {
        let text = self.buffer.as_str();
        Match::new(pattern_index, "", text, text)
    }

    /// The deadline for one wait.
    ///
    /// A `Timeout` sentinel shortens `requested` when it is smaller.
    #[must_use]
    pub fn effective_timeout(&self, expectation: &Expectation, requested: Option<Duration>) -> Duration {
        let requested = requested.unwrap_or(self.default_timeout);
        expectation
            .min_timeout()
            .map_or(requested, |sentinel| sentinel.min(requested))
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(super::buffer::DEFAULT_CAPACITY)
    }
}

/// Position of a satisfied candidate in the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Index of the candidate that matched.
    pub pattern_index: usize,
    /// Start position in the buffer.
    pub start: usize,
    /// End position in the buffer.
    pub end: usize,
    /// Capture groups.
    pub captures: Vec<String>,
}

/// Deadline bookkeeping for one wait.
#[derive(Debug, Clone, Copy)]
pub struct ExpectState {
    start_time: Instant,
    timeout: Duration,
}

impl ExpectState {
    /// Start the clock for a wait of `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            start_time: Instant::now(),
            timeout,
        }
    }

    /// The wait's total timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check if the deadline has passed.
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        self.start_time.elapsed() >= self.timeout
    }

    /// Get the remaining time until the deadline.
    #[must_use]
    pub fn remaining_time(&self) -> Duration {
        self.timeout.saturating_sub(self.start_time.elapsed())
    }
}
