//! Expect pattern matching module.
//!
//! Pattern types, ordered expectations, the output buffer and the matching
//! engine used by [`Session`](crate::Session) waits.

mod buffer;
mod matcher;
mod pattern;

pub use buffer::{DEFAULT_CAPACITY, RingBuffer};
pub use matcher::{ExpectState, MatchResult, Matcher};
pub use pattern::{CompiledRegex, Expectation, Pattern, PatternMatch};
