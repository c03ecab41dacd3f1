//! Session transcripts.
//!
//! A session can forward everything it reads and writes to a
//! [`TranscriptSink`]. Sinks are a side channel for the operator: they never
//! influence matching, and their failures are logged, not returned.

pub mod format;
pub mod recorder;
pub mod sink;

pub use format::{EventKind, Transcript, TranscriptEvent, TranscriptMetadata};
pub use recorder::Recorder;
pub use sink::{ConsoleSink, FileSink, Tee, TranscriptSink, WriterSink};
