//! In-memory session recording.

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::format::{Transcript, TranscriptEvent, TranscriptMetadata};
use super::sink::TranscriptSink;
use crate::error::Result;

/// Records a timestamped [`Transcript`].
///
/// Clones share one transcript, so a clone can be handed to a session as its
/// sink while the original is kept to read the result.
#[derive(Debug, Clone)]
pub struct Recorder {
    start: Instant,
    transcript: Arc<Mutex<Transcript>>,
    max_events: Option<usize>,
}

impl Recorder {
    /// Create a new recorder.
    #[must_use]
    pub fn new(metadata: TranscriptMetadata) -> Self {
        Self {
            start: Instant::now(),
            transcript: Arc::new(Mutex::new(Transcript::new(metadata))),
            max_events: None,
        }
    }

    /// Stop recording once `count` events are stored.
    #[must_use]
    pub const fn with_max_events(mut self, count: usize) -> Self {
        self.max_events = Some(count);
        self
    }

    /// Time since the recorder was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn lock(&self) -> MutexGuard<'_, Transcript> {
        // A panic while holding the lock cannot leave a Vec push half done.
        self.transcript
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn push(&self, event: TranscriptEvent) {
        let mut transcript = self.lock();
        if self.max_events.is_some_and(|max| transcript.events.len() >= max) {
            return;
        }
        transcript.push(event);
    }

    /// Number of recorded events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.lock().events.len()
    }

    /// A copy of the transcript so far.
    #[must_use]
    pub fn snapshot(&self) -> Transcript {
        self.lock().clone()
    }

    /// Write the transcript so far as newline-delimited JSON.
    pub fn write_ndjson<W: Write>(&self, writer: W) -> Result<()> {
        self.lock().write_ndjson(writer)
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new(TranscriptMetadata::now())
    }
}

impl TranscriptSink for Recorder {
    fn on_output(&mut self, data: &[u8]) {
        self.push(TranscriptEvent::output(self.elapsed(), data));
    }

    fn on_input(&mut self, data: &[u8]) {
        self.push(TranscriptEvent::input(self.elapsed(), data));
    }

    fn on_marker(&mut self, label: &str) {
        self.push(TranscriptEvent::marker(self.elapsed(), label));
    }
}
