//! Transcript format definitions.
//!
//! Transcripts serialize as newline-delimited JSON: one metadata line, then
//! one line per event.

use std::io::{BufRead, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DriverError, Result};

/// What a transcript event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Output from the child.
    Output,
    /// Input sent to the child.
    Input,
    /// Annotation added by the driver, such as a step name.
    Marker,
}

/// A transcript event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    /// Seconds since recording started.
    #[serde(rename = "time", with = "seconds")]
    pub timestamp: Duration,
    /// Event kind.
    pub kind: EventKind,
    /// Event text. Output is decoded lossily.
    pub data: String,
}

impl TranscriptEvent {
    /// Create an output event.
    #[must_use]
    pub fn output(timestamp: Duration, data: &[u8]) -> Self {
        Self {
            timestamp,
            kind: EventKind::Output,
            data: String::from_utf8_lossy(data).into_owned(),
        }
    }

    /// Create an input event.
    #[must_use]
    pub fn input(timestamp: Duration, data: &[u8]) -> Self {
        Self {
            timestamp,
            kind: EventKind::Input,
            data: String::from_utf8_lossy(data).into_owned(),
        }
    }

    /// Create a marker event.
    #[must_use]
    pub fn marker(timestamp: Duration, label: &str) -> Self {
        Self {
            timestamp,
            kind: EventKind::Marker,
            data: label.to_string(),
        }
    }
}

/// Transcript metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMetadata {
    /// Command that was run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Title for the transcript.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Unix time recording started, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
}

impl TranscriptMetadata {
    /// Metadata stamped with the current time.
    #[must_use]
    pub fn now() -> Self {
        let started_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs());
        Self {
            started_at,
            ..Default::default()
        }
    }

    /// Set the command.
    #[must_use]
    pub fn with_command(mut self, cmd: impl Into<String>) -> Self {
        self.command = Some(cmd.into());
        self
    }

    /// Set the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// A complete transcript.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    /// Metadata.
    pub metadata: TranscriptMetadata,
    /// Events in recording order.
    pub events: Vec<TranscriptEvent>,
}

impl Transcript {
    /// Create a new transcript.
    #[must_use]
    pub const fn new(metadata: TranscriptMetadata) -> Self {
        Self {
            metadata,
            events: Vec::new(),
        }
    }

    /// Add an event.
    pub fn push(&mut self, event: TranscriptEvent) {
        self.events.push(event);
    }

    /// Time of the last event.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.events.last().map_or(Duration::ZERO, |e| e.timestamp)
    }

    /// All output, concatenated.
    #[must_use]
    pub fn output_text(&self) -> String {
        self.text_of(EventKind::Output)
    }

    /// All input, concatenated.
    #[must_use]
    pub fn input_text(&self) -> String {
        self.text_of(EventKind::Input)
    }

    /// Marker labels in order.
    #[must_use]
    pub fn markers(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter(|e| e.kind == EventKind::Marker)
            .map(|e| e.data.as_str())
            .collect()
    }

    fn text_of(&self, kind: EventKind) -> String {
        self.events
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.data.as_str())
            .collect()
    }

    /// Write the transcript as newline-delimited JSON.
    pub fn write_ndjson<W: Write>(&self, mut writer: W) -> Result<()> {
        write_line(&mut writer, &self.metadata)?;
        for event in &self.events {
            write_line(&mut writer, event)?;
        }
        Ok(())
    }

    /// Read a transcript written by [`Transcript::write_ndjson`].
    pub fn read_ndjson<R: BufRead>(reader: R) -> Result<Self> {
        let mut lines = reader.lines();
        let metadata = match lines.next() {
            Some(line) => {
                parse_line(&line.map_err(|e| DriverError::io_context("reading transcript", e))?)?
            }
            None => return Err(DriverError::config("transcript is empty")),
        };

        let mut transcript = Self::new(metadata);
        for line in lines {
            let line = line.map_err(|e| DriverError::io_context("reading transcript", e))?;
            if line.trim().is_empty() {
                continue;
            }
            transcript.push(parse_line(&line)?);
        }
        Ok(transcript)
    }
}

fn parse_line<T: serde::de::DeserializeOwned>(line: &str) -> Result<T> {
    serde_json::from_str(line)
        .map_err(|e| DriverError::config(format!("malformed transcript line: {e}")))
}

fn write_line<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *writer, value)
        .map_err(|e| DriverError::io_context("writing transcript", e.into()))?;
    writer
        .write_all(b"\n")
        .map_err(|e| DriverError::io_context("writing transcript", e))
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
