//! Convenient re-exports for writing runbooks.
//!
//! ```ignore
//! use runbook::prelude::*;
//! ```

// Errors
pub use crate::error::{DriverError, Result, SpawnError};

// Sessions
pub use crate::config::{LineEnding, SessionConfig, SpawnMode};
pub use crate::interact::{InteractEnd, InteractOptions};
pub use crate::session::{Interrupt, InterruptTrigger, Session, SessionBuilder, interrupt_pair};

// Matching
pub use crate::expect::{Expectation, Pattern};
pub use crate::types::{ControlChar, Match, ProcessExitStatus, SessionState};

// Scraping
pub use crate::scrape::{find_pid, online_devices, shell_prompt_expectation};

// Transcripts
pub use crate::transcript::{ConsoleSink, FileSink, Recorder, TranscriptSink};

// Workflows
pub use crate::workflow::{Retry, Step, StepPolicy, Workflow, WorkflowReport};
