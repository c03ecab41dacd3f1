//! Bounded text buffer for accumulated child output.
//!
//! Output arrives as raw byte chunks that may split a multi-byte UTF-8
//! sequence. The buffer decodes incrementally, holding an incomplete trailing
//! sequence back until the rest arrives, so match positions always fall on
//! character boundaries of the stored text.

use std::fmt;

/// Default buffer capacity (1 MB).
pub const DEFAULT_CAPACITY: usize = 1024 * 1024;

/// A bounded buffer of decoded terminal output.
///
/// When the text exceeds the maximum size, the oldest characters are
/// discarded.
#[derive(Clone)]
pub struct RingBuffer {
    text: String,
    pending: Vec<u8>,
    max_size: usize,
    total_written: usize,
    bytes_discarded: usize,
}

impl RingBuffer {
    /// Create a new buffer with the specified maximum size in bytes.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            text: String::with_capacity(max_size.min(4096)),
            pending: Vec::new(),
            max_size: max_size.max(1),
            total_written: 0,
            bytes_discarded: 0,
        }
    }

    /// Append raw output.
    ///
    /// Invalid sequences become U+FFFD. An incomplete sequence at the end of
    /// `data` is held until the next append.
    pub fn append(&mut self, data: &[u8]) {
        self.total_written += data.len();
        self.pending.extend_from_slice(data);

        let mut consumed = 0;
        loop {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    consumed = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid_up_to = consumed + e.valid_up_to();
                    self.text
                        .push_str(&String::from_utf8_lossy(&self.pending[consumed..valid_up_to]));
                    match e.error_len() {
                        Some(len) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            consumed = valid_up_to + len;
                        }
                        None => {
                            consumed = valid_up_to;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..consumed);
        self.enforce_limit();
    }

    /// Decode any held-back partial sequence. Called once output has ended.
    pub fn flush_pending(&mut self) {
        if !self.pending.is_empty() {
            self.text.push_str(&String::from_utf8_lossy(&self.pending));
            self.pending.clear();
            self.enforce_limit();
        }
    }

    fn enforce_limit(&mut self) {
        if self.text.len() <= self.max_size {
            return;
        }
        let mut cut = self.text.len() - self.max_size;
        while !self.text.is_char_boundary(cut) {
            cut += 1;
        }
        self.text.drain(..cut);
        self.bytes_discarded += cut;
    }

    /// The buffered text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Length of the buffered text in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Check if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Get the maximum size of the buffer.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Total bytes appended over the buffer's lifetime.
    #[must_use]
    pub const fn total_written(&self) -> usize {
        self.total_written
    }

    /// Bytes discarded because the buffer was full.
    #[must_use]
    pub const fn bytes_discarded(&self) -> usize {
        self.bytes_discarded
    }

    /// Clear the buffer, including any held-back partial sequence.
    pub fn clear(&mut self) {
        self.text.clear();
        self.pending.clear();
    }

    /// Remove and return the text before byte offset `end`.
    ///
    /// `end` must lie on a character boundary.
    pub fn consume(&mut self, end: usize) -> String {
        let end = end.min(self.text.len());
        self.text.drain(..end).collect()
    }

    /// Remove and return everything buffered.
    pub fn take_all(&mut self) -> String {
        std::mem::take(&mut self.text)
    }

    /// The last `n` bytes of text, widened to a character boundary.
    #[must_use]
    pub fn tail(&self, n: usize) -> &str {
        let mut start = self.text.len().saturating_sub(n);
        while !self.text.is_char_boundary(start) {
            start += 1;
        }
        &self.text[start..]
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("len", &self.text.len())
            .field("pending", &self.pending.len())
            .field("max_size", &self.max_size)
            .finish()
    }
}
