//! Full-output buffer with a line-aligned read cursor

/// Append-only output buffer plus the offset up to which output has been
/// handed out.
///
/// Retrieval only ever returns complete lines: a trailing line without a
/// newline stays in the buffer until it is terminated.
#[derive(Debug, Default, Clone)]
pub struct OutputBuffer {
    full: String,
    cursor: usize,
}

impl OutputBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a decoded chunk
    pub fn append(&mut self, chunk: &str) {
        self.full.push_str(chunk);
    }

    /// Everything received so far
    pub fn full_output(&self) -> &str {
        &self.full
    }

    /// Byte offset of the read cursor
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Total buffered bytes
    pub fn len(&self) -> usize {
        self.full.len()
    }

    /// Whether nothing has been received
    pub fn is_empty(&self) -> bool {
        self.full.is_empty()
    }

    /// Whether the cursor is behind the end of the buffer
    pub fn has_unretrieved(&self) -> bool {
        self.cursor < self.full.len()
    }

    /// Return the text between the cursor and the last newline, advancing the
    /// cursor past it. Empty (cursor untouched) when no newline is pending.
    pub fn take_unretrieved(&mut self) -> String {
        let pending = &self.full[self.cursor..];
        match pending.rfind('\n') {
            Some(index) => {
                let end = index + 1;
                let lines = pending[..end].to_string();
                self.cursor += end;
                lines
            }
            None => String::new(),
        }
    }
}
