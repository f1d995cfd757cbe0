//! Submitted-input history with a clamped cursor.
//!
//! The cursor ranges over `[0, len]`; `len` means "composing a new message"
//! with an empty buffer.

/// Result of moving the history cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavOutcome {
    /// History is empty; nothing to do.
    Unchanged,
    /// Cursor is past the last entry: clear the composing buffer.
    Compose,
    /// Cursor landed on an entry: load it into the buffer.
    Recall(String),
}

#[derive(Debug, Default)]
pub struct InputHistory {
    entries: Vec<String>,
    cursor: usize,
}

impl InputHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a submitted string and reset the cursor to the composing slot.
    pub fn submit(&mut self, text: &str) {
        self.entries.push(text.to_string());
        self.cursor = self.entries.len();
    }

    /// Move the cursor by `direction` (-1 or +1), clamped to `[0, len]`.
    pub fn navigate(&mut self, direction: i32) -> NavOutcome {
        if self.entries.is_empty() {
            return NavOutcome::Unchanged;
        }
        let next = self.cursor as i64 + direction as i64;
        self.cursor = next.clamp(0, self.entries.len() as i64) as usize;
        if self.cursor == self.entries.len() {
            NavOutcome::Compose
        } else {
            NavOutcome::Recall(self.entries[self.cursor].clone())
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}
