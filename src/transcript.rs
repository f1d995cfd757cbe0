//! Conversation transcript: the ordered message list and its storage.
//!
//! Storage is injected so the chat state machine can be exercised without
//! touching the filesystem. The file store is deliberately tolerant: a
//! missing or corrupt transcript yields an empty log and a warning, never an
//! error.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Error,
}

/// One rendered chat entry. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

pub trait LogStore: Send {
    /// Load the persisted transcript. Absence and parse failures both yield
    /// an empty log.
    fn load(&self) -> Vec<Message>;

    /// Persist the full transcript. Best-effort; failures are logged.
    fn persist(&self, log: &[Message]);
}

/// Transcript persisted as a JSON array of `{type, content}` objects.
pub struct FileLogStore {
    path: PathBuf,
}

impl FileLogStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl LogStore for FileLogStore {
    fn load(&self) -> Vec<Message> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read transcript");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(log) => log,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "discarding corrupt transcript");
                Vec::new()
            }
        }
    }

    fn persist(&self, log: &[Message]) {
        if let Some(parent) = self.path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %err, "failed to create transcript dir");
                return;
            }
        }
        match serde_json::to_string(log) {
            Ok(raw) => {
                if let Err(err) = fs::write(&self.path, raw) {
                    warn!(path = %self.path.display(), error = %err, "failed to write transcript");
                }
            }
            Err(err) => warn!(error = %err, "failed to encode transcript"),
        }
    }
}

/// In-memory store for tests and embedding.
#[derive(Default)]
pub struct MemoryLogStore {
    inner: Mutex<Vec<Message>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.inner.lock().expect("store poisoned").clone()
    }
}

impl LogStore for MemoryLogStore {
    fn load(&self) -> Vec<Message> {
        self.snapshot()
    }

    fn persist(&self, log: &[Message]) {
        *self.inner.lock().expect("store poisoned") = log.to_vec();
    }
}
