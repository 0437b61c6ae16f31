//! Conversations, their messages, and the durable store they live in.
//!
//! The on-disk record is a single JSON array of conversations using the
//! field names `name`, `messages`, `text`, `type` (`req`/`res`) and
//! `timestamp` (epoch milliseconds).

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const APP_DIR: &str = "mistral-chat";
const HISTORY_FILE: &str = "chatHistory.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "req")]
    Request,
    #[serde(rename = "res")]
    Response,
}

/// One chat message. Immutable once created.
///
/// `created_at` is kept at millisecond precision, the precision it is stored with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    text: String,
    #[serde(rename = "type")]
    kind: MessageKind,
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(text: impl Into<String>, kind: MessageKind, created_at: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            kind,
            created_at: created_at.trunc_subsecs(3),
        }
    }

    pub fn request(text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self::new(text, MessageKind::Request, created_at)
    }

    pub fn response(text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self::new(text, MessageKind::Response, created_at)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(rename = "name")]
    display_name: String,
    #[serde(default)]
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(display_name: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            display_name: display_name.into(),
            messages,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.display_name = name.into();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Appends one request/response pair. Messages are never edited or reordered.
    pub fn push_turn(&mut self, request: Message, response: Message) {
        self.messages.push(request);
        self.messages.push(response);
    }
}

/// All past conversations, oldest first.
pub type History = Vec<Conversation>;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize chat history: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persistence port for the chat history.
///
/// `load` never fails: a missing or unreadable record is an empty history.
/// `save` overwrites the whole record with the given snapshot.
pub trait HistoryStore {
    fn load(&self) -> History;
    fn save(&self, history: &[Conversation]) -> Result<(), HistoryError>;
}

/// Default location of the history file under the platform data directory.
pub fn default_history_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(HISTORY_FILE)
}

/// History kept as one JSON file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, operation: &'static str, source: std::io::Error) -> HistoryError {
        HistoryError::Io {
            operation,
            path: self.path.clone(),
            source,
        }
    }
}

impl HistoryStore for JsonFileStore {
    fn load(&self) -> History {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no chat history at {}, starting empty", self.path.display());
                return History::new();
            }
            Err(e) => {
                warn!("could not read chat history at {}: {e}", self.path.display());
                return History::new();
            }
        };

        parse_history(&raw).unwrap_or_else(|e| {
            warn!("ignoring malformed chat history at {}: {e}", self.path.display());
            History::new()
        })
    }

    fn save(&self, history: &[Conversation]) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error("creating directory", e))?;
        }

        let json = serde_json::to_string_pretty(history)?;

        // Atomic replace.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| self.io_error("writing", e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error("replacing", e))?;

        debug!(
            conversations = history.len(),
            "saved chat history to {}",
            self.path.display()
        );
        Ok(())
    }
}

/// A blank record reads as an empty history, same as a missing one.
fn parse_history(raw: &str) -> Result<History, serde_json::Error> {
    if raw.trim().is_empty() || raw.trim() == "null" {
        return Ok(History::new());
    }
    serde_json::from_str(raw)
}

#[cfg(test)]
pub use memory::MemoryStore;
