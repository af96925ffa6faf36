//! ============================================================================
//! Memory Types - Data structures for long-term memory
//! ============================================================================
//! Defines the inbound memory document, stored records, search hits and
//! formatted recall results.
//! ============================================================================

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MemoryError;

/// Timestamp pattern for stored memories (microsecond precision)
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Day-level pattern used in recall output
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A memory as supplied by the persona system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryDoc {
    /// The memory text itself
    pub comment: String,
    /// Participant tags
    pub people: String,
    /// Emotion tags
    pub emotions: String,
    /// Local timestamp, `YYYY-MM-DDTHH:MM:SS.ffffff`
    pub datetime: String,
}

impl MemoryDoc {
    pub fn new(
        comment: impl Into<String>,
        people: impl Into<String>,
        emotions: impl Into<String>,
        datetime: impl Into<String>,
    ) -> Self {
        Self {
            comment: comment.into(),
            people: people.into(),
            emotions: emotions.into(),
            datetime: datetime.into(),
        }
    }

    /// Create a memory stamped with the current local time
    pub fn now(
        comment: impl Into<String>,
        people: impl Into<String>,
        emotions: impl Into<String>,
    ) -> Self {
        Self::at(comment, people, emotions, Local::now().naive_local())
    }

    /// Create a memory stamped with the given local time
    pub fn at(
        comment: impl Into<String>,
        people: impl Into<String>,
        emotions: impl Into<String>,
        when: NaiveDateTime,
    ) -> Self {
        Self::new(comment, people, emotions, format_datetime(&when))
    }

    /// Text that gets embedded for this memory: comment and people, no separator
    pub fn embedding_text(&self) -> String {
        format!("{}{}", self.comment, self.people)
    }

    /// Parse the stored timestamp
    pub fn parsed_datetime(&self) -> Result<NaiveDateTime, MemoryError> {
        parse_datetime(&self.datetime)
    }
}

/// A memory as held by the vector index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier, assigned at write time
    pub id: Uuid,
    /// Embedding of `doc.embedding_text()`
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub vector: Vec<f32>,
    /// Payload
    pub doc: MemoryDoc,
}

impl MemoryRecord {
    /// Create a record with a fresh identifier
    pub fn new(doc: MemoryDoc, vector: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            vector,
            doc,
        }
    }
}

/// Identifier of a stored point.
///
/// Records written here always carry a UUID; collections populated by other
/// writers may hold unsigned integer ids instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordId {
    Uuid(Uuid),
    Num(u64),
}

impl From<Uuid> for RecordId {
    fn from(id: Uuid) -> Self {
        Self::Uuid(id)
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uuid(id) => write!(f, "{}", id),
            Self::Num(n) => write!(f, "{}", n),
        }
    }
}

/// A single search hit
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub id: RecordId,
    /// Cosine similarity to the query
    pub score: f32,
    pub doc: MemoryDoc,
}

/// A deduplicated, day-level recall entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallResult {
    pub comment: String,
    /// `YYYY-MM-DD`
    pub date: String,
}

impl std::fmt::Display for RecallResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: on {}", self.comment, self.date)
    }
}

/// Parse a memory timestamp; the fractional part is optional
pub fn parse_datetime(value: &str) -> Result<NaiveDateTime, MemoryError> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").map_err(|e| {
        MemoryError::InvalidDatetime {
            value: value.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Format a timestamp the way memories are stored
pub fn format_datetime(when: &NaiveDateTime) -> String {
    when.format(DATETIME_FORMAT).to_string()
}
