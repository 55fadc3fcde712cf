//! Entry and pending-mutation types shared by the store, queue and sync engine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Date format used for `Entry::date` on the wire and in storage.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Identifier assigned by the remote authority.
pub type EntryId = i64;

/// A purchase/consumption record confirmed by the remote authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
  pub id: EntryId,
  pub item: String,
  pub price: f64,
  /// Calendar date, `YYYY-MM-DD`
  pub date: String,
  #[serde(default)]
  pub note: Option<String>,
}

impl Entry {
  pub fn from_data(id: EntryId, data: EntryData) -> Self {
    Self {
      id,
      item: data.item,
      price: data.price,
      date: data.date,
      note: data.note,
    }
  }

  /// The editable fields of this entry.
  pub fn data(&self) -> EntryData {
    EntryData {
      item: self.item.clone(),
      price: self.price,
      date: self.date.clone(),
      note: self.note.clone(),
    }
  }
}

/// Entry fields without an id, used for add and edit payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryData {
  pub item: String,
  pub price: f64,
  pub date: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub note: Option<String>,
}

impl EntryData {
  pub fn new(item: impl Into<String>, price: f64, date: impl Into<String>) -> Self {
    Self {
      item: item.into(),
      price,
      date: date.into(),
      note: None,
    }
  }

  pub fn with_note(mut self, note: impl Into<String>) -> Self {
    self.note = Some(note.into());
    self
  }

  /// Check the field constraints an entry must satisfy before it is queued.
  pub fn validate(&self) -> Result<(), QueueError> {
    if self.item.trim().is_empty() {
      return Err(QueueError::InvalidEntry("item must not be empty".to_string()));
    }

    if !self.price.is_finite() || self.price < 0.0 {
      return Err(QueueError::InvalidEntry(format!(
        "price must be a non-negative number, got {}",
        self.price
      )));
    }

    // chrono accepts unpadded fields, so pin the length as well
    if self.date.len() != 10 || NaiveDate::parse_from_str(&self.date, DATE_FORMAT).is_err() {
      return Err(QueueError::InvalidEntry(format!(
        "date must be YYYY-MM-DD, got '{}'",
        self.date
      )));
    }

    Ok(())
  }
}

/// The write a pending mutation will replay against the remote authority.
///
/// Serialized as `{"type": "add" | "edit" | "delete", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum MutationPayload {
  Add(EntryData),
  Edit { id: EntryId, data: EntryData },
  Delete { id: EntryId },
}

impl MutationPayload {
  /// Short name of the mutation type, as stored in the queue.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Add(_) => "add",
      Self::Edit { .. } => "edit",
      Self::Delete { .. } => "delete",
    }
  }

  /// The remote entry this mutation targets, if it already has one.
  pub fn target(&self) -> Option<EntryId> {
    match self {
      Self::Add(_) => None,
      Self::Edit { id, .. } | Self::Delete { id } => Some(*id),
    }
  }
}

/// A durably queued write intent, not yet acknowledged by the remote authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMutation {
  /// Client-generated key of the queue row (UUID v4), unrelated to entry ids
  pub id: String,
  #[serde(flatten)]
  pub payload: MutationPayload,
  /// Milliseconds since the epoch at creation; orders replay
  pub timestamp: i64,
}

impl PendingMutation {
  pub fn kind(&self) -> &'static str {
    self.payload.kind()
  }
}
