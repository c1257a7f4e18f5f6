use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MailError, Result};

/// One processed message as persisted in the email store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecord {
    pub id: String,
    pub thread_id: String,
    pub sender: String,
    pub subject: String,
    /// Milliseconds since the Unix epoch; written as a JSON string
    #[serde(with = "timestamp_string")]
    pub timestamp: i64,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub replied: bool,
    #[serde(default)]
    pub draft: Option<String>,
}

impl EmailRecord {
    /// Build a record for a freshly fetched message with no AI fields yet
    pub fn from_fetched(message: FetchedMessage) -> Self {
        Self {
            id: message.id,
            thread_id: message.thread_id,
            sender: message.sender,
            subject: message.subject,
            timestamp: message.timestamp,
            body: message.body,
            summary: None,
            replied: false,
            draft: None,
        }
    }

    /// Text handed to the draft generator: the body, or the subject when the body is blank
    pub fn generation_input(&self) -> &str {
        generation_input(&self.body, &self.subject)
    }

    /// True when the record has no usable draft
    pub fn needs_draft(&self) -> bool {
        self.draft.as_deref().map_or(true, str::is_empty)
    }

    /// Flag the record as replied and drop any stale draft
    pub fn mark_replied(&mut self) {
        self.replied = true;
        self.draft = Some(String::new());
    }

    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// A message as returned by the mail gateway, before reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedMessage {
    pub id: String,
    pub thread_id: String,
    pub sender: String,
    pub subject: String,
    #[serde(with = "timestamp_string")]
    pub timestamp: i64,
    pub body: String,
}

impl FetchedMessage {
    pub fn generation_input(&self) -> &str {
        generation_input(&self.body, &self.subject)
    }
}

fn generation_input<'a>(body: &'a str, subject: &'a str) -> &'a str {
    if body.trim().is_empty() {
        subject
    } else {
        body
    }
}

/// Result of one call to the draft generator
///
/// Failures never surface as errors; they carry an empty `text` and a
/// description in `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Generation {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            text: String::new(),
            success: false,
            error: Some(error.to_string()),
        }
    }

    /// Generated text, or an empty string when generation failed
    pub fn into_text(self) -> String {
        if self.success {
            self.text
        } else {
            String::new()
        }
    }
}

/// Boundary shape returned by every public operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Outcome<T> {
    pub fn ok(payload: T) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(error.to_string()),
        }
    }
}

impl<T> From<Result<T>> for Outcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(payload) => Outcome::ok(payload),
            Err(e) => Outcome::failed(e),
        }
    }
}

/// Persisted document shape: `{ "emails": [...] }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailDocument {
    #[serde(default)]
    pub emails: Vec<EmailRecord>,
}

/// Reject a batch of ids in which one repeats
pub fn ensure_unique_ids<'a>(ids: impl IntoIterator<Item = &'a str>) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(MailError::DuplicateId(id.to_string()));
        }
    }
    Ok(())
}

/// Serde adapter for Gmail's `internalDate`: milliseconds as a decimal string.
///
/// Deserialization also accepts a bare JSON number.
pub mod timestamp_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &i64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(n),
            Raw::Text(s) if s.trim().is_empty() => Ok(0),
            Raw::Text(s) => s.trim().parse::<i64>().map_err(de::Error::custom),
        }
    }
}
