use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Request priority. Lower value = higher urgency.
///
/// Declaration order matters: the derived `Ord` puts `High` before `Medium`
/// before `Low`, which is exactly the dequeue order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase", try_from = "PriorityRepr")]
pub enum Priority {
    High = 1,
    #[default]
    Medium = 2,
    Low = 3,
}

impl Priority {
    /// Numeric level as accepted on the wire (1 = high, 3 = low).
    #[must_use]
    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsePriorityError {
    #[error("unknown priority `{0}`, expected one of high, medium, low")]
    UnknownName(String),
    #[error("unknown priority level {0}, expected 1 (high), 2 (medium) or 3 (low)")]
    UnknownLevel(i64),
}

impl FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            _ => Err(ParsePriorityError::UnknownName(s.to_string())),
        }
    }
}

impl TryFrom<i64> for Priority {
    type Error = ParsePriorityError;

    fn try_from(level: i64) -> Result<Self, Self::Error> {
        match level {
            1 => Ok(Priority::High),
            2 => Ok(Priority::Medium),
            3 => Ok(Priority::Low),
            other => Err(ParsePriorityError::UnknownLevel(other)),
        }
    }
}

/// Wire forms accepted for `priority`: a case-insensitive name or a level.
#[derive(Deserialize)]
#[serde(untagged)]
enum PriorityRepr {
    Name(String),
    Level(i64),
}

impl TryFrom<PriorityRepr> for Priority {
    type Error = ParsePriorityError;

    fn try_from(repr: PriorityRepr) -> Result<Self, Self::Error> {
        match repr {
            PriorityRepr::Name(name) => name.parse(),
            PriorityRepr::Level(level) => Priority::try_from(level),
        }
    }
}

/// Incoming inference request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// Model identifier
    pub model_id: String,

    /// Input prompt
    pub prompt: String,

    /// Request priority (defaults to medium)
    #[serde(default)]
    pub priority: Priority,

    /// Client-provided request ID. Generated at dispatch when absent.
    #[serde(default)]
    pub request_id: Option<String>,
}

impl InferenceRequest {
    pub fn new(model_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            prompt: prompt.into(),
            priority: Priority::default(),
            request_id: None,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}
