//! Validated value types shared across LERS crates.
//!
//! These types exist so that "already validated" data carries its guarantee in
//! the type system instead of being re-checked at every layer.

use std::str::FromStr;

/// Longest text accepted after trimming, in bytes.
///
/// Exam types and patient names are short labels; anything longer is a
/// malformed submission, not data worth storing.
pub const MAX_TEXT_LEN: usize = 255;

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The trimmed input exceeded [`MAX_TEXT_LEN`] bytes
    #[error("Text cannot exceed {MAX_TEXT_LEN} characters")]
    TooLong,
}

/// A string type that guarantees non-empty, bounded content.
///
/// Wraps a `String` and ensures it contains at least one non-whitespace
/// character and at most [`MAX_TEXT_LEN`] bytes. The input is trimmed of
/// leading and trailing whitespace during construction, so an `exam_type` of
/// `"  "` can never reach storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace before the
    /// bounds are checked.
    ///
    /// # Errors
    ///
    /// Returns `TextError::Empty` if the trimmed input is empty, or
    /// `TextError::TooLong` if it exceeds [`MAX_TEXT_LEN`] bytes.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        if trimmed.len() > MAX_TEXT_LEN {
            return Err(TextError::TooLong);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Error returned when parsing an unknown exam result status.
#[derive(Debug, thiserror::Error)]
#[error("unknown exam status: {0} (expected 'pending' or 'finalized')")]
pub struct StatusParseError(pub String);

/// Lifecycle state of an exam result.
///
/// A result is created either already `Finalized` (the common case for a lab
/// submitting completed work) or `Pending` when the payload is incomplete.
/// The only legal transition is `Pending` → `Finalized`; a finalized result is
/// immutable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ExamStatus {
    Pending,
    Finalized,
}

impl ExamStatus {
    /// Canonical lowercase wire/storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            ExamStatus::Pending => "pending",
            ExamStatus::Finalized => "finalized",
        }
    }

    /// All statuses, in lifecycle order. Used to zero-fill count responses.
    pub const ALL: [ExamStatus; 2] = [ExamStatus::Pending, ExamStatus::Finalized];
}

impl std::fmt::Display for ExamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExamStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExamStatus::Pending),
            "finalized" => Ok(ExamStatus::Finalized),
            other => Err(StatusParseError(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_input() {
        let text = NonEmptyText::new("  Blood panel  ").unwrap();
        assert_eq!(text.as_str(), "Blood panel");
    }

    #[test]
    fn non_empty_text_rejects_whitespace_only() {
        assert!(NonEmptyText::new("   ").is_err());
        assert!(NonEmptyText::new("").is_err());
    }

    #[test]
    fn non_empty_text_rejects_overlong_input() {
        assert!(NonEmptyText::new("x".repeat(MAX_TEXT_LEN + 1)).is_err());
        assert!(NonEmptyText::new("x".repeat(MAX_TEXT_LEN)).is_ok());
        // Trimming happens before the bound is checked.
        let padded = format!("  {}  ", "x".repeat(MAX_TEXT_LEN));
        assert!(NonEmptyText::new(padded).is_ok());
    }

    #[test]
    fn non_empty_text_deserialize_rejects_empty() {
        let result: Result<NonEmptyText, _> = serde_json::from_str("\"  \"");
        assert!(result.is_err());
    }

    #[test]
    fn exam_status_round_trips_through_str() {
        for status in ExamStatus::ALL {
            assert_eq!(status.as_str().parse::<ExamStatus>().unwrap(), status);
        }
    }

    #[test]
    fn exam_status_rejects_unknown_value() {
        assert!("scheduled".parse::<ExamStatus>().is_err());
    }

    #[test]
    fn exam_status_serde_uses_lowercase() {
        assert_eq!(
            serde_json::to_string(&ExamStatus::Finalized).unwrap(),
            "\"finalized\""
        );
    }
}
