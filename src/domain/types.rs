/// Core types and enums used throughout the domain layer
///
/// This module defines the fundamental types like Frequency, CompletionStatus,
/// and ID types that are used by Habit, Completion, and other domain entities.

use serde::{Deserialize, Serialize};
use chrono::{Datelike, NaiveDate, Weekday};
use uuid::Uuid;

/// Unique identifier for a habit
///
/// This is a wrapper around UUID to provide type safety - you can't accidentally
/// pass a habit ID where a completion ID is expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HabitId(pub Uuid);

impl HabitId {
    /// Generate a new random habit ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a habit ID from a string (useful for database loading)
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for HabitId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HabitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier for a completion record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompletionId(pub Uuid);

impl CompletionId {
    /// Generate a new random completion ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a completion ID from a string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for CompletionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CompletionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of the user a row belongs to
///
/// The remote collections are partitioned by user, so every synced row
/// carries one of these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// How often a habit should be performed
///
/// The frequency determines which calendar days a habit is active on,
/// which in turn drives day aggregation and streak counting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    /// Every single day
    Daily,
    /// Specific days of the week (e.g., Monday, Wednesday, Friday)
    Weekly(Vec<Weekday>),
}

impl Frequency {
    /// Validate that a frequency value is reasonable
    pub fn validate(&self) -> Result<(), crate::domain::DomainError> {
        match self {
            Frequency::Weekly(days) => {
                if days.is_empty() {
                    return Err(crate::domain::DomainError::InvalidFrequency(
                        "Weekly frequency must specify at least one day".to_string(),
                    ));
                }
                if days.len() > 7 {
                    return Err(crate::domain::DomainError::InvalidFrequency(
                        "Weekly frequency cannot have more than 7 days".to_string(),
                    ));
                }
                Ok(())
            }
            Frequency::Daily => Ok(()),
        }
    }

    /// Check if this frequency schedules the habit on a given date
    pub fn is_scheduled_for(&self, date: NaiveDate) -> bool {
        match self {
            Frequency::Daily => true,
            Frequency::Weekly(days) => days.contains(&date.weekday()),
        }
    }
}

/// Progress state of a completion on one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    NotStarted,
    InProgress,
    Completed,
    Skipped,
}

impl CompletionStatus {
    /// Completed and explicitly skipped days both count toward streaks
    pub fn counts_as_done(&self) -> bool {
        matches!(self, CompletionStatus::Completed | CompletionStatus::Skipped)
    }

    /// Stable string form used by the storage layer
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionStatus::NotStarted => "not_started",
            CompletionStatus::InProgress => "in_progress",
            CompletionStatus::Completed => "completed",
            CompletionStatus::Skipped => "skipped",
        }
    }

    /// Parse the storage-layer string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(CompletionStatus::NotStarted),
            "in_progress" => Some(CompletionStatus::InProgress),
            "completed" => Some(CompletionStatus::Completed),
            "skipped" => Some(CompletionStatus::Skipped),
            _ => None,
        }
    }
}

/// Optional numeric target for a habit (e.g., 30 minutes, 8 glasses)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub target_value: f64,
    pub unit: String,
}

/// The kinds of progress tick a caller can apply to a habit/day
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToggleAction {
    /// Advance by one step (or clear, if already done)
    Toggle,
    /// Set progress to an explicit value, clamped to the target
    SetValue(f64),
    /// Mark the day as skipped, or un-skip it
    ToggleSkip,
    /// Jump straight to complete, or clear if already complete
    ToggleComplete,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_weekly_frequency_requires_days() {
        assert!(Frequency::Weekly(vec![]).validate().is_err());
        assert!(Frequency::Weekly(vec![Weekday::Mon]).validate().is_ok());
        assert!(Frequency::Daily.validate().is_ok());
    }

    #[test]
    fn test_weekly_schedule_matches_weekday() {
        let freq = Frequency::Weekly(vec![Weekday::Mon, Weekday::Fri]);
        // 2024-01-01 is a Monday
        let monday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(freq.is_scheduled_for(monday));
        assert!(!freq.is_scheduled_for(monday + chrono::Duration::days(1)));
        assert!(freq.is_scheduled_for(monday + chrono::Duration::days(4)));
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            CompletionStatus::NotStarted,
            CompletionStatus::InProgress,
            CompletionStatus::Completed,
            CompletionStatus::Skipped,
        ] {
            assert_eq!(CompletionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CompletionStatus::parse("bogus"), None);
    }

    #[test]
    fn test_done_statuses() {
        assert!(CompletionStatus::Completed.counts_as_done());
        assert!(CompletionStatus::Skipped.counts_as_done());
        assert!(!CompletionStatus::InProgress.counts_as_done());
        assert!(!CompletionStatus::NotStarted.counts_as_done());
    }
}
