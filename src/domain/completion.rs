/// Completion entity and the pure progress-tick transition
///
/// A Completion records progress toward one habit on one calendar day. The
/// toggle transition below is the single source of truth for how a tick moves
/// a day between statuses; the mutation engine and the tests both call it.

use serde::{Deserialize, Serialize};
use chrono::{DateTime, NaiveDate, Utc};
use crate::domain::{CompletionId, CompletionStatus, Habit, HabitId, ToggleAction, UserId};

/// Progress toward a habit on one calendar day
///
/// At most one completion per `(habit_id, completion_date)` is meaningful;
/// the mutation engine looks the pair up before creating a new row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub id: CompletionId,
    /// Owning habit; a completion without a matching habit is orphaned and
    /// ignored by all derived computations
    pub habit_id: HabitId,
    /// Which day this progress is for (a calendar day, not an instant)
    pub completion_date: NaiveDate,
    pub status: CompletionStatus,
    /// Numeric progress, >= 0
    pub value: f64,
    pub user_id: UserId,
    pub updated_at: DateTime<Utc>,
}

impl Completion {
    /// Create a fresh completion row for a habit/day
    pub fn new(
        habit_id: HabitId,
        user_id: UserId,
        completion_date: NaiveDate,
        status: CompletionStatus,
        value: f64,
    ) -> Self {
        Self {
            id: CompletionId::new(),
            habit_id,
            completion_date,
            status,
            value: value.max(0.0),
            user_id,
            updated_at: Utc::now(),
        }
    }
}

/// Result of applying a toggle action: the new progress value and status
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToggleOutcome {
    pub value: f64,
    pub status: CompletionStatus,
}

/// Compute the next `(value, status)` for a habit/day given a tick
///
/// Pure and deterministic: no clock, no storage, no side effects. `existing`
/// is the completion currently recorded for the day, if any.
pub fn apply_toggle(
    habit: &Habit,
    existing: Option<&Completion>,
    action: ToggleAction,
) -> ToggleOutcome {
    let max_value = habit.target_value();
    let step_size = match &habit.goal {
        Some(goal) => (goal.target_value * 0.1).max(1.0),
        None => 1.0,
    };
    let current = existing.map_or(0.0, |c| c.value);
    let status0 = existing.map_or(CompletionStatus::NotStarted, |c| c.status);

    let new_value = match action {
        ToggleAction::Toggle => match status0 {
            CompletionStatus::NotStarted => {
                if max_value == 1.0 {
                    1.0
                } else {
                    step_size
                }
            }
            CompletionStatus::InProgress => (current + step_size).min(max_value),
            _ => 0.0,
        },
        ToggleAction::SetValue(v) => v.clamp(0.0, max_value),
        ToggleAction::ToggleSkip => 0.0,
        ToggleAction::ToggleComplete => {
            if status0 == CompletionStatus::Completed {
                0.0
            } else {
                max_value
            }
        }
    };

    let status = match action {
        // Skipping toggles between Skipped and a clean slate
        ToggleAction::ToggleSkip => {
            if status0 == CompletionStatus::Skipped {
                CompletionStatus::NotStarted
            } else {
                CompletionStatus::Skipped
            }
        }
        _ => {
            if new_value >= max_value {
                CompletionStatus::Completed
            } else if new_value > 0.0 {
                CompletionStatus::InProgress
            } else {
                CompletionStatus::NotStarted
            }
        }
    };

    ToggleOutcome {
        value: new_value,
        status,
    }
}
