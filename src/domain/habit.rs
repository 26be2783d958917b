/// Habit entity and related functionality
///
/// This module defines the core Habit struct, the draft/patch types used by
/// the mutation engine, validation rules, and the active-day predicate the
/// derived-state engine is built on.

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use crate::domain::{dates, DomainError, Frequency, Goal, HabitId, UserId};

/// Upper bound on how far past today a recompute range may extend
///
/// An open-ended or far-future end date must not turn a single mutation into
/// an unbounded cache rebuild.
pub const RECOMPUTE_HORIZON_DAYS: i64 = 366;

/// A recurring or one-off tracked activity
///
/// This is the core entity in the system. A habit is "active" on a calendar
/// day when its start/end range and frequency schedule include that day; only
/// active habits participate in day aggregation and streak counting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    /// Unique identifier for this habit
    pub id: HabitId,
    /// Owner; remote collections are partitioned by this
    pub user_id: UserId,
    /// Display name (e.g., "Morning Run", "Read for 30min")
    pub name: String,
    /// Which calendar days this habit is scheduled on
    pub frequency: Frequency,
    /// First day the habit is tracked (inclusive)
    pub start_date: NaiveDate,
    /// Last day the habit is tracked (inclusive); absent means open-ended
    pub end_date: Option<NaiveDate>,
    /// Optional numeric target; when absent, `completions_per_day` defines
    /// the multi-tick target
    pub goal: Option<Goal>,
    /// Number of ticks that complete a day when there is no goal
    pub completions_per_day: u32,
    /// Whether this habit currently participates in derived computations
    pub is_active: bool,
    /// Display ordering only; never interpreted by the engine
    pub sort_order: i64,
    /// Display metadata surfaced at the widget boundary
    pub icon: Option<String>,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a habit
///
/// The mutation engine fills in the id, owner, sort order and timestamps.
#[derive(Debug, Clone)]
pub struct HabitDraft {
    pub name: String,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub goal: Option<Goal>,
    pub completions_per_day: u32,
    pub icon: Option<String>,
    pub color: Option<String>,
}

impl HabitDraft {
    /// A minimal daily habit starting on `start_date`
    pub fn daily(name: impl Into<String>, start_date: NaiveDate) -> Self {
        Self {
            name: name.into(),
            frequency: Frequency::Daily,
            start_date,
            end_date: None,
            goal: None,
            completions_per_day: 1,
            icon: None,
            color: None,
        }
    }
}

/// Partial update applied to an existing habit
///
/// `None` leaves a field untouched; the double-`Option` fields distinguish
/// "don't touch" from "clear".
#[derive(Debug, Clone, Default)]
pub struct HabitPatch {
    pub name: Option<String>,
    pub frequency: Option<Frequency>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<Option<NaiveDate>>,
    pub goal: Option<Option<Goal>>,
    pub completions_per_day: Option<u32>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i64>,
    pub icon: Option<Option<String>>,
    pub color: Option<Option<String>>,
}

impl Habit {
    /// Create a new habit with validation
    pub fn new(user_id: UserId, draft: HabitDraft, sort_order: i64) -> Result<Self, DomainError> {
        Self::validate_name(&draft.name)?;
        draft.frequency.validate()?;
        Self::validate_dates(draft.start_date, draft.end_date)?;
        Self::validate_target(&draft.goal, draft.completions_per_day)?;

        let now = Utc::now();
        Ok(Self {
            id: HabitId::new(),
            user_id,
            name: draft.name,
            frequency: draft.frequency,
            start_date: draft.start_date,
            end_date: draft.end_date,
            goal: draft.goal,
            completions_per_day: draft.completions_per_day,
            is_active: true,
            sort_order,
            icon: draft.icon,
            color: draft.color,
            created_at: now,
            updated_at: now,
        })
    }

    /// Merge a partial update into this habit, with validation
    ///
    /// Validates the would-be result before applying anything, so a rejected
    /// patch leaves the habit unchanged. Bumps `updated_at` on success.
    pub fn apply_patch(&mut self, patch: HabitPatch) -> Result<(), DomainError> {
        if let Some(ref name) = patch.name {
            Self::validate_name(name)?;
        }
        if let Some(ref frequency) = patch.frequency {
            frequency.validate()?;
        }
        let new_start = patch.start_date.unwrap_or(self.start_date);
        let new_end = patch.end_date.clone().unwrap_or(self.end_date);
        Self::validate_dates(new_start, new_end)?;
        let new_goal = patch.goal.clone().unwrap_or_else(|| self.goal.clone());
        let new_per_day = patch.completions_per_day.unwrap_or(self.completions_per_day);
        Self::validate_target(&new_goal, new_per_day)?;

        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(frequency) = patch.frequency {
            self.frequency = frequency;
        }
        self.start_date = new_start;
        self.end_date = new_end;
        self.goal = new_goal;
        self.completions_per_day = new_per_day;
        if let Some(is_active) = patch.is_active {
            self.is_active = is_active;
        }
        if let Some(sort_order) = patch.sort_order {
            self.sort_order = sort_order;
        }
        if let Some(icon) = patch.icon {
            self.icon = icon;
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Whether this habit is active on the given calendar day
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.is_active
            && date >= self.start_date
            && self.end_date.map_or(true, |end| date <= end)
            && self.frequency.is_scheduled_for(date)
    }

    /// The per-day value at which a completion counts as finished
    pub fn target_value(&self) -> f64 {
        match &self.goal {
            Some(goal) => goal.target_value,
            None => f64::from(self.completions_per_day.max(1)),
        }
    }

    /// Every calendar day whose cached status this habit can influence
    ///
    /// Runs from the start date through the end date (or today, if
    /// open-ended), clamped to the recompute horizon.
    pub fn affected_range(&self, today: NaiveDate) -> Vec<NaiveDate> {
        let horizon = today + Duration::days(RECOMPUTE_HORIZON_DAYS);
        let end = self.end_date.unwrap_or(today).min(horizon);
        dates::days_between(self.start_date, end)
    }

    /// Days influenced by creating this habit: today through the effective end
    pub fn forward_range(&self, today: NaiveDate) -> Vec<NaiveDate> {
        let horizon = today + Duration::days(RECOMPUTE_HORIZON_DAYS);
        let end = self.end_date.unwrap_or(today).min(horizon);
        dates::days_between(today, end)
    }

    fn validate_name(name: &str) -> Result<(), DomainError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidHabitName(
                "Habit name cannot be empty".to_string(),
            ));
        }
        if trimmed.len() > 100 {
            return Err(DomainError::InvalidHabitName(
                "Habit name cannot be longer than 100 characters".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_dates(start: NaiveDate, end: Option<NaiveDate>) -> Result<(), DomainError> {
        if let Some(end) = end {
            if start > end {
                return Err(DomainError::InvalidDate(format!(
                    "Start date {} is after end date {}",
                    start, end
                )));
            }
        }
        Ok(())
    }

    fn validate_target(goal: &Option<Goal>, completions_per_day: u32) -> Result<(), DomainError> {
        if let Some(goal) = goal {
            if !goal.target_value.is_finite() || goal.target_value <= 0.0 {
                return Err(DomainError::InvalidValue {
                    message: "Goal target must be a positive number".to_string(),
                });
            }
            if goal.unit.trim().is_empty() {
                return Err(DomainError::InvalidValue {
                    message: "Goal unit cannot be empty".to_string(),
                });
            }
        } else if completions_per_day == 0 {
            return Err(DomainError::InvalidValue {
                message: "Completions per day must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
