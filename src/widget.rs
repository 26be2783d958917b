/// Read-only widget snapshot
///
/// After every mutation and reconciliation the engine pushes a small snapshot
/// to an external key-value sink for home-screen widgets: per habit, the last
/// seven days as ISO-date → completed booleans, plus display metadata. The
/// engine never reads this back.

use serde::{Deserialize, Serialize};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

use crate::domain::{dates, Completion, CompletionStatus, Habit, HabitId};

/// Days of history included in a snapshot
const SNAPSHOT_DAYS: i64 = 7;

/// One habit's row in the widget snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetHabit {
    pub id: HabitId,
    pub name: String,
    pub icon: Option<String>,
    pub color: Option<String>,
    /// ISO date -> true iff that day's progress ratio reached 1.0
    pub week: BTreeMap<String, bool>,
}

/// The full push-only snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetSnapshot {
    pub habits: Vec<WidgetHabit>,
}

/// External sink the snapshot is pushed to (write-only boundary)
pub trait WidgetSink: Send + Sync {
    fn publish(&self, snapshot: &WidgetSnapshot);
}

/// Build a snapshot covering the seven days ending at `as_of`
pub fn build_snapshot(habits: &[Habit], completions: &[Completion], as_of: NaiveDate) -> WidgetSnapshot {
    let window_start = as_of - Duration::days(SNAPSHOT_DAYS - 1);
    let rows = habits
        .iter()
        .map(|habit| {
            let target = habit.target_value();
            let mut week = BTreeMap::new();
            for date in dates::days_between(window_start, as_of) {
                let complete = completions.iter().any(|c| {
                    c.habit_id == habit.id
                        && c.completion_date == date
                        && (c.status == CompletionStatus::Completed || c.value >= target)
                });
                week.insert(dates::day_key(date), complete);
            }
            WidgetHabit {
                id: habit.id.clone(),
                name: habit.name.clone(),
                icon: habit.icon.clone(),
                color: habit.color.clone(),
                week,
            }
        })
        .collect();

    WidgetSnapshot { habits: rows }
}
