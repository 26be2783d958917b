/// Per-day aggregate completion status
///
/// For each calendar day with at least one active habit, the cache holds a
/// grade: 1.0 when every active habit is completed or skipped, 0.5 when some
/// progress exists, 0.0 when none does. Days with no active habits are absent
/// from the cache (sparse representation).

use chrono::NaiveDate;
use std::collections::BTreeSet;

use crate::domain::{Completion, CompletionStatus, Habit};
use crate::store::{LocalStore, StoreError};

/// Grade for a fully completed day
pub const GRADE_ALL: f64 = 1.0;
/// Grade for a day with partial progress
pub const GRADE_SOME: f64 = 0.5;
/// Grade for a day with active habits and no progress
pub const GRADE_NONE: f64 = 0.0;

/// Summary of one day's aggregate status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayAggregate {
    All,
    Some,
    None,
}

impl DayAggregate {
    pub fn grade(self) -> f64 {
        match self {
            DayAggregate::All => GRADE_ALL,
            DayAggregate::Some => GRADE_SOME,
            DayAggregate::None => GRADE_NONE,
        }
    }

    pub fn from_grade(grade: f64) -> Self {
        if grade >= GRADE_ALL {
            DayAggregate::All
        } else if grade > GRADE_NONE {
            DayAggregate::Some
        } else {
            DayAggregate::None
        }
    }
}

/// Aggregate status of one day, or `None` when no habit is active on it
///
/// Pure function of the habit/completion set; orphaned completions (no
/// matching habit) are ignored.
pub fn day_status(habits: &[Habit], completions: &[Completion], date: NaiveDate) -> Option<f64> {
    let active: Vec<&Habit> = habits.iter().filter(|h| h.is_active_on(date)).collect();
    if active.is_empty() {
        return None;
    }

    let mut completed = 0usize;
    let mut in_progress = 0usize;
    for habit in &active {
        let status = completions
            .iter()
            .find(|c| c.habit_id == habit.id && c.completion_date == date)
            .map(|c| c.status);
        match status {
            Some(s) if s.counts_as_done() => completed += 1,
            Some(CompletionStatus::InProgress) => in_progress += 1,
            _ => {}
        }
    }

    let aggregate = if completed == active.len() {
        DayAggregate::All
    } else if completed > 0 || in_progress > 0 {
        DayAggregate::Some
    } else {
        DayAggregate::None
    };
    Some(aggregate.grade())
}

/// Recompute the cached status for the supplied dates and merge the results
/// into the month-keyed cache, deleting entries for days that went inactive
pub fn refresh_days(store: &dyn LocalStore, dates: &[NaiveDate]) -> Result<(), StoreError> {
    if dates.is_empty() {
        return Ok(());
    }
    let habits = store.list_habits()?;
    let completions = store.list_completions()?;

    let unique: BTreeSet<NaiveDate> = dates.iter().copied().collect();
    for date in unique {
        match day_status(&habits, &completions, date) {
            Some(grade) => store.put_day_status(date, grade)?,
            None => store.delete_day_status(date)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CompletionId, HabitDraft, HabitId, UserId};
    use chrono::Utc;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn habit(name: &str, start: NaiveDate) -> Habit {
        Habit::new(UserId::new("u1"), HabitDraft::daily(name, start), 0).unwrap()
    }

    fn completion(habit: &Habit, date: NaiveDate, status: CompletionStatus) -> Completion {
        Completion::new(habit.id.clone(), UserId::new("u1"), date, status, 1.0)
    }

    #[test]
    fn day_without_active_habits_is_absent() {
        let h = habit("Run", day(2024, 3, 1));
        assert_eq!(day_status(&[h], &[], day(2024, 2, 1)), None);
        assert_eq!(day_status(&[], &[], day(2024, 2, 1)), None);
    }

    #[test]
    fn grades_for_none_some_all() {
        let a = habit("Run", day(2024, 3, 1));
        let b = habit("Read", day(2024, 3, 1));
        let date = day(2024, 3, 5);

        let habits = vec![a.clone(), b.clone()];
        assert_eq!(day_status(&habits, &[], date), Some(GRADE_NONE));

        let some = vec![completion(&a, date, CompletionStatus::Completed)];
        assert_eq!(day_status(&habits, &some, date), Some(GRADE_SOME));

        let all = vec![
            completion(&a, date, CompletionStatus::Completed),
            completion(&b, date, CompletionStatus::Skipped),
        ];
        assert_eq!(day_status(&habits, &all, date), Some(GRADE_ALL));
    }

    #[test]
    fn in_progress_counts_as_some() {
        let a = habit("Run", day(2024, 3, 1));
        let date = day(2024, 3, 5);
        let rows = vec![completion(&a, date, CompletionStatus::InProgress)];
        assert_eq!(day_status(&[a], &rows, date), Some(GRADE_SOME));
    }

    #[test]
    fn orphaned_completion_is_ignored() {
        let a = habit("Run", day(2024, 3, 1));
        let date = day(2024, 3, 5);
        let orphan = Completion {
            id: CompletionId::new(),
            habit_id: HabitId::new(),
            completion_date: date,
            status: CompletionStatus::Completed,
            value: 1.0,
            user_id: UserId::new("u1"),
            updated_at: Utc::now(),
        };
        assert_eq!(day_status(&[a], &[orphan], date), Some(GRADE_NONE));
    }

    #[test]
    fn recomputation_is_idempotent() {
        let a = habit("Run", day(2024, 3, 1));
        let b = habit("Read", day(2024, 3, 1));
        let date = day(2024, 3, 5);
        let rows = vec![completion(&a, date, CompletionStatus::Completed)];
        let habits = vec![a, b];
        let first = day_status(&habits, &rows, date);
        let second = day_status(&habits, &rows, date);
        assert_eq!(first, second);
    }

    #[test]
    fn aggregate_round_trips_through_grade() {
        for agg in [DayAggregate::All, DayAggregate::Some, DayAggregate::None] {
            assert_eq!(DayAggregate::from_grade(agg.grade()), agg);
        }
    }
}
