/// Streak calculation and milestone-achievement detection
///
/// The current streak is the number of consecutive days, ending today, on
/// which every active habit was completed or skipped. Days with no active
/// habits (frequency off-days, gaps between habits' date ranges) are walked
/// over without breaking the streak.

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::domain::{Completion, Habit, UserId};

/// Streak-length thresholds that unlock achievements, in ascending order
pub const MILESTONES: [u32; 15] = [1, 3, 5, 7, 10, 14, 21, 28, 30, 45, 60, 90, 100, 180, 200];

/// Hard cap on the backward walk, matching the bound on habit date ranges
const MAX_WALK_DAYS: u32 = 365;

/// Persisted streak counters and the unlocked milestone set
///
/// `max_streak >= current_streak` always holds after recomputation, and
/// `achievements` only grows except via an explicit reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreakState {
    pub current_streak: u32,
    pub max_streak: u32,
    pub achievements: Vec<u32>,
}

impl StreakState {
    /// The zero baseline for a fresh user
    pub fn new() -> Self {
        Self {
            current_streak: 0,
            max_streak: 0,
            achievements: Vec::new(),
        }
    }

    pub fn is_unlocked(&self, threshold: u32) -> bool {
        self.achievements.contains(&threshold)
    }
}

impl Default for StreakState {
    fn default() -> Self {
        Self::new()
    }
}

/// The row shape pushed to the remote `user_achievements` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementSummary {
    pub user_id: UserId,
    pub current_streak: u32,
    pub max_streak: u32,
    pub achievements: Vec<u32>,
    pub updated_at: DateTime<Utc>,
}

impl AchievementSummary {
    pub fn from_state(user_id: UserId, state: &StreakState) -> Self {
        Self {
            user_id,
            current_streak: state.current_streak,
            max_streak: state.max_streak,
            achievements: state.achievements.clone(),
            updated_at: Utc::now(),
        }
    }
}

/// Compute the current streak as of `as_of`
///
/// Pure function of the habit/completion set. Walks backward one day at a
/// time: a day with no active habits is skipped without breaking the streak;
/// a day where any active habit lacks a completed-or-skipped completion ends
/// the walk. The walk never runs past the earliest habit start date, and is
/// capped to prevent unbounded iteration.
pub fn current_streak(habits: &[Habit], completions: &[Completion], as_of: NaiveDate) -> u32 {
    let earliest_start = match habits.iter().map(|h| h.start_date).min() {
        Some(date) => date,
        None => return 0,
    };

    let mut streak = 0;
    let mut cursor = as_of;
    for _ in 0..MAX_WALK_DAYS {
        if cursor < earliest_start {
            break;
        }
        let mut active = habits.iter().filter(|h| h.is_active_on(cursor)).peekable();
        if active.peek().is_none() {
            cursor -= Duration::days(1);
            continue;
        }
        let all_done = active.all(|habit| {
            completions.iter().any(|c| {
                c.habit_id == habit.id && c.completion_date == cursor && c.status.counts_as_done()
            })
        });
        if !all_done {
            break;
        }
        streak += 1;
        cursor -= Duration::days(1);
    }

    streak
}

/// Fold a freshly computed streak into the persisted state
///
/// Returns the new state plus exactly the milestones that transitioned from
/// locked to unlocked in this call. The diff is taken against the set
/// captured in `state` before any mutation, so callers get each unlock once.
pub fn recalculate(state: &StreakState, streak: u32) -> (StreakState, Vec<u32>) {
    let newly_unlocked: Vec<u32> = MILESTONES
        .iter()
        .copied()
        .filter(|&threshold| streak >= threshold && !state.is_unlocked(threshold))
        .collect();

    let mut achievements = state.achievements.clone();
    achievements.extend(&newly_unlocked);
    achievements.sort_unstable();
    achievements.dedup();

    let next = StreakState {
        current_streak: streak,
        max_streak: state.max_streak.max(streak),
        achievements,
    };
    (next, newly_unlocked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CompletionStatus, Frequency, HabitDraft};
    use chrono::Weekday;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn habit(start: NaiveDate) -> Habit {
        Habit::new(UserId::new("u1"), HabitDraft::daily("Run", start), 0).unwrap()
    }

    fn done(habit: &Habit, date: NaiveDate, status: CompletionStatus) -> Completion {
        Completion::new(habit.id.clone(), UserId::new("u1"), date, status, 1.0)
    }

    #[test]
    fn empty_input_yields_zero() {
        assert_eq!(current_streak(&[], &[], day(2024, 3, 1)), 0);
    }

    #[test]
    fn streak_is_stable_without_mutation() {
        let h = habit(day(2024, 2, 25));
        let today = day(2024, 3, 1);
        let completions = vec![
            done(&h, today, CompletionStatus::Completed),
            done(&h, day(2024, 2, 29), CompletionStatus::Completed),
        ];
        let habits = vec![h];
        let first = current_streak(&habits, &completions, today);
        let second = current_streak(&habits, &completions, today);
        assert_eq!(first, 2);
        assert_eq!(first, second);
    }

    #[test]
    fn gap_breaks_streak() {
        let h = habit(day(2024, 2, 1));
        let today = day(2024, 3, 1);
        let completions = vec![
            done(&h, today, CompletionStatus::Completed),
            done(&h, today - Duration::days(1), CompletionStatus::Completed),
            // nothing on D-2
            done(&h, today - Duration::days(3), CompletionStatus::Completed),
        ];
        assert_eq!(current_streak(&[h], &completions, today), 2);
    }

    #[test]
    fn incomplete_today_yields_zero() {
        let h = habit(day(2024, 2, 1));
        let today = day(2024, 3, 1);
        let completions = vec![
            done(&h, today - Duration::days(1), CompletionStatus::Completed),
            done(&h, today - Duration::days(2), CompletionStatus::Completed),
        ];
        assert_eq!(current_streak(&[h], &completions, today), 0);
    }

    #[test]
    fn skip_counts_as_progress() {
        let h = habit(day(2024, 2, 1));
        let today = day(2024, 3, 1);
        let completions = vec![
            done(&h, today, CompletionStatus::Skipped),
            done(&h, today - Duration::days(1), CompletionStatus::Completed),
            done(&h, today - Duration::days(2), CompletionStatus::Completed),
        ];
        assert_eq!(current_streak(&[h], &completions, today), 3);
    }

    #[test]
    fn weekly_habit_ignores_off_days() {
        // Mon/Wed/Fri habit; as-of Friday 2024-03-15
        let mut draft = HabitDraft::daily("Gym", day(2024, 3, 1));
        draft.frequency = Frequency::Weekly(vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]);
        let h = Habit::new(UserId::new("u1"), draft, 0).unwrap();
        let friday = day(2024, 3, 15);
        let completions = vec![
            done(&h, friday, CompletionStatus::Completed),
            done(&h, day(2024, 3, 13), CompletionStatus::Completed), // Wednesday
            // a completion mistakenly logged on the intervening Tuesday
            done(&h, day(2024, 3, 12), CompletionStatus::Completed),
            done(&h, day(2024, 3, 11), CompletionStatus::Completed), // Monday
            done(&h, day(2024, 3, 8), CompletionStatus::Completed),  // prior Friday
        ];
        assert_eq!(current_streak(&[h], &completions, friday), 4);
    }

    #[test]
    fn ended_habit_stops_contributing() {
        let mut draft = HabitDraft::daily("Course", day(2024, 2, 1));
        let today = day(2024, 3, 1);
        draft.end_date = Some(today - Duration::days(1));
        let h = Habit::new(UserId::new("u1"), draft, 0).unwrap();
        let completions = vec![
            done(&h, today - Duration::days(1), CompletionStatus::Completed),
            done(&h, today - Duration::days(2), CompletionStatus::Completed),
        ];
        // Nothing is logged today, but no habit is active today either
        assert_eq!(current_streak(&[h], &completions, today), 2);
    }

    #[test]
    fn habit_with_no_completions_terminates_at_zero() {
        let h = habit(day(2020, 1, 1));
        assert_eq!(current_streak(&[h], &[], day(2024, 3, 1)), 0);
    }

    #[test]
    fn unlock_diff_reports_only_new_thresholds() {
        // Streak was 6 (milestones 1/3/5 unlocked), now 7
        let state = StreakState {
            current_streak: 6,
            max_streak: 6,
            achievements: vec![1, 3, 5],
        };
        let (next, newly) = recalculate(&state, 7);
        assert_eq!(newly, vec![7]);
        assert_eq!(next.current_streak, 7);
        assert_eq!(next.max_streak, 7);
        assert_eq!(next.achievements, vec![1, 3, 5, 7]);
    }

    #[test]
    fn achievements_never_relock() {
        let state = StreakState {
            current_streak: 7,
            max_streak: 7,
            achievements: vec![1, 3, 5, 7],
        };
        let (next, newly) = recalculate(&state, 0);
        assert!(newly.is_empty());
        assert_eq!(next.achievements, vec![1, 3, 5, 7]);
        assert_eq!(next.current_streak, 0);
        assert_eq!(next.max_streak, 7);
    }
}
