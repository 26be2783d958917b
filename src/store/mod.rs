/// Local store for persisting habit data
///
/// Durable, process-local storage for habits, completions, the
/// pending-operation log, the derived caches, and the sync watermark. All
/// operations are synchronous and total; this layer never touches the
/// network and never fails due to connectivity.

pub mod sqlite;
pub mod migrations;

pub use sqlite::*;

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::derived::StreakState;
use crate::domain::{Completion, CompletionId, Habit, HabitId};
use crate::sync::PendingOperation;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database query error: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Migration error: {0}")]
    Migration(String),
}

/// Lock a shared mutex, recovering from a poisoned lock
///
/// The store holds no invariants that a panicked writer could leave half
/// applied across a lock boundary (every write is a single SQLite statement
/// or transaction), so continuing with the inner value is sound.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Storage interface for the sync engine
///
/// Keeping this behind a trait lets tests and alternative backends swap in
/// without touching the engine.
pub trait LocalStore {
    // Habits, keyed by id
    fn put_habit(&self, habit: &Habit) -> Result<(), StoreError>;
    fn get_habit(&self, id: &HabitId) -> Result<Option<Habit>, StoreError>;
    fn list_habits(&self) -> Result<Vec<Habit>, StoreError>;
    fn delete_habit(&self, id: &HabitId) -> Result<(), StoreError>;

    // Completions, keyed by id, indexed by owning habit
    fn put_completion(&self, completion: &Completion) -> Result<(), StoreError>;
    fn get_completion(&self, id: &CompletionId) -> Result<Option<Completion>, StoreError>;
    /// Look up the completion for a `(habit, day)` pair; the write path
    /// always calls this before creating, preventing duplicates
    fn find_completion(
        &self,
        habit_id: &HabitId,
        date: NaiveDate,
    ) -> Result<Option<Completion>, StoreError>;
    fn list_completions(&self) -> Result<Vec<Completion>, StoreError>;
    fn list_completions_by_habit(&self, habit_id: &HabitId) -> Result<Vec<Completion>, StoreError>;
    fn delete_completions_by_habit(&self, habit_id: &HabitId) -> Result<usize, StoreError>;

    // Pending-operation log, keyed by queue id (a newer snapshot of the same
    // row replaces the older entry)
    fn enqueue_pending(&self, op: &PendingOperation) -> Result<(), StoreError>;
    fn list_pending(&self) -> Result<Vec<PendingOperation>, StoreError>;
    fn remove_pending(&self, id: &str) -> Result<(), StoreError>;
    fn record_pending_attempt(
        &self,
        id: &str,
        retry_count: u32,
        attempted_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // Day-status cache, sparse, bucketed by month for invalidation
    fn put_day_status(&self, day: NaiveDate, grade: f64) -> Result<(), StoreError>;
    fn delete_day_status(&self, day: NaiveDate) -> Result<(), StoreError>;
    fn get_day_status(&self, day: NaiveDate) -> Result<Option<f64>, StoreError>;
    fn month_statuses(&self, month: &str) -> Result<BTreeMap<String, f64>, StoreError>;

    // Streak counters and the unlocked milestone set
    fn streak_state(&self) -> Result<StreakState, StoreError>;
    fn put_streak_state(&self, state: &StreakState) -> Result<(), StoreError>;

    // Monotonic watermark of the last successful reconcile
    fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>, StoreError>;
    fn set_last_sync_time(&self, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Wholesale replacement of the synced collections from a remote pull.
    /// Atomic: either everything is replaced or nothing is.
    fn replace_collections(
        &self,
        habits: &[Habit],
        completions: &[Completion],
        achievements: Option<&StreakState>,
    ) -> Result<(), StoreError>;
}
