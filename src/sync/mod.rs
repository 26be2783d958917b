/// Sync layer: the pending-operation log and its retry policy
///
/// Every local mutation that fails to reach the remote service is captured
/// here as a whole-row snapshot and replayed later by the sync processor.

pub mod processor;

pub use processor::*;

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::derived::AchievementSummary;
use crate::domain::{Completion, Habit, HabitId};

/// Maximum times an operation is attempted before being dropped
pub const MAX_RETRY_ATTEMPTS: u32 = 5;

/// Base interval an operation waits after a failed attempt
pub const MIN_RETRY_INTERVAL_SECS: i64 = 30;

/// Exponential backoff in seconds with cap
pub fn backoff_seconds(retry_count: u32) -> i64 {
    const MAX_EXPONENT: u32 = 6;
    let capped = retry_count.min(MAX_EXPONENT);
    MIN_RETRY_INTERVAL_SECS * (1_i64 << capped)
}

/// Which remote collection an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTable {
    Habits,
    Completions,
    Achievements,
}

/// The row snapshot carried by a pending operation
///
/// The variant is the discriminant: it encodes both the target table and
/// whether the replay is an upsert or a delete, so the sync processor can
/// dispatch exhaustively without runtime type checks. Upserts carry the full
/// row; the habit delete carries only the id (its cascaded completion
/// deletions are replayed as part of the same operation, not tracked
/// per row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum PendingPayload {
    UpsertHabit(Habit),
    UpsertCompletion(Completion),
    UpsertAchievements(AchievementSummary),
    DeleteHabit(HabitId),
}

impl PendingPayload {
    pub fn table(&self) -> SyncTable {
        match self {
            PendingPayload::UpsertHabit(_) | PendingPayload::DeleteHabit(_) => SyncTable::Habits,
            PendingPayload::UpsertCompletion(_) => SyncTable::Completions,
            PendingPayload::UpsertAchievements(_) => SyncTable::Achievements,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, PendingPayload::DeleteHabit(_))
    }

    /// Queue key: the affected row's id for upserts, so a newer snapshot of
    /// the same row replaces the older queue entry; a fresh id for deletes.
    fn queue_id(&self) -> String {
        match self {
            PendingPayload::UpsertHabit(habit) => habit.id.to_string(),
            PendingPayload::UpsertCompletion(completion) => completion.id.to_string(),
            PendingPayload::UpsertAchievements(summary) => summary.user_id.to_string(),
            PendingPayload::DeleteHabit(_) => Uuid::new_v4().to_string(),
        }
    }
}

/// A local mutation not yet confirmed by the remote service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: String,
    pub payload: PendingPayload,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl PendingOperation {
    pub fn new(payload: PendingPayload) -> Self {
        Self {
            id: payload.queue_id(),
            payload,
            enqueued_at: Utc::now(),
            retry_count: 0,
            last_attempt_at: None,
        }
    }

    /// Whether the retry budget is spent
    pub fn exhausted(&self) -> bool {
        self.retry_count >= MAX_RETRY_ATTEMPTS
    }

    /// Whether this operation should be attempted in the current drain pass
    ///
    /// An operation attempted too recently is skipped (kept in the queue) so
    /// a drain loop never busy-retries a failing row.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_attempt_at {
            None => true,
            Some(last) => now - last >= Duration::seconds(backoff_seconds(self.retry_count)),
        }
    }
}
