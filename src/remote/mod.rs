/// Remote store boundary
///
/// The remote service is consumed, not implemented, by this crate: three
/// logical collections (habits, habit_completions, user_achievements) with
/// row-level insert/update/upsert/delete and whole-collection pulls keyed by
/// user id. Conflict resolution is last-writer-wins at the row level.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::derived::{AchievementSummary, StreakState};
use crate::domain::{Completion, Habit, HabitId, UserId};

/// Errors surfaced by a remote store implementation
///
/// A timeout is indistinguishable from any other unavailability: the caller
/// re-enqueues either way.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Network-level failure: unreachable, timed out, connection reset
    #[error("Remote unavailable: {0}")]
    Unavailable(String),

    /// The service answered with an error response
    #[error("Remote error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl RemoteError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }
}

/// A whole-collection pull for one user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemotePull {
    pub habits: Vec<Habit>,
    pub completions: Vec<Completion>,
    pub achievements: Option<AchievementSummary>,
}

impl RemotePull {
    /// The streak state carried by the pulled achievement summary, if any
    pub fn streak_state(&self) -> Option<StreakState> {
        self.achievements.as_ref().map(|summary| StreakState {
            current_streak: summary.current_streak,
            max_streak: summary.max_streak,
            achievements: summary.achievements.clone(),
        })
    }
}

/// Row-level access to the three remote collections
///
/// Implementations perform the actual network I/O; everything in this crate
/// only ever sees these methods. All calls may suspend; none hold any lock
/// over the local store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    // habits
    async fn insert_habit(&self, habit: &Habit) -> Result<(), RemoteError>;
    async fn update_habit(&self, habit: &Habit) -> Result<(), RemoteError>;
    async fn upsert_habit(&self, habit: &Habit) -> Result<(), RemoteError>;
    async fn delete_habit(&self, id: &HabitId) -> Result<(), RemoteError>;

    // habit_completions
    async fn insert_completion(&self, completion: &Completion) -> Result<(), RemoteError>;
    async fn update_completion(&self, completion: &Completion) -> Result<(), RemoteError>;
    async fn upsert_completion(&self, completion: &Completion) -> Result<(), RemoteError>;
    async fn delete_completions_by_habit(&self, habit_id: &HabitId) -> Result<(), RemoteError>;

    // user_achievements
    async fn upsert_achievements(&self, summary: &AchievementSummary) -> Result<(), RemoteError>;

    /// Pull the complete collections for one user
    async fn pull_all(&self, user_id: &UserId) -> Result<RemotePull, RemoteError>;
}
