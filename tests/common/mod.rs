#![allow(dead_code)]

/// Shared test fixtures: an in-memory remote store with failure injection,
/// plus small builders for habits and dates.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use habit_sync::derived::AchievementSummary;
use habit_sync::domain::{Completion, Habit, HabitDraft, HabitId, UserId};
use habit_sync::remote::{RemoteError, RemotePull, RemoteStore};
use habit_sync::store::SqliteStore;

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn user() -> UserId {
    UserId::new("test-user")
}

pub fn mem_store() -> SqliteStore {
    SqliteStore::in_memory().unwrap()
}

pub fn daily_habit(name: &str, start: NaiveDate) -> Habit {
    Habit::new(user(), HabitDraft::daily(name, start), 0).unwrap()
}

/// In-memory stand-in for the remote service
///
/// `set_offline(true)` makes every call fail with `Unavailable`; every call,
/// failed or not, bumps the call counter so tests can assert that dropped
/// operations are never attempted.
#[derive(Default)]
pub struct MockRemote {
    habits: Mutex<BTreeMap<String, Habit>>,
    completions: Mutex<BTreeMap<String, Completion>>,
    achievements: Mutex<Option<AchievementSummary>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn habit_count(&self) -> usize {
        self.habits.lock().unwrap().len()
    }

    pub fn completion_count(&self) -> usize {
        self.completions.lock().unwrap().len()
    }

    pub fn has_habit(&self, id: &HabitId) -> bool {
        self.habits.lock().unwrap().contains_key(&id.to_string())
    }

    pub fn achievements(&self) -> Option<AchievementSummary> {
        self.achievements.lock().unwrap().clone()
    }

    /// Seed a habit directly into the mock's collections
    pub fn seed_habit(&self, habit: Habit) {
        self.habits.lock().unwrap().insert(habit.id.to_string(), habit);
    }

    pub fn seed_completion(&self, completion: Completion) {
        self.completions
            .lock()
            .unwrap()
            .insert(completion.id.to_string(), completion);
    }

    fn gate(&self) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            Err(RemoteError::unavailable("mock remote is offline"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn insert_habit(&self, habit: &Habit) -> Result<(), RemoteError> {
        self.gate()?;
        self.habits
            .lock()
            .unwrap()
            .insert(habit.id.to_string(), habit.clone());
        Ok(())
    }

    async fn update_habit(&self, habit: &Habit) -> Result<(), RemoteError> {
        self.insert_habit(habit).await
    }

    async fn upsert_habit(&self, habit: &Habit) -> Result<(), RemoteError> {
        self.insert_habit(habit).await
    }

    async fn delete_habit(&self, id: &HabitId) -> Result<(), RemoteError> {
        self.gate()?;
        self.habits.lock().unwrap().remove(&id.to_string());
        Ok(())
    }

    async fn insert_completion(&self, completion: &Completion) -> Result<(), RemoteError> {
        self.gate()?;
        self.completions
            .lock()
            .unwrap()
            .insert(completion.id.to_string(), completion.clone());
        Ok(())
    }

    async fn update_completion(&self, completion: &Completion) -> Result<(), RemoteError> {
        self.insert_completion(completion).await
    }

    async fn upsert_completion(&self, completion: &Completion) -> Result<(), RemoteError> {
        self.insert_completion(completion).await
    }

    async fn delete_completions_by_habit(&self, habit_id: &HabitId) -> Result<(), RemoteError> {
        self.gate()?;
        self.completions
            .lock()
            .unwrap()
            .retain(|_, c| c.habit_id != *habit_id);
        Ok(())
    }

    async fn upsert_achievements(&self, summary: &AchievementSummary) -> Result<(), RemoteError> {
        self.gate()?;
        *self.achievements.lock().unwrap() = Some(summary.clone());
        Ok(())
    }

    async fn pull_all(&self, user_id: &UserId) -> Result<RemotePull, RemoteError> {
        self.gate()?;
        let habits = self
            .habits
            .lock()
            .unwrap()
            .values()
            .filter(|h| h.user_id == *user_id)
            .cloned()
            .collect();
        let completions = self
            .completions
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.user_id == *user_id)
            .cloned()
            .collect();
        let achievements = self.achievements.lock().unwrap().clone();
        Ok(RemotePull {
            habits,
            completions,
            achievements,
        })
    }
}
