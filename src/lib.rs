/// Offline-first habit data layer
///
/// Local SQLite persistence, an optimistic mutation engine, a pending-operation
/// sync processor with bounded retry, and derived day-status/streak state. The
/// embedding application constructs an [`Engine`] with a [`RemoteStore`]
/// implementation and drives everything through it.

pub mod domain;
pub mod store;
pub mod remote;
pub mod sync;
pub mod derived;
pub mod widget;
pub mod engine;

pub use domain::{
    Completion, CompletionStatus, DomainError, Frequency, Goal, Habit, HabitDraft, HabitId,
    HabitPatch, ToggleAction, UserId,
};
pub use derived::{AchievementSummary, StreakState, MILESTONES};
pub use engine::{Engine, EngineError, EngineEvent};
pub use remote::{RemoteError, RemotePull, RemoteStore};
pub use store::{LocalStore, SqliteStore, StoreError};
pub use sync::{DrainOutcome, PendingOperation, PendingPayload, SyncProcessor};
pub use widget::{WidgetSink, WidgetSnapshot};
