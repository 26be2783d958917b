/// The engine: single entry point for all habit/completion mutations
///
/// Owns the local store, the sync processor, and the derived-state pipeline
/// for one user session. Every mutation commits locally first, recomputes the
/// affected day statuses synchronously, schedules a debounced streak
/// recompute, and then attempts the remote write as a spawned task that can
/// never fail the mutation retroactively.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::derived::{self, day_status, AchievementSummary, StreakState};
use crate::domain::{
    apply_toggle, dates, Completion, DomainError, Habit, HabitDraft, HabitId, HabitPatch,
    ToggleAction, UserId,
};
use crate::remote::RemoteStore;
use crate::store::{lock, LocalStore, SqliteStore, StoreError};
use crate::sync::{DrainOutcome, PendingPayload, PushKind, SyncProcessor};
use crate::widget::{self, WidgetSink};

/// Window within which rapid progress ticks coalesce into one streak recompute
pub const STREAK_DEBOUNCE_MS: u64 = 100;

/// Errors surfaced synchronously by engine operations
///
/// Network outcomes are never part of this: remote failures are captured in
/// the pending-operation log, and reconcile failures in `last_error`.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Domain(#[from] DomainError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Notifications pushed to the embedding application
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Milestone thresholds that just transitioned from locked to unlocked
    AchievementsUnlocked(Vec<u32>),
}

/// Offline-first mutation/sync engine for one user session
///
/// Construct one per session and pass it by reference. Requires a running
/// tokio runtime: remote pushes and the debounced streak recompute are
/// spawned tasks.
pub struct Engine<R: RemoteStore + 'static> {
    store: Arc<Mutex<SqliteStore>>,
    remote: Arc<R>,
    user_id: UserId,
    processor: SyncProcessor<R>,
    last_error: Arc<Mutex<Option<String>>>,
    widget_sink: Arc<Mutex<Option<Arc<dyn WidgetSink>>>>,
    streak_tx: mpsc::UnboundedSender<()>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<EngineEvent>>>,
    pushes: Arc<Mutex<JoinSet<()>>>,
}

impl<R: RemoteStore + 'static> Engine<R> {
    pub fn new(store: SqliteStore, remote: Arc<R>, user_id: UserId) -> Self {
        let store = Arc::new(Mutex::new(store));
        let last_error = Arc::new(Mutex::new(None));
        let processor = SyncProcessor::new(
            Arc::clone(&store),
            Arc::clone(&remote),
            user_id.clone(),
            Arc::clone(&last_error),
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (streak_tx, streak_rx) = mpsc::unbounded_channel();
        let pushes = Arc::new(Mutex::new(JoinSet::new()));

        spawn_streak_debouncer(
            streak_rx,
            Arc::clone(&store),
            Arc::clone(&remote),
            user_id.clone(),
            events_tx.clone(),
        );

        Self {
            store,
            remote,
            user_id,
            processor,
            last_error,
            widget_sink: Arc::new(Mutex::new(None)),
            streak_tx,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            pushes,
        }
    }

    // ----- mutation engine -----

    /// Create a habit: local write, day-status recompute, remote push
    ///
    /// Returns the new id as soon as the local write commits; the network
    /// result is never awaited by the caller.
    pub fn add_habit(&self, draft: HabitDraft) -> Result<HabitId, EngineError> {
        let today = dates::today();
        let habit = {
            let store = lock(&self.store);
            let sort_order = store
                .list_habits()?
                .iter()
                .map(|h| h.sort_order)
                .max()
                .map_or(0, |max| max + 1);
            let habit = Habit::new(self.user_id.clone(), draft, sort_order)?;
            store.put_habit(&habit)?;
            day_status::refresh_days(&*store, &habit.forward_range(today))?;
            habit
        };

        self.publish_widget()?;
        self.schedule_streak_recalc();
        self.spawn_push(PushKind::Create, PendingPayload::UpsertHabit(habit.clone()));
        tracing::info!("Added habit {} ({})", habit.name, habit.id);
        Ok(habit.id)
    }

    /// Merge a partial update into a habit; unknown ids are a silent no-op
    pub fn update_habit(&self, id: &HabitId, patch: HabitPatch) -> Result<(), EngineError> {
        let today = dates::today();
        let habit = {
            let store = lock(&self.store);
            let Some(mut habit) = store.get_habit(id)? else {
                tracing::debug!("update_habit: unknown id {}, ignoring", id);
                return Ok(());
            };
            // Frequency/date changes move which days are active, so both the
            // old and new ranges get recomputed
            let mut affected = habit.affected_range(today);
            habit.apply_patch(patch)?;
            affected.extend(habit.affected_range(today));
            store.put_habit(&habit)?;
            day_status::refresh_days(&*store, &affected)?;
            habit
        };

        self.publish_widget()?;
        self.schedule_streak_recalc();
        self.spawn_push(PushKind::Update, PendingPayload::UpsertHabit(habit));
        Ok(())
    }

    /// Remove a habit and all its completions; unknown ids are a silent no-op
    pub fn delete_habit(&self, id: &HabitId) -> Result<(), EngineError> {
        let today = dates::today();
        {
            let store = lock(&self.store);
            let Some(habit) = store.get_habit(id)? else {
                tracing::debug!("delete_habit: unknown id {}, ignoring", id);
                return Ok(());
            };
            let vacated = habit.affected_range(today);
            store.delete_completions_by_habit(id)?;
            store.delete_habit(id)?;
            day_status::refresh_days(&*store, &vacated)?;
        }

        self.publish_widget()?;
        self.schedule_streak_recalc();
        self.spawn_push(PushKind::Update, PendingPayload::DeleteHabit(id.clone()));
        tracing::info!("Deleted habit {}", id);
        Ok(())
    }

    /// Apply a progress tick to a habit/day
    ///
    /// Looks up the `(habit, day)` completion, runs the pure toggle
    /// transition, and performs an add-or-update write. Returns the committed
    /// completion, or `None` when the habit id is unknown.
    pub fn toggle_habit_status(
        &self,
        habit_id: &HabitId,
        date: NaiveDate,
        action: ToggleAction,
    ) -> Result<Option<Completion>, EngineError> {
        let (completion, kind) = {
            let store = lock(&self.store);
            let Some(habit) = store.get_habit(habit_id)? else {
                tracing::debug!("toggle_habit_status: unknown habit {}, ignoring", habit_id);
                return Ok(None);
            };
            let existing = store.find_completion(habit_id, date)?;
            let outcome = apply_toggle(&habit, existing.as_ref(), action);

            let (completion, kind) = match existing {
                Some(mut completion) => {
                    completion.status = outcome.status;
                    completion.value = outcome.value;
                    completion.updated_at = chrono::Utc::now();
                    (completion, PushKind::Update)
                }
                None => (
                    Completion::new(
                        habit_id.clone(),
                        self.user_id.clone(),
                        date,
                        outcome.status,
                        outcome.value,
                    ),
                    PushKind::Create,
                ),
            };
            store.put_completion(&completion)?;
            day_status::refresh_days(&*store, &[date])?;
            (completion, kind)
        };

        self.publish_widget()?;
        self.schedule_streak_recalc();
        self.spawn_push(kind, PendingPayload::UpsertCompletion(completion.clone()));
        Ok(Some(completion))
    }

    /// Lower-level primitive: write a fresh completion row
    pub fn add_completion(&self, completion: Completion) -> Result<(), EngineError> {
        self.put_completion(completion, PushKind::Create)
    }

    /// Lower-level primitive: overwrite an existing completion row
    pub fn update_completion(&self, completion: Completion) -> Result<(), EngineError> {
        self.put_completion(completion, PushKind::Update)
    }

    fn put_completion(&self, completion: Completion, kind: PushKind) -> Result<(), EngineError> {
        {
            let store = lock(&self.store);
            store.put_completion(&completion)?;
            day_status::refresh_days(&*store, &[completion.completion_date])?;
        }
        self.publish_widget()?;
        self.schedule_streak_recalc();
        self.spawn_push(kind, PendingPayload::UpsertCompletion(completion));
        Ok(())
    }

    // ----- derived state -----

    /// Recompute the streak and fold it into the achievement state
    ///
    /// Returns exactly the milestone thresholds that unlocked in this call.
    /// The debounced background recompute runs this same path.
    pub fn recalculate_streaks(&self) -> Result<Vec<u32>, EngineError> {
        let (newly, summary) = recalculate_streaks_inner(
            &self.store,
            &self.user_id,
            &self.events_tx,
        )?;
        self.spawn_push(PushKind::Update, PendingPayload::UpsertAchievements(summary));
        Ok(newly)
    }

    /// Destructive, explicit reset of streak counters and the unlocked set
    pub fn reset_achievements(&self) -> Result<(), EngineError> {
        let baseline = StreakState::new();
        lock(&self.store).put_streak_state(&baseline)?;
        let summary = AchievementSummary::from_state(self.user_id.clone(), &baseline);
        self.spawn_push(PushKind::Update, PendingPayload::UpsertAchievements(summary));
        tracing::info!("Achievements reset to baseline");
        Ok(())
    }

    // ----- sync -----

    /// One pass over the pending-operation log
    pub async fn drain_pending_operations(&self) -> Result<DrainOutcome, EngineError> {
        Ok(self.processor.drain_pending_operations().await?)
    }

    /// Pull the remote collections and replace local state wholesale
    pub async fn full_reconcile(&self) -> Result<bool, EngineError> {
        let pulled = self.processor.full_reconcile().await?;
        if pulled {
            self.recalculate_streaks()?;
            self.publish_widget()?;
        }
        Ok(pulled)
    }

    /// Drain, then reconcile
    pub async fn run_sync_cycle(&self) -> Result<(), EngineError> {
        self.drain_pending_operations().await?;
        self.full_reconcile().await?;
        Ok(())
    }

    /// Run sync cycles on a fixed cadence until the handle is aborted
    ///
    /// Unlike the bare processor loop, each cycle here also refreshes the
    /// derived streak state and republishes the widget snapshot, since a pull
    /// can change both.
    pub fn start_periodic_sync(&self, interval: Duration) -> JoinHandle<()> {
        let processor = self.processor.clone();
        let store = Arc::clone(&self.store);
        let remote = Arc::clone(&self.remote);
        let sink = Arc::clone(&self.widget_sink);
        let user_id = self.user_id.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = processor.run_sync_cycle().await {
                    tracing::warn!("Periodic sync cycle failed: {}", err);
                    continue;
                }
                match recalculate_streaks_inner(&store, &user_id, &events) {
                    Ok((_, summary)) => {
                        let remote = Arc::clone(&remote);
                        let store = Arc::clone(&store);
                        tokio::spawn(async move {
                            crate::sync::push_or_enqueue(
                                remote.as_ref(),
                                store.as_ref(),
                                PushKind::Update,
                                PendingPayload::UpsertAchievements(summary),
                            )
                            .await;
                        });
                    }
                    Err(err) => tracing::warn!("Post-sync streak recompute failed: {}", err),
                }
                if let Err(err) = publish_widget_inner(&store, &sink) {
                    tracing::warn!("Post-sync widget publish failed: {}", err);
                }
            }
        })
    }

    // ----- read surface -----

    pub fn habits(&self) -> Result<Vec<Habit>, EngineError> {
        Ok(lock(&self.store).list_habits()?)
    }

    pub fn completions_for(&self, habit_id: &HabitId) -> Result<Vec<Completion>, EngineError> {
        Ok(lock(&self.store).list_completions_by_habit(habit_id)?)
    }

    pub fn day_status(&self, date: NaiveDate) -> Result<Option<f64>, EngineError> {
        Ok(lock(&self.store).get_day_status(date)?)
    }

    pub fn month_statuses(
        &self,
        month: &str,
    ) -> Result<std::collections::BTreeMap<String, f64>, EngineError> {
        Ok(lock(&self.store).month_statuses(month)?)
    }

    /// Mutations still waiting to reach the remote service
    pub fn pending_operations(&self) -> Result<Vec<crate::sync::PendingOperation>, EngineError> {
        Ok(lock(&self.store).list_pending()?)
    }

    pub fn streak_state(&self) -> Result<StreakState, EngineError> {
        Ok(lock(&self.store).streak_state()?)
    }

    pub fn last_sync_time(&self) -> Result<Option<chrono::DateTime<chrono::Utc>>, EngineError> {
        Ok(lock(&self.store).last_sync_time()?)
    }

    /// The only user-visible failure channel; cleared explicitly by the UI
    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    pub fn clear_last_error(&self) {
        *lock(&self.last_error) = None;
    }

    /// Take the event receiver (achievement unlocks); single consumer
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<EngineEvent>> {
        lock(&self.events_rx).take()
    }

    pub fn set_widget_sink(&self, sink: Arc<dyn WidgetSink>) {
        *lock(&self.widget_sink) = Some(sink);
    }

    /// Await every in-flight remote push; used by tests and shutdown
    pub async fn flush_pushes(&self) {
        loop {
            let mut set = std::mem::take(&mut *lock(&self.pushes));
            if set.is_empty() {
                break;
            }
            while set.join_next().await.is_some() {}
        }
    }

    // ----- internals -----

    fn schedule_streak_recalc(&self) {
        let _ = self.streak_tx.send(());
    }

    fn spawn_push(&self, kind: PushKind, payload: PendingPayload) {
        let remote = Arc::clone(&self.remote);
        let store = Arc::clone(&self.store);
        lock(&self.pushes).spawn(async move {
            crate::sync::push_or_enqueue(remote.as_ref(), store.as_ref(), kind, payload).await;
        });
    }

    fn publish_widget(&self) -> Result<(), EngineError> {
        publish_widget_inner(&self.store, &self.widget_sink)
    }
}

fn publish_widget_inner(
    store: &Mutex<SqliteStore>,
    sink: &Mutex<Option<Arc<dyn WidgetSink>>>,
) -> Result<(), EngineError> {
    let Some(sink) = lock(sink).clone() else {
        return Ok(());
    };
    let (habits, completions) = {
        let store = lock(store);
        (store.list_habits()?, store.list_completions()?)
    };
    let snapshot = widget::build_snapshot(&habits, &completions, dates::today());
    sink.publish(&snapshot);
    Ok(())
}

/// Shared body of the streak recompute: capture the prior achievement set,
/// compute, persist, and emit unlock events
fn recalculate_streaks_inner(
    store: &Mutex<SqliteStore>,
    user_id: &UserId,
    events: &mpsc::UnboundedSender<EngineEvent>,
) -> Result<(Vec<u32>, AchievementSummary), EngineError> {
    let (newly, next) = {
        let store = lock(store);
        let habits = store.list_habits()?;
        let completions = store.list_completions()?;
        let prior = store.streak_state()?;
        let streak = derived::current_streak(&habits, &completions, dates::today());
        let (next, newly) = derived::recalculate(&prior, streak);
        store.put_streak_state(&next)?;
        (newly, next)
    };

    if !newly.is_empty() {
        tracing::info!("Milestones unlocked: {:?}", newly);
        let _ = events.send(EngineEvent::AchievementsUnlocked(newly.clone()));
    }
    let summary = AchievementSummary::from_state(user_id.clone(), &next);
    Ok((newly, summary))
}

/// Single debounced timer task for the streak recompute
///
/// Rapid toggles within the debounce window coalesce into one recalculation
/// over the latest state; the timer resets on each signal.
fn spawn_streak_debouncer<R: RemoteStore + 'static>(
    mut rx: mpsc::UnboundedReceiver<()>,
    store: Arc<Mutex<SqliteStore>>,
    remote: Arc<R>,
    user_id: UserId,
    events: mpsc::UnboundedSender<EngineEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let window = Duration::from_millis(STREAK_DEBOUNCE_MS);
        let mut open = true;
        while open {
            if rx.recv().await.is_none() {
                break;
            }
            loop {
                match tokio::time::timeout(window, rx.recv()).await {
                    Ok(Some(())) => continue,
                    Ok(None) => {
                        open = false;
                        break;
                    }
                    Err(_) => break,
                }
            }

            match recalculate_streaks_inner(&store, &user_id, &events) {
                Ok((_, summary)) => {
                    let remote = Arc::clone(&remote);
                    let store = Arc::clone(&store);
                    tokio::spawn(async move {
                        crate::sync::push_or_enqueue(
                            remote.as_ref(),
                            store.as_ref(),
                            PushKind::Update,
                            PendingPayload::UpsertAchievements(summary),
                        )
                        .await;
                    });
                }
                Err(err) => tracing::warn!("Debounced streak recompute failed: {}", err),
            }
        }
    })
}
