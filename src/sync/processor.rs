/// Sync processor: eventually converges local and remote state
///
/// Drains the pending-operation log against the remote service with a bounded
/// retry budget, and periodically replaces local state wholesale from a full
/// remote pull. Never blocks local reads or writes: remote calls run against
/// a snapshot and reacquire the store lock only to commit bookkeeping.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::task::JoinHandle;

use crate::derived::day_status;
use crate::domain::UserId;
use crate::remote::{RemoteError, RemoteStore};
use crate::store::{lock, LocalStore, SqliteStore, StoreError};
use crate::sync::{PendingOperation, PendingPayload};

/// Cadence of the periodic drain-then-reconcile cycle
pub const SYNC_INTERVAL_SECS: u64 = 45;

/// Whether an optimistic push is the row's first write or a later one
///
/// The remote service distinguishes insert from update; replays from the
/// pending log always use upsert instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    Create,
    Update,
}

/// Counters from a single drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub dropped: usize,
}

/// Drains the pending log and reconciles against the remote store
pub struct SyncProcessor<R> {
    store: Arc<Mutex<SqliteStore>>,
    remote: Arc<R>,
    user_id: UserId,
    last_error: Arc<Mutex<Option<String>>>,
}

impl<R> Clone for SyncProcessor<R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            remote: Arc::clone(&self.remote),
            user_id: self.user_id.clone(),
            last_error: Arc::clone(&self.last_error),
        }
    }
}

impl<R: RemoteStore + 'static> SyncProcessor<R> {
    pub fn new(
        store: Arc<Mutex<SqliteStore>>,
        remote: Arc<R>,
        user_id: UserId,
        last_error: Arc<Mutex<Option<String>>>,
    ) -> Self {
        Self {
            store,
            remote,
            user_id,
            last_error,
        }
    }

    /// One pass over the pending-operation log
    ///
    /// Each operation is skipped (still backing off), dropped (budget spent),
    /// or attempted once. This is a single pass, not a loop-until-empty;
    /// callers invoke it after mutations and on the periodic timer.
    pub async fn drain_pending_operations(&self) -> Result<DrainOutcome, StoreError> {
        let ops = lock(&self.store).list_pending()?;
        let now = Utc::now();
        let mut outcome = DrainOutcome::default();

        for op in ops {
            if op.exhausted() {
                tracing::warn!(
                    "Dropping pending operation {} after {} failed attempts; the row will not be pushed",
                    op.id,
                    op.retry_count
                );
                lock(&self.store).remove_pending(&op.id)?;
                outcome.dropped += 1;
                continue;
            }
            if !op.is_due(now) {
                outcome.skipped += 1;
                continue;
            }

            // Remote call runs without the store lock
            let result = replay(self.remote.as_ref(), &op.payload).await;
            match result {
                Ok(()) => {
                    lock(&self.store).remove_pending(&op.id)?;
                    outcome.succeeded += 1;
                }
                Err(err) => {
                    tracing::debug!("Pending operation {} failed: {}", op.id, err);
                    lock(&self.store).record_pending_attempt(
                        &op.id,
                        op.retry_count + 1,
                        Utc::now(),
                    )?;
                    outcome.failed += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Pull the complete remote collections and replace local state wholesale
    ///
    /// Last-pull-wins at the collection level, not a merge. A remote failure
    /// aborts without touching local state, records `last_error`, and returns
    /// `Ok(false)`; the next scheduled attempt simply retries from scratch.
    pub async fn full_reconcile(&self) -> Result<bool, StoreError> {
        let pull = match self.remote.pull_all(&self.user_id).await {
            Ok(pull) => pull,
            Err(err) => {
                tracing::warn!("Reconcile aborted: {}", err);
                *lock(&self.last_error) = Some(err.to_string());
                return Ok(false);
            }
        };

        let touched: BTreeSet<NaiveDate> =
            pull.completions.iter().map(|c| c.completion_date).collect();
        let touched: Vec<NaiveDate> = touched.into_iter().collect();
        let achievements = pull.streak_state();

        {
            let store = lock(&self.store);
            store.replace_collections(&pull.habits, &pull.completions, achievements.as_ref())?;
            day_status::refresh_days(&*store, &touched)?;
            store.set_last_sync_time(Utc::now())?;
        }

        tracing::info!(
            "Reconciled from remote: {} habits, {} completions",
            pull.habits.len(),
            pull.completions.len()
        );
        Ok(true)
    }

    /// Drain, then reconcile: queued writes are always attempted before a
    /// pull can overwrite them
    pub async fn run_sync_cycle(&self) -> Result<(), StoreError> {
        self.drain_pending_operations().await?;
        self.full_reconcile().await?;
        Ok(())
    }

    /// Run sync cycles forever on a fixed cadence
    pub fn spawn_periodic(&self, interval: Duration) -> JoinHandle<()> {
        let processor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = processor.run_sync_cycle().await {
                    tracing::warn!("Periodic sync cycle failed: {}", err);
                }
            }
        })
    }
}

/// Replay a queued operation against the remote store
///
/// Replays always use upsert for row snapshots. A habit delete replays both
/// remote calls (completions first, then the habit row), mirroring the
/// original delete path.
async fn replay<R: RemoteStore>(remote: &R, payload: &PendingPayload) -> Result<(), RemoteError> {
    match payload {
        PendingPayload::UpsertHabit(habit) => remote.upsert_habit(habit).await,
        PendingPayload::UpsertCompletion(completion) => remote.upsert_completion(completion).await,
        PendingPayload::UpsertAchievements(summary) => remote.upsert_achievements(summary).await,
        PendingPayload::DeleteHabit(id) => {
            remote.delete_completions_by_habit(id).await?;
            remote.delete_habit(id).await
        }
    }
}

/// First (optimistic) attempt for a freshly committed local write
async fn first_attempt<R: RemoteStore>(
    remote: &R,
    kind: PushKind,
    payload: &PendingPayload,
) -> Result<(), RemoteError> {
    match (payload, kind) {
        (PendingPayload::UpsertHabit(habit), PushKind::Create) => remote.insert_habit(habit).await,
        (PendingPayload::UpsertHabit(habit), PushKind::Update) => remote.update_habit(habit).await,
        (PendingPayload::UpsertCompletion(completion), PushKind::Create) => {
            remote.insert_completion(completion).await
        }
        (PendingPayload::UpsertCompletion(completion), PushKind::Update) => {
            remote.update_completion(completion).await
        }
        _ => replay(remote, payload).await,
    }
}

/// Attempt a remote write; on any failure, capture the snapshot as a pending
/// operation instead of surfacing an error
///
/// This is the back half of every optimistic mutation: the local write has
/// already committed by the time this runs, and nothing here can fail the
/// mutation retroactively.
pub(crate) async fn push_or_enqueue<R: RemoteStore>(
    remote: &R,
    store: &Mutex<SqliteStore>,
    kind: PushKind,
    payload: PendingPayload,
) {
    if let Err(err) = first_attempt(remote, kind, &payload).await {
        tracing::debug!("Remote write failed, queuing for retry: {}", err);
        let op = PendingOperation::new(payload);
        if let Err(store_err) = lock(store).enqueue_pending(&op) {
            tracing::warn!("Failed to enqueue pending operation {}: {}", op.id, store_err);
        }
    }
}
