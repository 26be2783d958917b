/// Integration tests for the sync processor: pending-log drains, retry
/// budgets, and wholesale reconciliation.

mod common;

use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};

use habit_sync::domain::CompletionStatus;
use habit_sync::store::{LocalStore, SqliteStore};
use habit_sync::sync::{
    PendingOperation, PendingPayload, SyncProcessor, MAX_RETRY_ATTEMPTS,
};
use habit_sync::Completion;

use common::{day, daily_habit, mem_store, user, MockRemote};

fn processor(
    store: SqliteStore,
    remote: Arc<MockRemote>,
) -> (SyncProcessor<MockRemote>, Arc<Mutex<SqliteStore>>, Arc<Mutex<Option<String>>>) {
    let store = Arc::new(Mutex::new(store));
    let last_error = Arc::new(Mutex::new(None));
    let proc = SyncProcessor::new(
        Arc::clone(&store),
        remote,
        user(),
        Arc::clone(&last_error),
    );
    (proc, store, last_error)
}

#[tokio::test]
async fn failed_operations_back_off_and_are_dropped_after_budget() {
    let remote = Arc::new(MockRemote::new());
    remote.set_offline(true);
    let (proc, store, _) = processor(mem_store(), Arc::clone(&remote));

    let habit = daily_habit("Run", day(2024, 1, 1));
    let op = PendingOperation::new(PendingPayload::UpsertHabit(habit));
    let op_id = op.id.clone();
    store.lock().unwrap().enqueue_pending(&op).unwrap();

    // First drain attempts once and fails
    let outcome = proc.drain_pending_operations().await.unwrap();
    assert_eq!(outcome.failed, 1);
    let pending = store.lock().unwrap().list_pending().unwrap();
    assert_eq!(pending[0].retry_count, 1);

    // Immediately draining again skips it: still inside the backoff window
    let outcome = proc.drain_pending_operations().await.unwrap();
    assert_eq!(outcome.skipped, 1);
    assert_eq!(outcome.failed, 0);

    // Age the attempt past the backoff window with one retry left
    store
        .lock()
        .unwrap()
        .record_pending_attempt(&op_id, MAX_RETRY_ATTEMPTS - 1, Utc::now() - Duration::hours(1))
        .unwrap();
    let outcome = proc.drain_pending_operations().await.unwrap();
    assert_eq!(outcome.failed, 1);

    // Budget is now spent: the operation is dropped without a remote call
    let calls_before = remote.call_count();
    let outcome = proc.drain_pending_operations().await.unwrap();
    assert_eq!(outcome.dropped, 1);
    assert_eq!(remote.call_count(), calls_before);
    assert!(store.lock().unwrap().list_pending().unwrap().is_empty());
}

#[tokio::test]
async fn drain_removes_operations_once_the_remote_accepts_them() {
    let remote = Arc::new(MockRemote::new());
    remote.set_offline(true);
    let (proc, store, _) = processor(mem_store(), Arc::clone(&remote));

    let habit = daily_habit("Read", day(2024, 1, 1));
    let op = PendingOperation::new(PendingPayload::UpsertHabit(habit.clone()));
    store.lock().unwrap().enqueue_pending(&op).unwrap();

    proc.drain_pending_operations().await.unwrap();
    assert_eq!(store.lock().unwrap().list_pending().unwrap().len(), 1);

    // Connectivity returns; age the attempt so the op is due again
    remote.set_offline(false);
    store
        .lock()
        .unwrap()
        .record_pending_attempt(&op.id, 1, Utc::now() - Duration::hours(1))
        .unwrap();
    let outcome = proc.drain_pending_operations().await.unwrap();
    assert_eq!(outcome.succeeded, 1);
    assert!(store.lock().unwrap().list_pending().unwrap().is_empty());
    assert!(remote.has_habit(&habit.id));
}

#[tokio::test]
async fn reconcile_replaces_local_state_instead_of_merging() {
    let remote = Arc::new(MockRemote::new());
    let (proc, store, _) = processor(mem_store(), Arc::clone(&remote));

    // Local-only habit with a completion; the remote knows a different habit
    let local_only = daily_habit("Local Only", day(2024, 1, 1));
    let completion = Completion::new(
        local_only.id.clone(),
        user(),
        day(2024, 1, 2),
        CompletionStatus::Completed,
        1.0,
    );
    {
        let store = store.lock().unwrap();
        store.put_habit(&local_only).unwrap();
        store.put_completion(&completion).unwrap();
    }
    let remote_habit = daily_habit("Remote Truth", day(2024, 2, 1));
    remote.seed_habit(remote_habit.clone());

    let pulled = proc.full_reconcile().await.unwrap();
    assert!(pulled);

    let store = store.lock().unwrap();
    let habits = store.list_habits().unwrap();
    assert_eq!(habits.len(), 1);
    assert_eq!(habits[0].id, remote_habit.id);
    assert!(store.list_completions().unwrap().is_empty());
    assert!(store.last_sync_time().unwrap().is_some());
}

#[tokio::test]
async fn failed_reconcile_records_error_and_leaves_local_state_alone() {
    let remote = Arc::new(MockRemote::new());
    remote.set_offline(true);
    let (proc, store, last_error) = processor(mem_store(), Arc::clone(&remote));

    let habit = daily_habit("Stretch", day(2024, 1, 1));
    store.lock().unwrap().put_habit(&habit).unwrap();

    let pulled = proc.full_reconcile().await.unwrap();
    assert!(!pulled);
    assert!(last_error.lock().unwrap().is_some());

    let store = store.lock().unwrap();
    assert_eq!(store.list_habits().unwrap().len(), 1);
    assert!(store.last_sync_time().unwrap().is_none());
}

#[tokio::test]
async fn sync_cycle_pushes_queued_writes_before_pulling() {
    let remote = Arc::new(MockRemote::new());
    let (proc, store, _) = processor(mem_store(), Arc::clone(&remote));

    // A queued habit the remote has never seen; if the pull ran first, the
    // wholesale replace would erase it locally
    let habit = daily_habit("Meditate", day(2024, 1, 1));
    {
        let store = store.lock().unwrap();
        store.put_habit(&habit).unwrap();
        store
            .enqueue_pending(&PendingOperation::new(PendingPayload::UpsertHabit(
                habit.clone(),
            )))
            .unwrap();
    }

    proc.run_sync_cycle().await.unwrap();

    assert!(remote.has_habit(&habit.id));
    let store = store.lock().unwrap();
    assert_eq!(store.list_habits().unwrap().len(), 1);
    assert!(store.list_pending().unwrap().is_empty());
}

#[tokio::test]
async fn delete_replay_clears_completions_then_the_habit() {
    let remote = Arc::new(MockRemote::new());
    let (proc, store, _) = processor(mem_store(), Arc::clone(&remote));

    let habit = daily_habit("Journal", day(2024, 1, 1));
    remote.seed_habit(habit.clone());
    remote.seed_completion(Completion::new(
        habit.id.clone(),
        user(),
        day(2024, 1, 2),
        CompletionStatus::Completed,
        1.0,
    ));

    store
        .lock()
        .unwrap()
        .enqueue_pending(&PendingOperation::new(PendingPayload::DeleteHabit(
            habit.id.clone(),
        )))
        .unwrap();

    let outcome = proc.drain_pending_operations().await.unwrap();
    assert_eq!(outcome.succeeded, 1);
    assert!(!remote.has_habit(&habit.id));
    assert_eq!(remote.completion_count(), 0);
}
