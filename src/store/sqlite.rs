/// SQLite implementation of the local store
///
/// This module provides the concrete SQLite implementation for the durable
/// collections, the pending-operation log, the derived caches, and the sync
/// watermark. Enum-shaped fields (frequency, goal, pending payloads, the
/// achievement set) are stored as JSON text columns.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::derived::StreakState;
use crate::domain::{dates, Completion, CompletionId, CompletionStatus, Habit, HabitId, UserId};
use crate::store::{migrations, LocalStore, StoreError};
use crate::sync::{PendingOperation, PendingPayload};

const HABIT_COLUMNS: &str = "id, user_id, name, frequency, start_date, end_date, goal, \
     completions_per_day, is_active, sort_order, icon, color, created_at, updated_at";

const COMPLETION_COLUMNS: &str =
    "id, habit_id, completion_date, status, value, user_id, updated_at";

const LAST_SYNC_KEY: &str = "last_sync_time";

/// SQLite-based storage
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at the given path and run migrations
    pub fn new(db_path: PathBuf) -> Result<Self, StoreError> {
        let conn = Connection::open(&db_path)
            .map_err(|e| StoreError::Connection(format!("Failed to open database: {}", e)))?;
        Self::initialize(conn, Some(&db_path))
    }

    /// An in-memory database, used by tests
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Connection(format!("Failed to open database: {}", e)))?;
        Self::initialize(conn, None)
    }

    fn initialize(conn: Connection, path: Option<&PathBuf>) -> Result<Self, StoreError> {
        conn.execute("PRAGMA foreign_keys = ON", [])
            .map_err(|e| StoreError::Connection(format!("Failed to enable foreign keys: {}", e)))?;
        migrations::initialize_database(&conn)?;
        if let Some(path) = path {
            tracing::info!("SQLite store initialized at: {:?}", path);
        }
        Ok(Self { conn })
    }

    fn habit_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Habit> {
        let id_str: String = row.get(0)?;
        let id = HabitId::from_string(&id_str).map_err(|_| {
            rusqlite::Error::InvalidColumnType(0, "Invalid UUID".to_string(), rusqlite::types::Type::Text)
        })?;

        let frequency_json: String = row.get(3)?;
        let frequency = serde_json::from_str(&frequency_json).map_err(|_| {
            rusqlite::Error::InvalidColumnType(3, "Invalid frequency".to_string(), rusqlite::types::Type::Text)
        })?;

        let start_date = parse_date(row, 4)?;
        let end_date: Option<String> = row.get(5)?;
        let end_date = match end_date {
            Some(s) => Some(parse_date_str(&s, 5)?),
            None => None,
        };

        let goal_json: Option<String> = row.get(6)?;
        let goal = match goal_json {
            Some(s) => Some(serde_json::from_str(&s).map_err(|_| {
                rusqlite::Error::InvalidColumnType(6, "Invalid goal".to_string(), rusqlite::types::Type::Text)
            })?),
            None => None,
        };

        Ok(Habit {
            id,
            user_id: UserId::new(row.get::<_, String>(1)?),
            name: row.get(2)?,
            frequency,
            start_date,
            end_date,
            goal,
            completions_per_day: row.get(7)?,
            is_active: row.get(8)?,
            sort_order: row.get(9)?,
            icon: row.get(10)?,
            color: row.get(11)?,
            created_at: parse_datetime(row, 12)?,
            updated_at: parse_datetime(row, 13)?,
        })
    }

    fn completion_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Completion> {
        let id_str: String = row.get(0)?;
        let id = CompletionId::from_string(&id_str).map_err(|_| {
            rusqlite::Error::InvalidColumnType(0, "Invalid UUID".to_string(), rusqlite::types::Type::Text)
        })?;
        let habit_id_str: String = row.get(1)?;
        let habit_id = HabitId::from_string(&habit_id_str).map_err(|_| {
            rusqlite::Error::InvalidColumnType(1, "Invalid UUID".to_string(), rusqlite::types::Type::Text)
        })?;

        let status_str: String = row.get(3)?;
        let status = CompletionStatus::parse(&status_str).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(3, "Invalid status".to_string(), rusqlite::types::Type::Text)
        })?;

        Ok(Completion {
            id,
            habit_id,
            completion_date: parse_date(row, 2)?,
            status,
            value: row.get(4)?,
            user_id: UserId::new(row.get::<_, String>(5)?),
            updated_at: parse_datetime(row, 6)?,
        })
    }

    fn pending_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingOperation> {
        let payload_json: String = row.get(1)?;
        let payload: PendingPayload = serde_json::from_str(&payload_json).map_err(|_| {
            rusqlite::Error::InvalidColumnType(1, "Invalid payload".to_string(), rusqlite::types::Type::Text)
        })?;
        let last_attempt_at: Option<String> = row.get(4)?;
        let last_attempt_at = match last_attempt_at {
            Some(s) => Some(parse_datetime_str(&s, 4)?),
            None => None,
        };

        Ok(PendingOperation {
            id: row.get(0)?,
            payload,
            enqueued_at: parse_datetime(row, 2)?,
            retry_count: row.get(3)?,
            last_attempt_at,
        })
    }

    fn insert_habit(conn: &Connection, habit: &Habit) -> Result<(), StoreError> {
        let frequency_json = serde_json::to_string(&habit.frequency)?;
        let goal_json = habit.goal.as_ref().map(serde_json::to_string).transpose()?;

        conn.execute(
            "INSERT OR REPLACE INTO habits (
                id, user_id, name, frequency, start_date, end_date, goal,
                completions_per_day, is_active, sort_order, icon, color,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                habit.id.to_string(),
                habit.user_id.as_str(),
                habit.name,
                frequency_json,
                dates::day_key(habit.start_date),
                habit.end_date.map(dates::day_key),
                goal_json,
                habit.completions_per_day,
                habit.is_active,
                habit.sort_order,
                habit.icon,
                habit.color,
                habit.created_at.to_rfc3339(),
                habit.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn insert_completion(conn: &Connection, completion: &Completion) -> Result<(), StoreError> {
        conn.execute(
            "INSERT OR REPLACE INTO completions (
                id, habit_id, completion_date, status, value, user_id, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                completion.id.to_string(),
                completion.habit_id.to_string(),
                dates::day_key(completion.completion_date),
                completion.status.as_str(),
                completion.value,
                completion.user_id.as_str(),
                completion.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn upsert_streak_state(conn: &Connection, state: &StreakState) -> Result<(), StoreError> {
        let achievements_json = serde_json::to_string(&state.achievements)?;
        conn.execute(
            "INSERT OR REPLACE INTO streak_state (
                id, current_streak, max_streak, achievements, updated_at
            ) VALUES (1, ?1, ?2, ?3, ?4)",
            params![
                state.current_streak,
                state.max_streak,
                achievements_json,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

fn parse_date(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    parse_date_str(&s, idx)
}

fn parse_date_str(s: &str, idx: usize) -> rusqlite::Result<NaiveDate> {
    dates::parse_day_key(s).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(idx, "Invalid date".to_string(), rusqlite::types::Type::Text)
    })
}

fn parse_datetime(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_datetime_str(&s, idx)
}

fn parse_datetime_str(s: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::InvalidColumnType(idx, "Invalid datetime".to_string(), rusqlite::types::Type::Text)
        })
}

impl LocalStore for SqliteStore {
    fn put_habit(&self, habit: &Habit) -> Result<(), StoreError> {
        Self::insert_habit(&self.conn, habit)?;
        tracing::debug!("Stored habit: {} ({})", habit.name, habit.id);
        Ok(())
    }

    fn get_habit(&self, id: &HabitId) -> Result<Option<Habit>, StoreError> {
        let sql = format!("SELECT {} FROM habits WHERE id = ?1", HABIT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let habit = stmt
            .query_row(params![id.to_string()], Self::habit_from_row)
            .optional()?;
        Ok(habit)
    }

    fn list_habits(&self) -> Result<Vec<Habit>, StoreError> {
        let sql = format!("SELECT {} FROM habits ORDER BY sort_order, created_at", HABIT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::habit_from_row)?;

        let mut habits = Vec::new();
        for habit in rows {
            habits.push(habit?);
        }
        Ok(habits)
    }

    fn delete_habit(&self, id: &HabitId) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM habits WHERE id = ?1", params![id.to_string()])?;
        tracing::debug!("Deleted habit: {}", id);
        Ok(())
    }

    fn put_completion(&self, completion: &Completion) -> Result<(), StoreError> {
        Self::insert_completion(&self.conn, completion)?;
        tracing::debug!(
            "Stored completion {} for habit {} on {}",
            completion.id,
            completion.habit_id,
            completion.completion_date
        );
        Ok(())
    }

    fn get_completion(&self, id: &CompletionId) -> Result<Option<Completion>, StoreError> {
        let sql = format!("SELECT {} FROM completions WHERE id = ?1", COMPLETION_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let completion = stmt
            .query_row(params![id.to_string()], Self::completion_from_row)
            .optional()?;
        Ok(completion)
    }

    fn find_completion(
        &self,
        habit_id: &HabitId,
        date: NaiveDate,
    ) -> Result<Option<Completion>, StoreError> {
        let sql = format!(
            "SELECT {} FROM completions WHERE habit_id = ?1 AND completion_date = ?2
             ORDER BY updated_at DESC LIMIT 1",
            COMPLETION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let completion = stmt
            .query_row(
                params![habit_id.to_string(), dates::day_key(date)],
                Self::completion_from_row,
            )
            .optional()?;
        Ok(completion)
    }

    fn list_completions(&self) -> Result<Vec<Completion>, StoreError> {
        let sql = format!(
            "SELECT {} FROM completions ORDER BY completion_date",
            COMPLETION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::completion_from_row)?;

        let mut completions = Vec::new();
        for completion in rows {
            completions.push(completion?);
        }
        Ok(completions)
    }

    fn list_completions_by_habit(&self, habit_id: &HabitId) -> Result<Vec<Completion>, StoreError> {
        let sql = format!(
            "SELECT {} FROM completions WHERE habit_id = ?1 ORDER BY completion_date",
            COMPLETION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![habit_id.to_string()], Self::completion_from_row)?;

        let mut completions = Vec::new();
        for completion in rows {
            completions.push(completion?);
        }
        Ok(completions)
    }

    fn delete_completions_by_habit(&self, habit_id: &HabitId) -> Result<usize, StoreError> {
        let deleted = self.conn.execute(
            "DELETE FROM completions WHERE habit_id = ?1",
            params![habit_id.to_string()],
        )?;
        tracing::debug!("Deleted {} completions for habit {}", deleted, habit_id);
        Ok(deleted)
    }

    fn enqueue_pending(&self, op: &PendingOperation) -> Result<(), StoreError> {
        let payload_json = serde_json::to_string(&op.payload)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO pending_operations (
                id, payload, enqueued_at, retry_count, last_attempt_at
            ) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                op.id,
                payload_json,
                op.enqueued_at.to_rfc3339(),
                op.retry_count,
                op.last_attempt_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        tracing::debug!("Enqueued pending operation {}", op.id);
        Ok(())
    }

    fn list_pending(&self) -> Result<Vec<PendingOperation>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, payload, enqueued_at, retry_count, last_attempt_at
             FROM pending_operations ORDER BY enqueued_at",
        )?;
        let rows = stmt.query_map([], Self::pending_from_row)?;

        let mut ops = Vec::new();
        for op in rows {
            ops.push(op?);
        }
        Ok(ops)
    }

    fn remove_pending(&self, id: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM pending_operations WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn record_pending_attempt(
        &self,
        id: &str,
        retry_count: u32,
        attempted_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE pending_operations SET retry_count = ?2, last_attempt_at = ?3 WHERE id = ?1",
            params![id, retry_count, attempted_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn put_day_status(&self, day: NaiveDate, grade: f64) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO day_status (day, month, grade) VALUES (?1, ?2, ?3)",
            params![dates::day_key(day), dates::month_key(day), grade],
        )?;
        Ok(())
    }

    fn delete_day_status(&self, day: NaiveDate) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM day_status WHERE day = ?1",
            params![dates::day_key(day)],
        )?;
        Ok(())
    }

    fn get_day_status(&self, day: NaiveDate) -> Result<Option<f64>, StoreError> {
        let grade = self
            .conn
            .query_row(
                "SELECT grade FROM day_status WHERE day = ?1",
                params![dates::day_key(day)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(grade)
    }

    fn month_statuses(&self, month: &str) -> Result<BTreeMap<String, f64>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT day, grade FROM day_status WHERE month = ?1")?;
        let rows = stmt.query_map(params![month], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;

        let mut statuses = BTreeMap::new();
        for row in rows {
            let (day, grade) = row?;
            statuses.insert(day, grade);
        }
        Ok(statuses)
    }

    fn streak_state(&self) -> Result<StreakState, StoreError> {
        let state = self
            .conn
            .query_row(
                "SELECT current_streak, max_streak, achievements FROM streak_state WHERE id = 1",
                [],
                |row| {
                    let achievements_json: String = row.get(2)?;
                    let achievements = serde_json::from_str(&achievements_json).map_err(|_| {
                        rusqlite::Error::InvalidColumnType(
                            2,
                            "Invalid achievements".to_string(),
                            rusqlite::types::Type::Text,
                        )
                    })?;
                    Ok(StreakState {
                        current_streak: row.get(0)?,
                        max_streak: row.get(1)?,
                        achievements,
                    })
                },
            )
            .optional()?;
        Ok(state.unwrap_or_default())
    }

    fn put_streak_state(&self, state: &StreakState) -> Result<(), StoreError> {
        Self::upsert_streak_state(&self.conn, state)
    }

    fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM sync_meta WHERE key = ?1",
                params![LAST_SYNC_KEY],
                |row| row.get(0),
            )
            .optional()?;
        match value {
            Some(s) => {
                let at = DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| StoreError::Connection(format!("Invalid sync watermark: {}", e)))?;
                Ok(Some(at))
            }
            None => Ok(None),
        }
    }

    fn set_last_sync_time(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sync_meta (key, value) VALUES (?1, ?2)",
            params![LAST_SYNC_KEY, at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn replace_collections(
        &self,
        habits: &[Habit],
        completions: &[Completion],
        achievements: Option<&StreakState>,
    ) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM habits", [])?;
        tx.execute("DELETE FROM completions", [])?;
        for habit in habits {
            Self::insert_habit(&tx, habit)?;
        }
        for completion in completions {
            Self::insert_completion(&tx, completion)?;
        }
        if let Some(state) = achievements {
            Self::upsert_streak_state(&tx, state)?;
        }
        tx.commit()?;

        tracing::debug!(
            "Replaced local collections: {} habits, {} completions",
            habits.len(),
            completions.len()
        );
        Ok(())
    }
}
