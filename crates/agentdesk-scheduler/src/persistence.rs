//! SQLite-backed task record store.
//! One row per task; schedule and target payloads are stored as JSON columns.

use std::path::Path;
use std::sync::Mutex;

use agentdesk_core::StoreError;
use rusqlite::{Connection, OptionalExtension, params};

use crate::store::TaskRecordStore;
use crate::tasks::{Action, NextExecution, Schedule, Task, TaskStatus, Timestamp};

const SELECT_TASKS: &str = "SELECT id, name, description, action_type, target, schedule_type,
        schedule_config, status, created_at, next_execution, last_execution,
        execution_count, max_executions, enabled, last_error
     FROM scheduler_tasks ORDER BY rowid";

/// SQLite-backed persistence store for scheduler tasks.
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

impl SqliteTaskStore {
    /// Open or create the scheduler database.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db)?;
        Self::from_connection(conn)
    }

    /// In-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory().map_err(db)?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<(), StoreError> {
        self.lock()
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS scheduler_tasks (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                action_type TEXT NOT NULL,       -- 'agent_execution', 'email_send', ...
                target TEXT NOT NULL,            -- JSON payload for action_type
                schedule_type TEXT NOT NULL,     -- 'datetime', 'recurring', 'seasonal', 'conditional'
                schedule_config TEXT NOT NULL,   -- JSON payload for schedule_type
                status TEXT NOT NULL DEFAULT 'planned',
                created_at TEXT NOT NULL,
                next_execution TEXT,             -- JSON: {kind, value}
                last_execution TEXT,
                execution_count INTEGER NOT NULL DEFAULT 0,
                max_executions INTEGER NOT NULL DEFAULT -1,
                enabled INTEGER NOT NULL DEFAULT 1,
                last_error TEXT
            );
            ",
            )
            .map_err(db)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn upsert(conn: &Connection, task: &Task) -> Result<(), StoreError> {
        let (action_type, target) = split_tagged(&task.action, "action_type", "target")?;
        let (schedule_type, schedule_config) =
            split_tagged(&task.schedule, "schedule_type", "schedule_config")?;
        let next_execution = task
            .next_execution
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Serialize(e.to_string()))?;

        conn.execute(
            "INSERT INTO scheduler_tasks
                 (id, name, description, action_type, target, schedule_type, schedule_config,
                  status, created_at, next_execution, last_execution, execution_count,
                  max_executions, enabled, last_error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 action_type = excluded.action_type,
                 target = excluded.target,
                 schedule_type = excluded.schedule_type,
                 schedule_config = excluded.schedule_config,
                 status = excluded.status,
                 created_at = excluded.created_at,
                 next_execution = excluded.next_execution,
                 last_execution = excluded.last_execution,
                 execution_count = excluded.execution_count,
                 max_executions = excluded.max_executions,
                 enabled = excluded.enabled,
                 last_error = excluded.last_error",
            params![
                task.id,
                task.name,
                task.description,
                action_type,
                target,
                schedule_type,
                schedule_config,
                task.status.to_string(),
                format_ts(&task.created_at),
                next_execution,
                task.last_execution.as_ref().map(format_ts),
                task.execution_count,
                task.max_executions,
                task.enabled as i32,
                task.last_error,
            ],
        )
        .map_err(db)?;
        Ok(())
    }

    /// Fetch a single record.
    pub fn get(&self, id: &str) -> Result<Option<Task>, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                &SELECT_TASKS.replace("ORDER BY rowid", "WHERE id = ?1"),
                [id],
                read_row,
            )
            .optional()
            .map_err(db)?;
        row.map(decode).transpose()
    }
}

impl TaskRecordStore for SqliteTaskStore {
    fn load_all(&self) -> Result<Vec<Task>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(SELECT_TASKS).map_err(db)?;
        let rows = stmt
            .query_map([], read_row)
            .map_err(db)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db)?;
        rows.into_iter().map(decode).collect()
    }

    fn put(&self, task: &Task) -> Result<(), StoreError> {
        Self::upsert(&self.lock(), task)
    }

    fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.lock()
            .execute("DELETE FROM scheduler_tasks WHERE id = ?1", [id])
            .map_err(db)?;
        Ok(())
    }

    fn replace_all(&self, tasks: &[Task]) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(db)?;
        tx.execute("DELETE FROM scheduler_tasks", []).map_err(db)?;
        for task in tasks {
            Self::upsert(&tx, task)?;
        }
        tx.commit().map_err(db)
    }
}

/// Raw column values, decoded outside the rusqlite closure so JSON errors
/// surface as [`StoreError`]s.
struct Row {
    id: String,
    name: String,
    description: String,
    action_type: String,
    target: String,
    schedule_type: String,
    schedule_config: String,
    status: String,
    created_at: String,
    next_execution: Option<String>,
    last_execution: Option<String>,
    execution_count: u32,
    max_executions: i64,
    enabled: bool,
    last_error: Option<String>,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    Ok(Row {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        action_type: row.get(3)?,
        target: row.get(4)?,
        schedule_type: row.get(5)?,
        schedule_config: row.get(6)?,
        status: row.get(7)?,
        created_at: row.get(8)?,
        next_execution: row.get(9)?,
        last_execution: row.get(10)?,
        execution_count: row.get(11)?,
        max_executions: row.get(12)?,
        enabled: row.get::<_, i32>(13)? != 0,
        last_error: row.get(14)?,
    })
}

fn decode(row: Row) -> Result<Task, StoreError> {
    let action: Action = join_tagged("action_type", &row.action_type, "target", &row.target)?;
    let schedule: Schedule = join_tagged(
        "schedule_type",
        &row.schedule_type,
        "schedule_config",
        &row.schedule_config,
    )?;
    let status: TaskStatus = row.status.parse().map_err(StoreError::Serialize)?;
    let next_execution: Option<NextExecution> = row
        .next_execution
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| StoreError::Serialize(format!("next_execution of {}: {e}", row.id)))?;

    Ok(Task {
        created_at: parse_ts(&row.created_at)?,
        last_execution: row.last_execution.as_deref().map(parse_ts).transpose()?,
        id: row.id,
        name: row.name,
        description: row.description,
        action,
        schedule,
        status,
        next_execution,
        execution_count: row.execution_count,
        max_executions: row.max_executions,
        enabled: row.enabled,
        last_error: row.last_error,
    })
}

/// Split an adjacently tagged enum into its tag and JSON content.
fn split_tagged<T: serde::Serialize>(
    value: &T,
    tag: &str,
    content: &str,
) -> Result<(String, String), StoreError> {
    let json = serde_json::to_value(value).map_err(|e| StoreError::Serialize(e.to_string()))?;
    let tag_value = json[tag]
        .as_str()
        .ok_or_else(|| StoreError::Serialize(format!("missing '{tag}'")))?
        .to_string();
    Ok((tag_value, json[content].to_string()))
}

fn join_tagged<T: serde::de::DeserializeOwned>(
    tag: &str,
    tag_value: &str,
    content: &str,
    content_json: &str,
) -> Result<T, StoreError> {
    let payload: serde_json::Value = serde_json::from_str(content_json)
        .map_err(|e| StoreError::Serialize(format!("{content}: {e}")))?;
    let mut tagged = serde_json::Map::new();
    tagged.insert(tag.to_string(), serde_json::Value::String(tag_value.to_string()));
    tagged.insert(content.to_string(), payload);
    serde_json::from_value(serde_json::Value::Object(tagged))
        .map_err(|e| StoreError::Serialize(format!("{tag}={tag_value}: {e}")))
}

fn format_ts(ts: &Timestamp) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

fn parse_ts(raw: &str) -> Result<Timestamp, StoreError> {
    crate::tasks::parse_datetime(raw)
        .ok_or_else(|| StoreError::Serialize(format!("bad timestamp '{raw}'")))
}

fn db(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}
