use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use crate::errors::{BoardError, BoardResult};

use super::models::*;
use super::position::Shift;
use super::unit_of_work::UnitOfWork;

/// Async-safe handle to the board database.
///
/// Wraps `BoardDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, preventing synchronous SQLite
/// I/O from tying up async worker threads. Transactions are serialized by
/// the mutex, and commit hooks run before it is released.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<BoardDb>>,
}

impl DbHandle {
    pub fn new(db: BoardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    ///
    /// Once the closure has been scheduled it runs to completion even if the
    /// awaiting future is dropped.
    pub async fn call<F, R>(&self, f: F) -> BoardResult<R>
    where
        F: FnOnce(&mut BoardDb) -> BoardResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = db.lock().map_err(|_| BoardError::LockPoisoned)?;
            f(&mut guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. Used for startup
    /// initialization and tests; never from a hot async path.
    pub fn lock_sync(&self) -> BoardResult<std::sync::MutexGuard<'_, BoardDb>> {
        self.inner.lock().map_err(|_| BoardError::LockPoisoned)
    }
}

pub struct BoardDb {
    conn: Connection,
}

impl BoardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS boards (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    revision INTEGER NOT NULL DEFAULT 0,
                    date_modified TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS board_columns (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    board_id INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    position INTEGER NOT NULL,
                    archived INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    column_id INTEGER NOT NULL REFERENCES board_columns(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    position INTEGER NOT NULL,
                    archived INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS collaborators (
                    board_id INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL,
                    role TEXT NOT NULL DEFAULT 'MEMBER',
                    joined_at TEXT NOT NULL DEFAULT (datetime('now')),
                    PRIMARY KEY (board_id, user_id)
                );

                CREATE INDEX IF NOT EXISTS idx_columns_board ON board_columns(board_id, archived, position);
                CREATE INDEX IF NOT EXISTS idx_tasks_column ON tasks(column_id, archived, position);
                CREATE INDEX IF NOT EXISTS idx_collaborators_user ON collaborators(user_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a write transaction. `IMMEDIATE` takes the write lock up front,
    /// so rows read inside it cannot change underneath the caller.
    pub fn begin(&mut self) -> BoardResult<UnitOfWork<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin transaction")?;
        Ok(UnitOfWork::new(tx))
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ── Ordered items ─────────────────────────────────────────────────────

fn ordered_item_sql(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Column => {
            "SELECT id, board_id, board_id, position, archived FROM board_columns WHERE id = ?1"
        }
        ItemKind::Task => {
            "SELECT t.id, t.column_id, c.board_id, t.position, t.archived
             FROM tasks t JOIN board_columns c ON c.id = t.column_id
             WHERE t.id = ?1"
        }
    }
}

pub fn find_item(conn: &Connection, kind: ItemKind, id: i64) -> Result<Option<OrderedItem>> {
    conn.query_row(ordered_item_sql(kind), params![id], |row| {
        Ok(OrderedItem {
            kind,
            id: row.get(0)?,
            container_id: row.get(1)?,
            board_id: row.get(2)?,
            position: row.get(3)?,
            archived: row.get(4)?,
        })
    })
    .optional()
    .with_context(|| format!("Failed to read {} {}", kind.label(), id))
}

/// Read an item for update. Must be called inside a [`UnitOfWork`], whose
/// `IMMEDIATE` transaction holds the write lock until commit or rollback.
pub fn lock_item(uow: &UnitOfWork<'_>, kind: ItemKind, id: i64) -> Result<Option<OrderedItem>> {
    find_item(uow.conn(), kind, id)
}

/// Where a container lives and whether it is still live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: i64,
    pub board_id: i64,
    pub archived: bool,
}

/// Look up the container that holds items of `kind`.
pub fn find_container(
    conn: &Connection,
    kind: ItemKind,
    container_id: i64,
) -> Result<Option<ContainerInfo>> {
    let sql = match kind {
        ItemKind::Column => "SELECT id, id, 0 FROM boards WHERE id = ?1",
        ItemKind::Task => "SELECT id, board_id, archived FROM board_columns WHERE id = ?1",
    };
    conn.query_row(sql, params![container_id], |row| {
        Ok(ContainerInfo {
            id: row.get(0)?,
            board_id: row.get(1)?,
            archived: row.get(2)?,
        })
    })
    .optional()
    .context("Failed to read container")
}

pub fn count_live(conn: &Connection, kind: ItemKind, container_id: i64) -> Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {} = ?1 AND archived = 0",
        kind.table(),
        kind.container_key()
    );
    conn.query_row(&sql, params![container_id], |row| row.get(0))
        .context("Failed to count live items")
}

/// Highest live position in the container, `None` when it is empty.
pub fn find_max_position(conn: &Connection, kind: ItemKind, container_id: i64) -> Result<Option<i64>> {
    let sql = format!(
        "SELECT MAX(position) FROM {} WHERE {} = ?1 AND archived = 0",
        kind.table(),
        kind.container_key()
    );
    conn.query_row(&sql, params![container_id], |row| row.get(0))
        .context("Failed to get max position")
}

/// Live `(id, position)` pairs ordered by position.
pub fn live_positions(conn: &Connection, kind: ItemKind, container_id: i64) -> Result<Vec<(i64, i64)>> {
    let sql = format!(
        "SELECT id, position FROM {} WHERE {} = ?1 AND archived = 0 ORDER BY position, id",
        kind.table(),
        kind.container_key()
    );
    let mut stmt = conn.prepare(&sql).context("Failed to prepare live_positions")?;
    let rows = stmt
        .query_map(params![container_id], |row| Ok((row.get(0)?, row.get(1)?)))
        .context("Failed to query live positions")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("Failed to read position row")?);
    }
    Ok(out)
}

fn shift_live(
    conn: &Connection,
    kind: ItemKind,
    container_id: i64,
    delta: i64,
    predicate: &str,
    bounds: &[i64],
) -> Result<usize> {
    let sql = format!(
        "UPDATE {} SET position = position + ?1 WHERE {} = ?2 AND archived = 0 AND {}",
        kind.table(),
        kind.container_key(),
        predicate
    );
    let mut values: Vec<i64> = vec![delta, container_id];
    values.extend_from_slice(bounds);
    conn.execute(&sql, rusqlite::params_from_iter(values))
        .context("Failed to shift positions")
}

pub fn increment_positions_from(conn: &Connection, kind: ItemKind, container_id: i64, from: i64) -> Result<usize> {
    shift_live(conn, kind, container_id, 1, "position >= ?3", &[from])
}

pub fn decrement_positions_after(conn: &Connection, kind: ItemKind, container_id: i64, after: i64) -> Result<usize> {
    shift_live(conn, kind, container_id, -1, "position > ?3", &[after])
}

pub fn increment_positions_in_range(
    conn: &Connection,
    kind: ItemKind,
    container_id: i64,
    low: i64,
    high: i64,
) -> Result<usize> {
    shift_live(conn, kind, container_id, 1, "position BETWEEN ?3 AND ?4", &[low, high])
}

pub fn decrement_positions_in_range(
    conn: &Connection,
    kind: ItemKind,
    container_id: i64,
    low: i64,
    high: i64,
) -> Result<usize> {
    shift_live(conn, kind, container_id, -1, "position BETWEEN ?3 AND ?4", &[low, high])
}

/// Execute a planned shift as one range `UPDATE`.
pub fn apply_shift(conn: &Connection, kind: ItemKind, shift: &Shift) -> Result<usize> {
    match *shift {
        Shift::IncrementFrom { container_id, from } => {
            increment_positions_from(conn, kind, container_id, from)
        }
        Shift::DecrementAfter {
            container_id,
            after,
        } => decrement_positions_after(conn, kind, container_id, after),
        Shift::IncrementInRange {
            container_id,
            low,
            high,
        } => increment_positions_in_range(conn, kind, container_id, low, high),
        Shift::DecrementInRange {
            container_id,
            low,
            high,
        } => decrement_positions_in_range(conn, kind, container_id, low, high),
    }
}

pub fn set_placement(conn: &Connection, kind: ItemKind, id: i64, placement: Placement) -> Result<()> {
    let sql = format!(
        "UPDATE {} SET {} = ?1, position = ?2, updated_at = datetime('now') WHERE id = ?3",
        kind.table(),
        kind.container_key()
    );
    conn.execute(&sql, params![placement.container_id, placement.position, id])
        .with_context(|| format!("Failed to place {} {}", kind.label(), id))?;
    Ok(())
}

pub fn set_archived(conn: &Connection, kind: ItemKind, id: i64, archived: bool, position: i64) -> Result<()> {
    let sql = format!(
        "UPDATE {} SET archived = ?1, position = ?2, updated_at = datetime('now') WHERE id = ?3",
        kind.table()
    );
    conn.execute(&sql, params![archived, position, id])
        .with_context(|| format!("Failed to archive {} {}", kind.label(), id))?;
    Ok(())
}

pub fn delete_item_row(conn: &Connection, kind: ItemKind, id: i64) -> Result<bool> {
    let sql = format!("DELETE FROM {} WHERE id = ?1", kind.table());
    let affected = conn
        .execute(&sql, params![id])
        .with_context(|| format!("Failed to delete {} {}", kind.label(), id))?;
    Ok(affected > 0)
}

/// Bump the board's modification stamp with a single atomic write.
pub fn touch_board(conn: &Connection, board_id: i64) -> Result<bool> {
    let affected = conn
        .execute(
            "UPDATE boards SET date_modified = ?1, revision = revision + 1 WHERE id = ?2",
            params![now_timestamp(), board_id],
        )
        .context("Failed to touch board")?;
    Ok(affected > 0)
}

// ── Boards ────────────────────────────────────────────────────────────

fn board_from_row(row: &Row<'_>) -> rusqlite::Result<Board> {
    Ok(Board {
        id: row.get(0)?,
        name: row.get(1)?,
        revision: row.get(2)?,
        date_modified: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn insert_board(conn: &Connection, name: &str) -> Result<Board> {
    conn.execute("INSERT INTO boards (name) VALUES (?1)", params![name])
        .context("Failed to insert board")?;
    let id = conn.last_insert_rowid();
    get_board(conn, id)?.context("Board not found after insert")
}

pub fn get_board(conn: &Connection, id: i64) -> Result<Option<Board>> {
    conn.query_row(
        "SELECT id, name, revision, date_modified, created_at FROM boards WHERE id = ?1",
        params![id],
        board_from_row,
    )
    .optional()
    .context("Failed to read board")
}

pub fn rename_board(conn: &Connection, id: i64, name: &str) -> Result<()> {
    conn.execute("UPDATE boards SET name = ?1 WHERE id = ?2", params![name, id])
        .context("Failed to rename board")?;
    Ok(())
}

/// Board with its live columns and tasks, each ordered by position.
pub fn board_view(conn: &Connection, board_id: i64) -> Result<Option<BoardView>> {
    let Some(board) = get_board(conn, board_id)? else {
        return Ok(None);
    };
    let mut columns = Vec::new();
    for column in list_columns(conn, board_id)? {
        let tasks = list_tasks(conn, column.id)?;
        columns.push(ColumnView { column, tasks });
    }
    Ok(Some(BoardView { board, columns }))
}

// ── Columns ───────────────────────────────────────────────────────────

const COLUMN_FIELDS: &str = "id, board_id, name, position, archived, created_at, updated_at";

fn column_from_row(row: &Row<'_>) -> rusqlite::Result<Column> {
    Ok(Column {
        id: row.get(0)?,
        board_id: row.get(1)?,
        name: row.get(2)?,
        position: row.get(3)?,
        archived: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

pub fn insert_column(conn: &Connection, board_id: i64, name: &str, position: i64) -> Result<Column> {
    conn.execute(
        "INSERT INTO board_columns (board_id, name, position) VALUES (?1, ?2, ?3)",
        params![board_id, name, position],
    )
    .context("Failed to insert column")?;
    let id = conn.last_insert_rowid();
    get_column(conn, id)?.context("Column not found after insert")
}

pub fn get_column(conn: &Connection, id: i64) -> Result<Option<Column>> {
    conn.query_row(
        &format!("SELECT {} FROM board_columns WHERE id = ?1", COLUMN_FIELDS),
        params![id],
        column_from_row,
    )
    .optional()
    .context("Failed to read column")
}

/// Live columns of a board, ordered by position.
pub fn list_columns(conn: &Connection, board_id: i64) -> Result<Vec<Column>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM board_columns WHERE board_id = ?1 AND archived = 0 ORDER BY position",
            COLUMN_FIELDS
        ))
        .context("Failed to prepare list_columns")?;
    let rows = stmt
        .query_map(params![board_id], column_from_row)
        .context("Failed to query columns")?;
    let mut columns = Vec::new();
    for row in rows {
        columns.push(row.context("Failed to read column row")?);
    }
    Ok(columns)
}

pub fn rename_column(conn: &Connection, id: i64, name: &str) -> Result<()> {
    conn.execute(
        "UPDATE board_columns SET name = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![name, id],
    )
    .context("Failed to rename column")?;
    Ok(())
}

// ── Tasks ─────────────────────────────────────────────────────────────

const TASK_FIELDS: &str =
    "id, column_id, name, description, position, archived, created_at, updated_at";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        column_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        position: row.get(4)?,
        archived: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub fn insert_task(
    conn: &Connection,
    column_id: i64,
    name: &str,
    description: &str,
    position: i64,
) -> Result<Task> {
    conn.execute(
        "INSERT INTO tasks (column_id, name, description, position) VALUES (?1, ?2, ?3, ?4)",
        params![column_id, name, description, position],
    )
    .context("Failed to insert task")?;
    let id = conn.last_insert_rowid();
    get_task(conn, id)?.context("Task not found after insert")
}

pub fn get_task(conn: &Connection, id: i64) -> Result<Option<Task>> {
    conn.query_row(
        &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_FIELDS),
        params![id],
        task_from_row,
    )
    .optional()
    .context("Failed to read task")
}

/// Live tasks of a column, ordered by position.
pub fn list_tasks(conn: &Connection, column_id: i64) -> Result<Vec<Task>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM tasks WHERE column_id = ?1 AND archived = 0 ORDER BY position",
            TASK_FIELDS
        ))
        .context("Failed to prepare list_tasks")?;
    let rows = stmt
        .query_map(params![column_id], task_from_row)
        .context("Failed to query tasks")?;
    let mut tasks = Vec::new();
    for row in rows {
        tasks.push(row.context("Failed to read task row")?);
    }
    Ok(tasks)
}

pub fn update_task(
    conn: &Connection,
    id: i64,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE tasks SET name = COALESCE(?1, name), description = COALESCE(?2, description),
         updated_at = datetime('now') WHERE id = ?3",
        params![name, description, id],
    )
    .context("Failed to update task")?;
    Ok(())
}

// ── Collaborators ─────────────────────────────────────────────────────

/// Intermediate row struct for collaborators; `role` is stored as text.
struct CollaboratorRow {
    board_id: i64,
    user_id: i64,
    role: String,
    joined_at: String,
}

impl CollaboratorRow {
    fn into_collaborator(self) -> Result<Collaborator> {
        let role = Role::from_str(&self.role)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse collaborator role")?;
        Ok(Collaborator {
            board_id: self.board_id,
            user_id: self.user_id,
            role,
            joined_at: self.joined_at,
        })
    }
}

pub fn list_collaborators(conn: &Connection, board_id: i64) -> Result<Vec<Collaborator>> {
    let mut stmt = conn
        .prepare(
            "SELECT board_id, user_id, role, joined_at FROM collaborators
             WHERE board_id = ?1 ORDER BY user_id",
        )
        .context("Failed to prepare list_collaborators")?;
    let rows = stmt
        .query_map(params![board_id], |row| {
            Ok(CollaboratorRow {
                board_id: row.get(0)?,
                user_id: row.get(1)?,
                role: row.get(2)?,
                joined_at: row.get(3)?,
            })
        })
        .context("Failed to query collaborators")?;
    let mut collaborators = Vec::new();
    for row in rows {
        collaborators.push(row.context("Failed to read collaborator row")?.into_collaborator()?);
    }
    Ok(collaborators)
}

pub fn insert_collaborator(conn: &Connection, board_id: i64, user_id: UserId, role: Role) -> Result<()> {
    conn.execute(
        "INSERT INTO collaborators (board_id, user_id, role) VALUES (?1, ?2, ?3)",
        params![board_id, user_id, role.as_str()],
    )
    .context("Failed to insert collaborator")?;
    Ok(())
}

pub fn update_role(conn: &Connection, board_id: i64, user_id: UserId, role: Role) -> Result<()> {
    conn.execute(
        "UPDATE collaborators SET role = ?1 WHERE board_id = ?2 AND user_id = ?3",
        params![role.as_str(), board_id, user_id],
    )
    .context("Failed to update collaborator role")?;
    Ok(())
}

pub fn delete_collaborator(conn: &Connection, board_id: i64, user_id: UserId) -> Result<bool> {
    let affected = conn
        .execute(
            "DELETE FROM collaborators WHERE board_id = ?1 AND user_id = ?2",
            params![board_id, user_id],
        )
        .context("Failed to delete collaborator")?;
    Ok(affected > 0)
}

/// Number of boards `user_id` collaborates on.
pub fn count_boards_for_user(conn: &Connection, user_id: UserId) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM collaborators WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )
    .context("Failed to count boards for user")
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Result<(BoardDb, i64, i64)> {
        let db = BoardDb::new_in_memory()?;
        let board = insert_board(db.conn(), "Roadmap")?;
        let column = insert_column(db.conn(), board.id, "Todo", 0)?;
        for (i, name) in ["A", "B", "C", "D"].iter().enumerate() {
            insert_task(db.conn(), column.id, name, "", i as i64)?;
        }
        Ok((db, board.id, column.id))
    }

    fn names(conn: &Connection, column_id: i64) -> Vec<String> {
        list_tasks(conn, column_id)
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect()
    }

    #[test]
    fn test_create_database_and_run_migrations() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let tables: Vec<String> = {
            let mut stmt = db
                .conn()
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
            stmt.query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?
        };
        for expected in ["board_columns", "boards", "collaborators", "tasks"] {
            assert!(tables.iter().any(|t| t == expected), "missing {}", expected);
        }
        Ok(())
    }

    #[test]
    fn test_database_file_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("board.db");
        {
            let db = BoardDb::new(&path)?;
            insert_board(db.conn(), "Persisted")?;
        }
        let db = BoardDb::new(&path)?;
        let board = get_board(db.conn(), 1)?.unwrap();
        assert_eq!(board.name, "Persisted");
        Ok(())
    }

    #[test]
    fn test_find_item_reports_board() -> Result<()> {
        let (db, board_id, column_id) = seeded()?;
        let item = find_item(db.conn(), ItemKind::Task, 2)?.unwrap();
        assert_eq!(item.container_id, column_id);
        assert_eq!(item.board_id, board_id);
        assert_eq!(item.position, 1);
        assert!(find_item(db.conn(), ItemKind::Task, 99)?.is_none());

        let column = find_item(db.conn(), ItemKind::Column, column_id)?.unwrap();
        assert_eq!(column.container_id, board_id);
        assert_eq!(column.board_id, board_id);
        Ok(())
    }

    #[test]
    fn test_range_primitives() -> Result<()> {
        let (db, _, column_id) = seeded()?;
        let conn = db.conn();

        // Open a slot at 1: B, C, D move up.
        assert_eq!(increment_positions_from(conn, ItemKind::Task, column_id, 1)?, 3);
        assert_eq!(
            live_positions(conn, ItemKind::Task, column_id)?,
            vec![(1, 0), (2, 2), (3, 3), (4, 4)]
        );

        // Close it again.
        assert_eq!(decrement_positions_after(conn, ItemKind::Task, column_id, 0)?, 3);
        assert_eq!(
            live_positions(conn, ItemKind::Task, column_id)?,
            vec![(1, 0), (2, 1), (3, 2), (4, 3)]
        );

        // D to the front of B: B, C move up, then back again.
        let slot = |position| Placement {
            container_id: column_id,
            position,
        };
        assert_eq!(increment_positions_in_range(conn, ItemKind::Task, column_id, 1, 2)?, 2);
        set_placement(conn, ItemKind::Task, 4, slot(1))?;
        assert_eq!(names(conn, column_id), vec!["A", "D", "B", "C"]);
        assert_eq!(decrement_positions_in_range(conn, ItemKind::Task, column_id, 2, 3)?, 2);
        set_placement(conn, ItemKind::Task, 4, slot(3))?;
        assert_eq!(
            live_positions(conn, ItemKind::Task, column_id)?,
            vec![(1, 0), (2, 1), (3, 2), (4, 3)]
        );
        Ok(())
    }

    #[test]
    fn test_shifts_skip_archived_rows() -> Result<()> {
        let (db, _, column_id) = seeded()?;
        let conn = db.conn();
        set_archived(conn, ItemKind::Task, 4, true, 3)?;
        increment_positions_from(conn, ItemKind::Task, column_id, 0)?;
        let frozen = get_task(conn, 4)?.unwrap();
        assert_eq!(frozen.position, 3);
        assert!(frozen.archived);
        assert_eq!(count_live(conn, ItemKind::Task, column_id)?, 3);
        Ok(())
    }

    #[test]
    fn test_find_max_position() -> Result<()> {
        let (db, board_id, column_id) = seeded()?;
        assert_eq!(find_max_position(db.conn(), ItemKind::Task, column_id)?, Some(3));
        let empty = insert_column(db.conn(), board_id, "Empty", 1)?;
        assert_eq!(find_max_position(db.conn(), ItemKind::Task, empty.id)?, None);
        Ok(())
    }

    #[test]
    fn test_touch_board_increments_revision() -> Result<()> {
        let (db, board_id, _) = seeded()?;
        let before = get_board(db.conn(), board_id)?.unwrap();
        assert!(touch_board(db.conn(), board_id)?);
        assert!(touch_board(db.conn(), board_id)?);
        let after = get_board(db.conn(), board_id)?.unwrap();
        assert_eq!(after.revision, before.revision + 2);
        assert!(!touch_board(db.conn(), 999)?);
        Ok(())
    }

    #[test]
    fn test_board_view_orders_live_items() -> Result<()> {
        let (db, board_id, column_id) = seeded()?;
        set_placement(
            db.conn(),
            ItemKind::Task,
            1,
            Placement {
                container_id: column_id,
                position: 9,
            },
        )?;
        let view = board_view(db.conn(), board_id)?.unwrap();
        assert_eq!(view.columns.len(), 1);
        let names: Vec<_> = view.columns[0].tasks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["B", "C", "D", "A"]);
        assert!(board_view(db.conn(), 42)?.is_none());
        Ok(())
    }

    #[test]
    fn test_update_task_partial() -> Result<()> {
        let (db, _, column_id) = seeded()?;
        update_task(db.conn(), 1, None, Some("details"))?;
        let task = get_task(db.conn(), 1)?.unwrap();
        assert_eq!(task.name, "A");
        assert_eq!(task.description, "details");
        assert_eq!(names(db.conn(), column_id), vec!["A", "B", "C", "D"]);
        Ok(())
    }

    #[test]
    fn test_collaborator_crud() -> Result<()> {
        let (db, board_id, _) = seeded()?;
        let conn = db.conn();
        insert_collaborator(conn, board_id, 10, Role::Admin)?;
        insert_collaborator(conn, board_id, 11, Role::Member)?;
        update_role(conn, board_id, 11, Role::Admin)?;
        let collaborators = list_collaborators(conn, board_id)?;
        assert_eq!(collaborators.len(), 2);
        assert!(collaborators.iter().all(|c| c.role == Role::Admin));
        assert_eq!(count_boards_for_user(conn, 10)?, 1);
        assert!(delete_collaborator(conn, board_id, 10)?);
        assert!(!delete_collaborator(conn, board_id, 10)?);
        assert_eq!(count_boards_for_user(conn, 10)?, 0);
        Ok(())
    }

    #[test]
    fn test_deleting_column_cascades_tasks() -> Result<()> {
        let (db, _, column_id) = seeded()?;
        assert!(delete_item_row(db.conn(), ItemKind::Column, column_id)?);
        assert!(get_task(db.conn(), 1)?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_db_handle_runs_closure() {
        let handle = DbHandle::new(BoardDb::new_in_memory().unwrap());
        let board = handle
            .call(|db| Ok(insert_board(db.conn(), "Async")?))
            .await
            .unwrap();
        assert_eq!(board.name, "Async");
        let guard = handle.lock_sync().unwrap();
        assert!(get_board(guard.conn(), board.id).unwrap().is_some());
    }
}
