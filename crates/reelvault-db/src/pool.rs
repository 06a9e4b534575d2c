//! Connection pool, context locks, and transactions.
//!
//! A single SQLite file is shared by every worker thread through an r2d2
//! pool. Access is serialized by a single-writer/multiple-reader
//! protocol: any number of [`ReadContext`]s may coexist, a
//! [`WriteContext`] is exclusive, and a separate priority lane lets a
//! caller pause background batches (see [`Database::priority_access`]).
//!
//! Every new connection gets the 500 ms busy timeout, foreign keys,
//! recursive triggers, the `VIDEO_GROUP_AGGREGATE` SQL function, and an
//! update hook forwarding row changes to the registered table hooks.

use std::cell::Cell;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::hooks::Action;
use rusqlite::Connection;

use reelvault_core::{DatabaseError, Error, Result};

use crate::functions;
use crate::sql;

/// Type alias for the underlying r2d2 pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Type alias for a pooled connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Why an update hook fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookReason {
    Insert,
    Update,
    Delete,
}

type HookFn = Box<dyn Fn(HookReason, i64) + Send + Sync>;
type HookMap = Arc<RwLock<HashMap<String, HookFn>>>;

thread_local! {
    static TRANSACTION_IN_PROGRESS: Cell<bool> = const { Cell::new(false) };
}

/// True when the current thread holds an open transaction.
pub fn transaction_in_progress() -> bool {
    TRANSACTION_IN_PROGRESS.with(|flag| flag.get())
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// Shared handle to the embedded database.
pub struct Database {
    pool: DbPool,
    ctx_lock: RwLock<()>,
    priority_lane: Mutex<()>,
    hooks: HookMap,
}

impl Database {
    /// Open (or create) a database file and initialize the pool.
    pub fn open(db_path: &str) -> Result<Self> {
        let hooks: HookMap = Arc::new(RwLock::new(HashMap::new()));
        let init_hooks = hooks.clone();
        let manager = SqliteConnectionManager::file(db_path)
            .with_init(move |conn| init_connection(conn, &init_hooks, true));
        Self::build(manager, hooks)
    }

    /// Open a uniquely-named shared-cache in-memory database.
    ///
    /// Every call yields an independent database, while all connections
    /// within one pool share state; this is what tests run against.
    pub fn open_in_memory() -> Result<Self> {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let uri = format!("file:reelvault_mem_{n}?mode=memory&cache=shared");

        let hooks: HookMap = Arc::new(RwLock::new(HashMap::new()));
        let init_hooks = hooks.clone();
        let manager = SqliteConnectionManager::file(uri)
            .with_init(move |conn| init_connection(conn, &init_hooks, false));
        Self::build(manager, hooks)
    }

    fn build(manager: SqliteConnectionManager, hooks: HookMap) -> Result<Self> {
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| Error::internal(format!("failed to create connection pool: {e}")))?;
        Ok(Self {
            pool,
            ctx_lock: RwLock::new(()),
            priority_lane: Mutex::new(()),
            hooks,
        })
    }

    /// Acquire a shared read context.
    pub fn read(&self) -> Result<ReadContext<'_>> {
        let guard = self.ctx_lock.read();
        let conn = self.conn()?;
        Ok(ReadContext {
            conn,
            _guard: guard,
        })
    }

    /// Acquire the exclusive write context.
    pub fn write(&self) -> Result<WriteContext<'_>> {
        let guard = self.ctx_lock.write();
        let conn = self.conn()?;
        Ok(WriteContext {
            conn,
            _guard: guard,
        })
    }

    /// Acquire the priority lane, pausing cooperating background workers.
    pub fn priority_access(&self) -> PriorityAccess<'_> {
        PriorityAccess {
            _guard: self.priority_lane.lock(),
        }
    }

    /// Called by background workers between batch items: blocks while a
    /// priority client holds the lane.
    pub fn yield_to_priority(&self) {
        drop(self.priority_lane.lock());
    }

    /// Register a per-table update hook. At most one hook per table; a
    /// second registration replaces the first.
    pub fn register_hook(
        &self,
        table: impl Into<String>,
        hook: impl Fn(HookReason, i64) + Send + Sync + 'static,
    ) {
        self.hooks.write().insert(table.into(), Box::new(hook));
    }

    /// Drop every registered hook (used during teardown).
    pub fn clear_hooks(&self) {
        self.hooks.write().clear();
    }

    fn conn(&self) -> Result<PooledConnection> {
        self.pool
            .get()
            .map_err(|e| Error::internal(format!("failed to get connection from pool: {e}")))
    }
}

fn init_connection(
    conn: &mut Connection,
    hooks: &HookMap,
    wal: bool,
) -> std::result::Result<(), rusqlite::Error> {
    conn.busy_timeout(Duration::from_millis(500))?;
    if wal {
        // query_row: journal_mode answers with the resulting mode.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
    }
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA recursive_triggers = ON;",
    )?;
    conn.set_prepared_statement_cache_capacity(128);
    functions::register_all(conn)?;

    let hooks = hooks.clone();
    conn.update_hook(Some(
        move |action: Action, _db: &str, table: &str, rowid: i64| {
            let reason = match action {
                Action::SQLITE_INSERT => HookReason::Insert,
                Action::SQLITE_UPDATE => HookReason::Update,
                Action::SQLITE_DELETE => HookReason::Delete,
                _ => return,
            };
            let map = hooks.read();
            if let Some(hook) = map.get(table) {
                hook(reason, rowid);
            }
        },
    ));
    Ok(())
}

// ---------------------------------------------------------------------------
// Contexts
// ---------------------------------------------------------------------------

/// Shared read access; any number may coexist, no writer can run.
pub struct ReadContext<'a> {
    conn: PooledConnection,
    _guard: RwLockReadGuard<'a, ()>,
}

impl Deref for ReadContext<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

/// Exclusive write access over both readers and other writers.
pub struct WriteContext<'a> {
    conn: PooledConnection,
    _guard: RwLockWriteGuard<'a, ()>,
}

impl WriteContext<'_> {
    /// Start a transaction on this context's connection.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        Transaction::new(&self.conn)
    }
}

impl Deref for WriteContext<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

/// Access token for the priority lane.
pub struct PriorityAccess<'a> {
    _guard: MutexGuard<'a, ()>,
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// Scoped transaction: `BEGIN` on construction, `ROLLBACK` on drop
/// unless [`Transaction::commit`] ran.
///
/// Nesting is a programming error and fails with `LibMisuse`; callers
/// that may run inside a wider transaction must check
/// [`transaction_in_progress`] first.
pub struct Transaction<'conn> {
    conn: &'conn Connection,
    done: bool,
}

impl<'conn> Transaction<'conn> {
    pub fn new(conn: &'conn Connection) -> Result<Self> {
        if transaction_in_progress() {
            return Err(Error::Database(DatabaseError::LibMisuse(
                "nested transaction".into(),
            )));
        }
        sql::execute(conn, "BEGIN", [])?;
        TRANSACTION_IN_PROGRESS.with(|flag| flag.set(true));
        Ok(Self { conn, done: false })
    }

    pub fn commit(mut self) -> Result<()> {
        sql::execute(self.conn, "COMMIT", [])?;
        self.done = true;
        TRANSACTION_IN_PROGRESS.with(|flag| flag.set(false));
        Ok(())
    }

    /// The connection this transaction runs on.
    pub fn conn(&self) -> &Connection {
        self.conn
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        TRANSACTION_IN_PROGRESS.with(|flag| flag.set(false));
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            tracing::error!("failed to rollback transaction: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// WeakDbContext
// ---------------------------------------------------------------------------

/// Migration scope: foreign keys and recursive triggers are disabled for
/// its lifetime, and table renames use the legacy in-place semantics so
/// referencing objects keep their stored SQL untouched.
pub struct WeakDbContext<'conn> {
    conn: &'conn Connection,
}

impl<'conn> WeakDbContext<'conn> {
    pub fn new(conn: &'conn Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA foreign_keys = OFF;
             PRAGMA recursive_triggers = OFF;
             PRAGMA legacy_alter_table = ON;",
        )
        .map_err(DatabaseError::from)?;
        Ok(Self { conn })
    }
}

impl Drop for WeakDbContext<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA recursive_triggers = ON;
             PRAGMA legacy_alter_table = OFF;",
        ) {
            tracing::error!("failed to restore db context: {e}");
        }
    }
}
