//! reelvault-db: the storage engine.
//!
//! This crate owns everything that touches SQLite: the connection pool
//! and its locking protocol, the prepared-statement helpers with their
//! transient-error retry policy, the paginated query builder, the
//! per-entity schema/trigger/index registry, the entity operations, and
//! the model-version migration machinery.

pub mod entities;
pub mod functions;
pub mod migrations;
pub mod pool;
pub mod query;
pub mod registry;
pub mod sql;

pub use pool::{Database, HookReason, ReadContext, Transaction, WeakDbContext, WriteContext};
pub use query::PagedQuery;
pub use registry::DB_MODEL_VERSION;

#[cfg(test)]
pub(crate) mod testing {
    use crate::pool::Database;
    use crate::registry;

    /// An in-memory database carrying the full current-model schema,
    /// sentinel artists, and a settings row.
    pub fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        {
            let ctx = db.write().unwrap();
            registry::create_all(&ctx, registry::DB_MODEL_VERSION).unwrap();
            crate::entities::settings::create_default_row(&ctx, registry::DB_MODEL_VERSION)
                .unwrap();
        }
        db
    }
}
