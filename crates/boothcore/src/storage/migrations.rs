use rusqlite::Connection;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use crate::error::{AppError, AppResult};

mod embedded {
    use refinery::embed_migrations;

    embed_migrations!("./migrations");
}

static MIGRATION_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Applies pending schema migrations.
///
/// Runs are serialized per process; refinery wraps each migration in its
/// own transaction.
pub fn run_migrations(conn: &mut Connection) -> AppResult<()> {
    let mutex = MIGRATION_LOCK.get_or_init(|| Mutex::new(()));
    let _guard = match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Migration lock was poisoned, recovering...");
            poisoned.into_inner()
        }
    };

    conn.busy_timeout(Duration::from_secs(30))?;

    let report = embedded::migrations::runner()
        .run(conn)
        .map_err(|e| AppError::Migration(e.to_string()))?;

    for migration in report.applied_migrations() {
        tracing::info!(version = migration.version(), name = migration.name(), "Applied migration");
    }
    Ok(())
}
