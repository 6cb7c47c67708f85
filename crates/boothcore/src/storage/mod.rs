pub mod db;
pub mod migrations;

pub use db::{create_pool, get_connection, DbConnection, DbPool, SqliteRepository};
pub use migrations::run_migrations;
