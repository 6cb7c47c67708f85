use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::repository::{
    AuthCodeRepository, BotRepository, BroadcastRepository, BugReportRepository, EventRepository, SessionRepository,
    StoredSession, TenantRepository, VisitorRepository,
};
use crate::session::Session;
use crate::storage::migrations::run_migrations;
use crate::types::{
    AuthCode, AuthCodeStatus, BotRecord, BroadcastLog, BugReport, Event, NewBot, NewBroadcast, NewBugReport, NewEvent,
    NewTenant, NewVisitor, TelegramId, Tenant, Visitor,
};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Create a new database connection pool
///
/// Initializes a pool with up to 10 connections and brings the schema up
/// to date before handing it out.
///
/// # Example
///
/// ```no_run
/// use boothcore::storage::db;
///
/// let pool = db::create_pool("boothbot.sqlite")?;
/// # Ok::<(), boothcore::error::AppError>(())
/// ```
pub fn create_pool(database_path: &str) -> AppResult<DbPool> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    });
    let pool = Pool::builder().max_size(10).build(manager)?;

    let mut conn = pool.get()?;
    run_migrations(&mut conn)?;

    Ok(pool)
}

/// Get a connection from the pool
pub fn get_connection(pool: &DbPool) -> AppResult<DbConnection> {
    Ok(pool.get()?)
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn to_u64(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

const TENANT_COLUMNS: &str = "id, email, telegram_id, first_name, username, created_at";
const BOT_COLUMNS: &str = "id, tenant_id, token, username, owner_telegram_id, created_at";
const EVENT_COLUMNS: &str = "id, bot_id, name, slug, description, start_date, end_date, created_at";
const VISITOR_COLUMNS: &str = "id, bot_id, event_id, source, telegram_id, telegram_username, full_name, company, \
                               title, email, phone, wallet_address, notes, created_at";
const BROADCAST_COLUMNS: &str = "id, bot_id, event_id, message, sent_count, failed_count, created_at";
const BUG_REPORT_COLUMNS: &str = "id, telegram_id, username, report, created_at";
const AUTH_CODE_COLUMNS: &str = "code, status, telegram_id, telegram_username, first_name, created_at, expires_at";

fn tenant_from_row(row: &Row<'_>) -> rusqlite::Result<Tenant> {
    Ok(Tenant {
        id: row.get(0)?,
        email: row.get(1)?,
        telegram_id: row.get(2)?,
        first_name: row.get(3)?,
        username: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn bot_from_row(row: &Row<'_>) -> rusqlite::Result<BotRecord> {
    Ok(BotRecord {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        token: row.get(2)?,
        username: row.get(3)?,
        owner_telegram_id: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        bot_id: row.get(1)?,
        name: row.get(2)?,
        slug: row.get(3)?,
        description: row.get(4)?,
        start_date: row.get(5)?,
        end_date: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn visitor_from_row(row: &Row<'_>) -> rusqlite::Result<Visitor> {
    Ok(Visitor {
        id: row.get(0)?,
        bot_id: row.get(1)?,
        event_id: row.get(2)?,
        source: row.get(3)?,
        telegram_id: row.get(4)?,
        telegram_username: row.get(5)?,
        full_name: row.get(6)?,
        company: row.get(7)?,
        title: row.get(8)?,
        email: row.get(9)?,
        phone: row.get(10)?,
        wallet_address: row.get(11)?,
        notes: row.get(12)?,
        created_at: row.get(13)?,
    })
}

fn broadcast_from_row(row: &Row<'_>) -> rusqlite::Result<BroadcastLog> {
    Ok(BroadcastLog {
        id: row.get(0)?,
        bot_id: row.get(1)?,
        event_id: row.get(2)?,
        message: row.get(3)?,
        sent_count: to_u64(row.get(4)?),
        failed_count: to_u64(row.get(5)?),
        created_at: row.get(6)?,
    })
}

fn bug_report_from_row(row: &Row<'_>) -> rusqlite::Result<BugReport> {
    Ok(BugReport {
        id: row.get(0)?,
        telegram_id: row.get(1)?,
        username: row.get(2)?,
        report: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn auth_code_from_row(row: &Row<'_>) -> rusqlite::Result<AuthCode> {
    let status: String = row.get(1)?;
    let status = status
        .parse::<AuthCodeStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    Ok(AuthCode {
        code: row.get(0)?,
        status,
        telegram_id: row.get(2)?,
        telegram_username: row.get(3)?,
        first_name: row.get(4)?,
        created_at: row.get(5)?,
        expires_at: row.get(6)?,
    })
}

/// SQLite-backed implementation of every repository trait.
///
/// Each call checks a connection out of the pool on the blocking thread
/// pool, so async callers never block a runtime worker.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: Arc<DbPool>,
}

impl SqliteRepository {
    pub fn open(database_path: &str) -> AppResult<Self> {
        Ok(Self::from_pool(create_pool(database_path)?))
    }

    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    async fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> AppResult<T> + Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || {
            let mut conn = get_connection(&pool)?;
            f(&mut conn)
        })
        .await?
    }
}

#[async_trait]
impl SessionRepository for SqliteRepository {
    async fn load_session(&self, bot_id: &str, user_id: TelegramId) -> AppResult<Option<StoredSession>> {
        let bot_id = bot_id.to_string();
        self.with_conn(move |conn| {
            let row: Option<(String, i64)> = conn
                .query_row(
                    "SELECT data, updated_at FROM sessions WHERE bot_id = ?1 AND user_id = ?2",
                    params![bot_id, user_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match row {
                Some((data, updated_at)) => Ok(Some(StoredSession {
                    session: serde_json::from_str(&data)?,
                    updated_at: from_millis(updated_at),
                })),
                None => Ok(None),
            }
        })
        .await
    }

    async fn save_session(
        &self,
        bot_id: &str,
        user_id: TelegramId,
        session: &Session,
        touched_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let bot_id = bot_id.to_string();
        let data = serde_json::to_string(session)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sessions (bot_id, user_id, data, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(bot_id, user_id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
                params![bot_id, user_id, data, touched_at.timestamp_millis()],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_session(&self, bot_id: &str, user_id: TelegramId) -> AppResult<()> {
        let bot_id = bot_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM sessions WHERE bot_id = ?1 AND user_id = ?2",
                params![bot_id, user_id],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_sessions_idle_since(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM sessions WHERE updated_at < ?1",
                params![cutoff.timestamp_millis()],
            )?;
            Ok(removed as u64)
        })
        .await
    }
}

#[async_trait]
impl TenantRepository for SqliteRepository {
    async fn find_tenant_by_id(&self, tenant_id: &str) -> AppResult<Option<Tenant>> {
        let tenant_id = tenant_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM tenants WHERE id = ?1", TENANT_COLUMNS);
            Ok(conn.query_row(&sql, params![tenant_id], tenant_from_row).optional()?)
        })
        .await
    }

    async fn find_tenant_by_telegram_id(&self, telegram_id: TelegramId) -> AppResult<Option<Tenant>> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM tenants WHERE telegram_id = ?1", TENANT_COLUMNS);
            Ok(conn.query_row(&sql, params![telegram_id], tenant_from_row).optional()?)
        })
        .await
    }

    async fn create_tenant(&self, tenant: NewTenant) -> AppResult<Tenant> {
        let record = Tenant {
            id: Uuid::new_v4().to_string(),
            email: tenant.email,
            telegram_id: tenant.telegram_id,
            first_name: tenant.first_name,
            username: tenant.username,
            created_at: Utc::now(),
        };
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO tenants (id, email, telegram_id, first_name, username, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id,
                    record.email,
                    record.telegram_id,
                    record.first_name,
                    record.username,
                    record.created_at
                ],
            )?;
            Ok(record)
        })
        .await
    }
}

#[async_trait]
impl BotRepository for SqliteRepository {
    async fn find_bot_by_id(&self, bot_id: &str) -> AppResult<Option<BotRecord>> {
        let bot_id = bot_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM bots WHERE id = ?1", BOT_COLUMNS);
            Ok(conn.query_row(&sql, params![bot_id], bot_from_row).optional()?)
        })
        .await
    }

    async fn find_bot_by_token(&self, token: &str) -> AppResult<Option<BotRecord>> {
        let token = token.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM bots WHERE token = ?1", BOT_COLUMNS);
            Ok(conn.query_row(&sql, params![token], bot_from_row).optional()?)
        })
        .await
    }

    async fn list_bots_for_tenant(&self, tenant_id: &str) -> AppResult<Vec<BotRecord>> {
        let tenant_id = tenant_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM bots WHERE tenant_id = ?1 ORDER BY created_at, rowid",
                BOT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![tenant_id], bot_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn create_bot(&self, bot: NewBot) -> AppResult<BotRecord> {
        let record = BotRecord {
            id: Uuid::new_v4().to_string(),
            tenant_id: bot.tenant_id,
            token: bot.token,
            username: bot.username,
            owner_telegram_id: bot.owner_telegram_id,
            created_at: Utc::now(),
        };
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO bots (id, tenant_id, token, username, owner_telegram_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id,
                    record.tenant_id,
                    record.token,
                    record.username,
                    record.owner_telegram_id,
                    record.created_at
                ],
            )?;
            Ok(record)
        })
        .await
    }

    async fn list_delegate_admins(&self, bot_id: &str) -> AppResult<Vec<TelegramId>> {
        let bot_id = bot_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT telegram_id FROM bot_admins WHERE bot_id = ?1")?;
            let rows = stmt.query_map(params![bot_id], |row| row.get(0))?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn add_delegate_admin(&self, bot_id: &str, telegram_id: TelegramId) -> AppResult<()> {
        let bot_id = bot_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO bot_admins (bot_id, telegram_id) VALUES (?1, ?2)",
                params![bot_id, telegram_id],
            )?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl EventRepository for SqliteRepository {
    async fn find_event_by_id(&self, event_id: &str) -> AppResult<Option<Event>> {
        let event_id = event_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS);
            Ok(conn.query_row(&sql, params![event_id], event_from_row).optional()?)
        })
        .await
    }

    async fn find_event_by_slug(&self, bot_id: &str, slug: &str) -> AppResult<Option<Event>> {
        let (bot_id, slug) = (bot_id.to_string(), slug.to_string());
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM events WHERE bot_id = ?1 AND slug = ?2", EVENT_COLUMNS);
            Ok(conn.query_row(&sql, params![bot_id, slug], event_from_row).optional()?)
        })
        .await
    }

    async fn find_default_event_for_bot(&self, bot_id: &str) -> AppResult<Option<Event>> {
        let bot_id = bot_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM events WHERE bot_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                EVENT_COLUMNS
            );
            Ok(conn.query_row(&sql, params![bot_id], event_from_row).optional()?)
        })
        .await
    }

    async fn create_event(&self, event: NewEvent) -> AppResult<Event> {
        let record = Event {
            id: Uuid::new_v4().to_string(),
            bot_id: event.bot_id,
            name: event.name,
            slug: event.slug,
            description: event.description,
            start_date: event.start_date,
            end_date: event.end_date,
            created_at: Utc::now(),
        };
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO events (id, bot_id, name, slug, description, start_date, end_date, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id,
                    record.bot_id,
                    record.name,
                    record.slug,
                    record.description,
                    record.start_date,
                    record.end_date,
                    record.created_at
                ],
            )?;
            Ok(record)
        })
        .await
    }

    async fn list_events_for_bot(&self, bot_id: &str) -> AppResult<Vec<Event>> {
        let bot_id = bot_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM events WHERE bot_id = ?1 ORDER BY created_at, rowid",
                EVENT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![bot_id], event_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }
}

#[async_trait]
impl VisitorRepository for SqliteRepository {
    async fn find_visitor_by_bot_and_user(&self, bot_id: &str, telegram_id: TelegramId) -> AppResult<Option<Visitor>> {
        let bot_id = bot_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM visitors WHERE bot_id = ?1 AND telegram_id = ?2",
                VISITOR_COLUMNS
            );
            Ok(conn
                .query_row(&sql, params![bot_id, telegram_id], visitor_from_row)
                .optional()?)
        })
        .await
    }

    async fn upsert_visitor(&self, visitor: NewVisitor) -> AppResult<Visitor> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO visitors (id, bot_id, event_id, source, telegram_id, telegram_username, full_name,
                                       company, title, email, phone, wallet_address, notes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(bot_id, telegram_id) DO UPDATE SET
                    event_id = COALESCE(excluded.event_id, visitors.event_id),
                    source = COALESCE(excluded.source, visitors.source),
                    telegram_username = COALESCE(excluded.telegram_username, visitors.telegram_username),
                    full_name = COALESCE(excluded.full_name, visitors.full_name),
                    company = COALESCE(excluded.company, visitors.company),
                    title = COALESCE(excluded.title, visitors.title),
                    email = COALESCE(excluded.email, visitors.email),
                    phone = COALESCE(excluded.phone, visitors.phone),
                    wallet_address = COALESCE(excluded.wallet_address, visitors.wallet_address),
                    notes = COALESCE(excluded.notes, visitors.notes)",
                params![
                    id,
                    visitor.bot_id,
                    visitor.event_id,
                    visitor.source,
                    visitor.telegram_id,
                    visitor.telegram_username,
                    visitor.full_name,
                    visitor.company,
                    visitor.title,
                    visitor.email,
                    visitor.phone,
                    visitor.wallet_address,
                    visitor.notes,
                    now
                ],
            )?;

            let sql = format!(
                "SELECT {} FROM visitors WHERE bot_id = ?1 AND telegram_id = ?2",
                VISITOR_COLUMNS
            );
            Ok(conn.query_row(&sql, params![visitor.bot_id, visitor.telegram_id], visitor_from_row)?)
        })
        .await
    }

    async fn list_visitors_for_bot(&self, bot_id: &str) -> AppResult<Vec<Visitor>> {
        let bot_id = bot_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM visitors WHERE bot_id = ?1 ORDER BY created_at, rowid",
                VISITOR_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![bot_id], visitor_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn list_visitors_for_event(&self, event_id: &str) -> AppResult<Vec<Visitor>> {
        let event_id = event_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM visitors WHERE event_id = ?1 ORDER BY created_at, rowid",
                VISITOR_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![event_id], visitor_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn count_visitors_for_bot(&self, bot_id: &str) -> AppResult<u64> {
        let bot_id = bot_id.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM visitors WHERE bot_id = ?1",
                params![bot_id],
                |row| row.get(0),
            )?;
            Ok(to_u64(count))
        })
        .await
    }

    async fn count_visitors_for_event(&self, event_id: &str) -> AppResult<u64> {
        let event_id = event_id.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM visitors WHERE event_id = ?1",
                params![event_id],
                |row| row.get(0),
            )?;
            Ok(to_u64(count))
        })
        .await
    }

    async fn count_visitors_for_tenant(&self, tenant_id: &str) -> AppResult<u64> {
        let tenant_id = tenant_id.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM visitors v JOIN bots b ON b.id = v.bot_id WHERE b.tenant_id = ?1",
                params![tenant_id],
                |row| row.get(0),
            )?;
            Ok(to_u64(count))
        })
        .await
    }
}

#[async_trait]
impl BroadcastRepository for SqliteRepository {
    async fn create_broadcast_log(&self, broadcast: NewBroadcast) -> AppResult<BroadcastLog> {
        let record = BroadcastLog {
            id: Uuid::new_v4().to_string(),
            bot_id: broadcast.bot_id,
            event_id: broadcast.event_id,
            message: broadcast.message,
            sent_count: broadcast.sent_count,
            failed_count: broadcast.failed_count,
            created_at: Utc::now(),
        };
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO broadcasts (id, bot_id, event_id, message, sent_count, failed_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.bot_id,
                    record.event_id,
                    record.message,
                    to_i64(record.sent_count),
                    to_i64(record.failed_count),
                    record.created_at
                ],
            )?;
            Ok(record)
        })
        .await
    }

    async fn list_broadcasts_for_bot(&self, bot_id: &str) -> AppResult<Vec<BroadcastLog>> {
        let bot_id = bot_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM broadcasts WHERE bot_id = ?1 ORDER BY created_at, rowid",
                BROADCAST_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![bot_id], broadcast_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }
}

#[async_trait]
impl BugReportRepository for SqliteRepository {
    async fn create_bug_report(&self, report: NewBugReport) -> AppResult<BugReport> {
        let record = BugReport {
            id: Uuid::new_v4().to_string(),
            telegram_id: report.telegram_id,
            username: report.username,
            report: report.report,
            created_at: Utc::now(),
        };
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO bug_reports (id, telegram_id, username, report, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![record.id, record.telegram_id, record.username, record.report, record.created_at],
            )?;
            Ok(record)
        })
        .await
    }

    async fn list_bug_reports(&self) -> AppResult<Vec<BugReport>> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM bug_reports ORDER BY created_at, rowid", BUG_REPORT_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], bug_report_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }
}

#[async_trait]
impl AuthCodeRepository for SqliteRepository {
    async fn create_auth_code(&self, code: AuthCode) -> AppResult<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO auth_codes (code, status, telegram_id, telegram_username, first_name, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    code.code,
                    code.status.to_string(),
                    code.telegram_id,
                    code.telegram_username,
                    code.first_name,
                    code.created_at,
                    code.expires_at
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn find_auth_code(&self, code: &str) -> AppResult<Option<AuthCode>> {
        let code = code.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM auth_codes WHERE code = ?1", AUTH_CODE_COLUMNS);
            Ok(conn.query_row(&sql, params![code], auth_code_from_row).optional()?)
        })
        .await
    }

    async fn resolve_auth_code(
        &self,
        code: &str,
        status: AuthCodeStatus,
        telegram_id: TelegramId,
        telegram_username: Option<String>,
        first_name: Option<String>,
    ) -> AppResult<bool> {
        if status == AuthCodeStatus::Pending {
            return Err(AppError::Validation("a code cannot be resolved back to pending".into()));
        }
        let code = code.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE auth_codes SET status = ?2, telegram_id = ?3, telegram_username = ?4, first_name = ?5
                 WHERE code = ?1 AND status = 'pending'",
                params![code, status.to_string(), telegram_id, telegram_username, first_name],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn delete_auth_code(&self, code: &str) -> AppResult<()> {
        let code = code.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM auth_codes WHERE code = ?1", params![code])?;
            Ok(())
        })
        .await
    }
}
