use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn flag(name: &str) -> bool {
    matches!(
        env::var(name).map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Ok("1" | "true" | "yes" | "on")
    )
}

/// Database file path
/// Read from DATABASE_PATH environment variable
/// Default: boothbot.sqlite
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "boothbot.sqlite".to_string()));

/// HTTP port for the webhook/API server
/// Read from PORT environment variable
/// Default: 3000
pub static PORT: Lazy<u16> = Lazy::new(|| {
    env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(3000)
});

/// Public base URL of this service, used to build per-bot webhook URLs
/// (`<BASE_URL>/webhook/<bot_id>`)
pub static BASE_URL: Lazy<Option<String>> = Lazy::new(|| non_empty("BASE_URL").map(|u| u.trim_end_matches('/').to_string()));

/// Token of the platform's own bot (tenant onboarding, login approval)
pub static MASTER_BOT_TOKEN: Lazy<Option<String>> = Lazy::new(|| non_empty("MASTER_BOT_TOKEN"));

/// Username of the platform's own bot, used in login deep links
pub static MASTER_BOT_USERNAME: Lazy<String> =
    Lazy::new(|| non_empty("MASTER_BOT_USERNAME").unwrap_or_else(|| "MoongateEventBot".to_string()));

/// Secret for signing dashboard tokens
pub static JWT_SECRET: Lazy<Option<String>> = Lazy::new(|| non_empty("JWT_SECRET"));

/// Custom Bot API server (e.g. a local telegram-bot-api instance)
pub static BOT_API_URL: Lazy<Option<String>> = Lazy::new(|| non_empty("BOT_API_URL"));

/// Attach the bot's most recent event to a payload-less `/start`
/// when the conversation has no sticky event yet
pub static EVENT_DEFAULT_FALLBACK: Lazy<bool> = Lazy::new(|| flag("EVENT_DEFAULT_FALLBACK"));

/// Who may run admin commands: `owner` (default) or `delegates`
pub static ADMIN_POLICY: Lazy<String> =
    Lazy::new(|| non_empty("ADMIN_POLICY").unwrap_or_else(|| "owner".to_string()));

/// Conversation session configuration
pub mod session {
    use super::Duration;

    /// Inactivity window after which a session is purged
    pub const TIMEOUT_SECS: u64 = 30 * 60;

    /// Freshness window of the read-through session cache
    pub const CACHE_FRESHNESS_SECS: u64 = 5;

    /// Interval between inactivity sweeps
    pub const SWEEP_INTERVAL_SECS: u64 = 60;

    pub fn timeout() -> Duration {
        Duration::from_secs(TIMEOUT_SECS)
    }

    pub fn cache_freshness() -> Duration {
        Duration::from_secs(CACHE_FRESHNESS_SECS)
    }

    pub fn sweep_interval() -> Duration {
        Duration::from_secs(SWEEP_INTERVAL_SECS)
    }
}

/// Dashboard authentication configuration
pub mod auth {
    use super::Duration;

    /// Lifetime of a deep-link login code
    pub const LOGIN_CODE_TTL_SECS: u64 = 300;

    /// Lifetime of an issued dashboard token
    pub const TOKEN_TTL_DAYS: i64 = 7;

    /// `/start` payload prefix reserved for login codes
    pub const LOGIN_PAYLOAD_PREFIX: &str = "login_";

    /// Maximum age of a Telegram login widget payload
    pub const TELEGRAM_AUTH_MAX_AGE_SECS: i64 = 86_400;

    pub fn login_code_ttl() -> Duration {
        Duration::from_secs(LOGIN_CODE_TTL_SECS)
    }
}

/// Billing allowance configuration
pub mod billing {
    /// Contacts included in the free tier
    pub const FREE_CONTACT_LIMIT: u64 = 25;

    /// Days after tenant signup during which limits are not enforced
    pub const TRIAL_DAYS: i64 = 14;

    /// Warn this many contacts before the free limit
    pub const WARNING_MARGIN: u64 = 5;

    /// Pro price in USD per started block of contacts
    pub const PRO_PRICE_PER_BLOCK: u64 = 100;
    pub const PRO_BLOCK_SIZE: u64 = 1000;
}

/// Broadcast fan-out configuration
pub mod broadcast {
    /// Number of recipient sends in flight at once
    pub const CONCURRENCY: usize = 8;
}

/// Network configuration
pub mod network {
    use super::Duration;

    /// Request timeout for Bot API calls (in seconds)
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;

    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}
