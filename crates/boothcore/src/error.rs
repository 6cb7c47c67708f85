use thiserror::Error;

/// Centralized error type for the core library
///
/// Storage, serialization, token and messaging failures are all converted to
/// this enum so that the bot layer can decide in one place what a failure
/// means for the user (re-prompt, apology, or best-effort skip).
///
/// # Example
///
/// ```no_run
/// use boothcore::error::AppError;
///
/// fn handle_error(err: AppError) {
///     eprintln!("Error: {}", err);
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// Schema migration errors
    #[error("Migration error: {0}")]
    Migration(String),

    /// JSON (de)serialization errors, e.g. persisted session payloads
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Token issuance or verification errors
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// Telegram API errors
    #[cfg(feature = "telegram")]
    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    /// QR rendering errors
    #[error("QR code error: {0}")]
    Qr(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backing service could not be reached (blocking task died, pool exhausted)
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Anyhow errors (for general error handling)
    #[error("Application error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Unavailable(format!("blocking task failed: {}", err))
    }
}

impl From<qrcode::types::QrError> for AppError {
    fn from(err: qrcode::types::QrError) -> Self {
        AppError::Qr(err.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Qr(err.to_string())
    }
}
