//! BoothBot core: everything behind the Telegram transport.
//!
//! Conversation sessions, deep-link event resolution, storage, billing,
//! lead export and dashboard login live here so the bot crate only deals
//! with updates and messages.

pub mod auth;
pub mod billing;
pub mod config;
pub mod error;
pub mod events;
pub mod export;
pub mod qr;
pub mod repository;
pub mod session;
pub mod storage;
pub mod types;
pub mod validation;

pub use error::{AppError, AppResult};
