//! Common test utilities
//!
//! Shared across all integration tests of the bot crate

pub mod fixtures;
pub mod recorder;
pub mod updates;

#[allow(unused_imports)]
pub use fixtures::{FakeFactory, TestEnv};
#[allow(unused_imports)]
pub use recorder::{RecordingMessenger, Sent};
#[allow(unused_imports)]
pub use updates::{callback_update, text_update};
