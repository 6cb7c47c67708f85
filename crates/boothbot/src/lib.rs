//! BoothBot: many tenant Telegram bots behind one webhook endpoint.
//!
//! Updates arrive at `POST /webhook/{bot_id}`, the [`registry::BotRegistry`]
//! resolves (or builds) the bot's instance and the [`middleware`] pipeline
//! runs the visitor flow or an admin command against the sender's session.

pub mod cli;
pub mod context;
pub mod flow;
pub mod keyboards;
pub mod logging;
pub mod masterbot;
pub mod messenger;
pub mod middleware;
pub mod registry;
pub mod server;
pub mod update;
