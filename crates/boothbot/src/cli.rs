use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "boothbot")]
#[command(author, version, about = "Multi-tenant Telegram lead-capture bots", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve webhooks and the dashboard API
    Run {
        /// Listen port (defaults to PORT, then 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Point a stored bot's webhook at BASE_URL
    SetWebhook {
        /// Bot id as stored in the database
        bot_id: String,
    },

    /// Delete sessions idle for longer than the inactivity window, once
    SweepSessions,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
