//! Lullwave CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run functions database migrations
//! lw-cli migrate
//!
//! # Store the transactional email API key
//! lw-cli settings set email_api_key re_xxxxxxxx
//!
//! # Waitlist numbers
//! lw-cli subscribers stats
//!
//! # Add an address by hand
//! lw-cli subscribers add listener@example.com
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `settings get|set|delete` - Manage `app_settings`
//! - `subscribers stats|add` - Inspect and seed the waitlist

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "lw-cli")]
#[command(author, version, about = "Lullwave CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage runtime settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Manage waitlist subscribers
    Subscribers {
        #[command(subcommand)]
        action: SubscribersAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print a setting (secrets are masked)
    Get {
        /// Setting key
        key: String,
    },
    /// Set a setting
    Set {
        /// Setting key
        key: String,
        /// Setting value
        value: String,
    },
    /// Delete a setting
    Delete {
        /// Setting key
        key: String,
    },
}

#[derive(Subcommand)]
enum SubscribersAction {
    /// Show total and active subscriber counts
    Stats,
    /// Add or reactivate a subscriber
    Add {
        /// Subscriber email address
        email: String,

        /// Source label stored on the row
        #[arg(short, long, default_value = "cli")]
        source: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Settings { action } => match action {
            SettingsAction::Get { key } => commands::settings::get(&key).await?,
            SettingsAction::Set { key, value } => commands::settings::set(&key, &value).await?,
            SettingsAction::Delete { key } => commands::settings::delete(&key).await?,
        },
        Commands::Subscribers { action } => match action {
            SubscribersAction::Stats => commands::subscribers::stats().await?,
            SubscribersAction::Add { email, source } => {
                commands::subscribers::add(&email, &source).await?;
            }
        },
    }
    Ok(())
}
