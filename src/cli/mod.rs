pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::database::DatabaseManager;

#[derive(Parser)]
#[command(name = "cms")]
#[command(about = "Tenant CMS - server and operator commands")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server and background jobs")]
    Serve,

    #[command(about = "Apply database migrations")]
    Migrate,

    #[command(about = "Tenant management")]
    Tenant {
        #[command(subcommand)]
        cmd: commands::tenant::TenantCommands,
    },

    #[command(about = "User management")]
    User {
        #[command(subcommand)]
        cmd: commands::user::UserCommands,
    },

    #[command(about = "Database and media backups")]
    Backup {
        #[command(subcommand)]
        cmd: commands::backup::BackupCommands,
    },

    #[command(about = "Self-update")]
    Update {
        #[command(subcommand)]
        cmd: commands::update::UpdateCommands,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Serve => commands::serve::handle().await,
        Commands::Migrate => commands::migrate::handle(output_format).await,
        Commands::Tenant { cmd } => commands::tenant::handle(cmd, output_format).await,
        Commands::User { cmd } => commands::user::handle(cmd, output_format).await,
        Commands::Backup { cmd } => commands::backup::handle(cmd, output_format).await,
        Commands::Update { cmd } => commands::update::handle(cmd, output_format).await,
    }
}

/// Process configuration, shared so the server and the jobs read one value
pub fn load_config() -> Arc<AppConfig> {
    Arc::new(crate::config::config().clone())
}

/// Connect eagerly; operator commands should fail fast
pub async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    Ok(DatabaseManager::connect(&config.database).await?)
}
