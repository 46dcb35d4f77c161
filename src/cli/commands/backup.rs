use clap::Subcommand;
use uuid::Uuid;

use crate::cli::utils::{format_bytes, output_collection, output_empty_collection, output_success};
use crate::cli::{connect, load_config, OutputFormat};
use crate::database::pagination::MAX_PER_PAGE;
use crate::database::Pagination;
use crate::jobs::JobRegistry;
use crate::ops::{BackupService, BackupTrigger, OpsContext};

#[derive(Subcommand)]
pub enum BackupCommands {
    #[command(about = "Create a backup now and wait for it")]
    Create,

    #[command(about = "List backups, newest first")]
    List,

    #[command(about = "Restore a backup and wait for it")]
    Restore {
        #[arg(help = "Backup ID")]
        id: Uuid,
    },
}

pub async fn handle(cmd: BackupCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config();
    let pool = connect(&config).await?;
    // Own registry; a running server is excluded through the database job lock
    let service = BackupService::new(OpsContext::new(pool, JobRegistry::new(), config));

    match cmd {
        BackupCommands::Create => {
            let backup = service.run_now(BackupTrigger::Manual, None).await?;
            output_success(
                &output_format,
                &format!("Created {} ({})", backup.file_name, format_bytes(backup.size_bytes)),
                Some(serde_json::to_value(&backup)?),
            )
        }
        BackupCommands::List => {
            let page = service.list(Pagination::new(1, MAX_PER_PAGE)).await?;
            if page.items.is_empty() {
                return output_empty_collection(&output_format, "backups", "No backups");
            }
            output_collection(
                &output_format,
                "backups",
                &page.items,
                &format!("{:<36} {:<11} {:<10} {:<6} {}", "ID", "TRIGGER", "SIZE", "MEDIA", "CREATED"),
                |b| {
                    format!(
                        "{:<36} {:<11} {:<10} {:<6} {}",
                        b.id,
                        b.trigger.as_str(),
                        format_bytes(b.size_bytes),
                        if b.includes_media { "yes" } else { "no" },
                        b.created_at.format("%Y-%m-%d %H:%M")
                    )
                },
            )
        }
        BackupCommands::Restore { id } => {
            service.restore_now(id, None).await?;
            output_success(&output_format, &format!("Restored backup {}", id), None)
        }
    }
}
