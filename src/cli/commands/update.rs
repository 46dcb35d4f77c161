use clap::Subcommand;

use crate::cli::utils::output_success;
use crate::cli::{connect, load_config, OutputFormat};
use crate::jobs::JobRegistry;
use crate::ops::{OpsContext, UpdateService};

#[derive(Subcommand)]
pub enum UpdateCommands {
    #[command(about = "Compare the installed version with the release manifest")]
    Check,
}

pub async fn handle(cmd: UpdateCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config();
    let pool = connect(&config).await?;
    let service = UpdateService::new(OpsContext::new(pool, JobRegistry::new(), config), reqwest::Client::new());

    match cmd {
        UpdateCommands::Check => {
            let check = service.check().await?;
            let message = if check.update_available {
                format!("Update available: {} → {}", check.current, check.latest)
            } else {
                format!("Up to date ({})", check.current)
            };
            output_success(&output_format, &message, Some(serde_json::to_value(&check)?))
        }
    }
}
