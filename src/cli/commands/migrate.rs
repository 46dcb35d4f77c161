use crate::cli::utils::output_success;
use crate::cli::{connect, load_config, OutputFormat};
use crate::database::DatabaseManager;

pub async fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config();
    let pool = connect(&config).await?;
    DatabaseManager::migrate(&pool).await?;
    output_success(&output_format, "Database migrations applied", None)
}
