use clap::Subcommand;

use crate::cli::utils::output_success;
use crate::cli::{connect, load_config, OutputFormat};
use crate::services::users::UserService;

#[derive(Subcommand)]
pub enum UserCommands {
    #[command(about = "Create an operator account with access to /api/root")]
    CreateSuperAdmin {
        #[arg(help = "Login email")]
        email: String,

        #[arg(help = "Password, at least 8 characters")]
        password: String,

        #[arg(long, help = "Display name (defaults to the email)")]
        name: Option<String>,
    },
}

pub async fn handle(cmd: UserCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config();
    let service = UserService::new(connect(&config).await?);

    match cmd {
        UserCommands::CreateSuperAdmin { email, password, name } => {
            let display_name = name.unwrap_or_else(|| email.clone());
            let user = service.create_super_admin(&email, &password, &display_name).await?;
            output_success(
                &output_format,
                &format!("Created super admin {}", user.email),
                Some(serde_json::to_value(&user)?),
            )
        }
    }
}
