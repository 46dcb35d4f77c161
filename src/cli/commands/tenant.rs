use clap::Subcommand;

use crate::cli::utils::{output_collection, output_empty_collection, output_success};
use crate::cli::{connect, load_config, OutputFormat};
use crate::database::pagination::MAX_PER_PAGE;
use crate::database::Pagination;
use crate::services::tenants::{CreateTenant, InitialAdmin, TenantService};

#[derive(Subcommand)]
pub enum TenantCommands {
    #[command(about = "Create a tenant, optionally with its first admin")]
    Create {
        #[arg(help = "URL-safe slug, becomes <slug>.<base_domain>")]
        slug: String,

        #[arg(help = "Display name")]
        name: String,

        #[arg(long, help = "Default language", default_value = "en")]
        language: String,

        #[arg(long, requires = "admin_password", help = "Email of the initial tenant admin")]
        admin_email: Option<String>,

        #[arg(long, requires = "admin_email", help = "Password of the initial tenant admin")]
        admin_password: Option<String>,
    },

    #[command(about = "List tenants")]
    List {
        #[arg(long, help = "Include soft-deleted tenants")]
        all: bool,
    },
}

pub async fn handle(cmd: TenantCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config();
    let service = TenantService::new(connect(&config).await?);

    match cmd {
        TenantCommands::Create {
            slug,
            name,
            language,
            admin_email,
            admin_password,
        } => {
            let admin = match (admin_email, admin_password) {
                (Some(email), Some(password)) => Some(InitialAdmin {
                    email,
                    password,
                    display_name: None,
                }),
                _ => None,
            };
            let created = service
                .create(CreateTenant {
                    slug,
                    name,
                    default_language: Some(language),
                    languages: None,
                    plan_id: None,
                    admin,
                })
                .await?;

            let message = match &created.admin {
                Some(admin) => format!("Created tenant '{}' with admin {}", created.tenant.slug, admin.email),
                None => format!("Created tenant '{}'", created.tenant.slug),
            };
            output_success(&output_format, &message, Some(serde_json::to_value(&created)?))
        }
        TenantCommands::List { all } => {
            let page = service.list(all, Pagination::new(1, MAX_PER_PAGE)).await?;
            if page.items.is_empty() {
                return output_empty_collection(&output_format, "tenants", "No tenants");
            }
            output_collection(
                &output_format,
                "tenants",
                &page.items,
                &format!("{:<20} {:<30} {:<10} {}", "SLUG", "NAME", "STATUS", "LANGUAGES"),
                |t| {
                    let status = match (t.deleted_at.is_some(), t.is_active) {
                        (true, _) => "deleted",
                        (false, true) => "active",
                        (false, false) => "inactive",
                    };
                    format!("{:<20} {:<30} {:<10} {}", t.slug, t.name, status, t.languages.join(","))
                },
            )?;
            if matches!(output_format, OutputFormat::Text) && page.total > page.items.len() as i64 {
                println!("({} of {} shown)", page.items.len(), page.total);
            }
            Ok(())
        }
    }
}
