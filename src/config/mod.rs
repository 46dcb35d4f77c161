use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub tenancy: TenancyConfig,
    pub media: MediaConfig,
    pub backup: BackupConfig,
    pub updates: UpdateConfig,
    pub domains: DomainConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Read from DATABASE_URL; never written to the YAML file.
    #[serde(skip)]
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub auto_migrate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default, skip_serializing)]
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub refresh_grace_hours: u64,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Tenants are reachable at `<slug>.<base_domain>`.
    pub base_domain: String,
    pub resolver_ttl_secs: u64,
    pub resolver_negative_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub storage_root: PathBuf,
    pub max_upload_bytes: usize,
    pub allowed_mime_types: Vec<String>,
    pub public_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    pub backup_dir: PathBuf,
    pub work_dir: PathBuf,
    pub pg_dump_bin: String,
    pub psql_bin: String,
    pub tar_bin: String,
    pub include_media: bool,
    /// Zero disables scheduled backups.
    pub schedule_interval_hours: u64,
    pub retention_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    pub manifest_url: Option<String>,
    pub releases_dir: PathBuf,
    pub current_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub txt_record_prefix: String,
    pub doh_endpoint: String,
    pub max_attempts: i32,
    pub backoff_base_secs: u64,
    pub backoff_max_secs: u64,
    pub sweep_interval_secs: u64,
}

/// Partial configuration read from `CMS_CONFIG_FILE`. Every section is optional
/// so a file only needs to carry what differs from the profile defaults.
#[derive(Debug, Default, Deserialize)]
struct FileOverrides {
    server: Option<ServerConfig>,
    database: Option<DatabaseConfig>,
    security: Option<SecurityConfig>,
    tenancy: Option<TenancyConfig>,
    media: Option<MediaConfig>,
    backup: Option<BackupConfig>,
    updates: Option<UpdateConfig>,
    domains: Option<DomainConfig>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        let base = match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        };

        let base = match env::var("CMS_CONFIG_FILE") {
            Ok(path) => match base.clone().with_file(Path::new(&path)) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Ignoring config file {}: {}", path, e);
                    base
                }
            },
            Err(_) => base,
        };

        base.with_env_overrides()
    }

    /// Layer a YAML file over the current values.
    pub fn with_file(self, path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        self.with_yaml(&raw)
    }

    fn with_yaml(mut self, raw: &str) -> anyhow::Result<Self> {
        let file: FileOverrides = serde_yaml::from_str(raw)?;
        if let Some(v) = file.server {
            self.server = v;
        }
        if let Some(v) = file.database {
            let url = self.database.url.take();
            self.database = DatabaseConfig { url, ..v };
        }
        if let Some(v) = file.security {
            // The secret is never taken from a file that may be committed.
            let secret = std::mem::take(&mut self.security.jwt_secret);
            self.security = SecurityConfig { jwt_secret: secret, ..v };
        }
        if let Some(v) = file.tenancy {
            self.tenancy = v;
        }
        if let Some(v) = file.media {
            self.media = v;
        }
        if let Some(v) = file.backup {
            self.backup = v;
        }
        if let Some(v) = file.updates {
            self.updates = v;
        }
        if let Some(v) = file.domains {
            self.domains = v;
        }
        Ok(self)
    }

    fn with_env_overrides(mut self) -> Self {
        // Server
        if let Ok(v) = env::var("CMS_HOST") {
            self.server.host = v;
        }
        if let Some(v) = env::var("CMS_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }

        // Database
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_AUTO_MIGRATE") {
            self.database.auto_migrate = v.parse().unwrap_or(self.database.auto_migrate);
        }

        // Security
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_REFRESH_GRACE_HOURS") {
            self.security.refresh_grace_hours = v.parse().unwrap_or(self.security.refresh_grace_hours);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        // Tenancy
        if let Ok(v) = env::var("TENANCY_BASE_DOMAIN") {
            self.tenancy.base_domain = v.trim().trim_end_matches('.').to_ascii_lowercase();
        }
        if let Ok(v) = env::var("TENANCY_RESOLVER_TTL_SECS") {
            self.tenancy.resolver_ttl_secs = v.parse().unwrap_or(self.tenancy.resolver_ttl_secs);
        }

        // Media
        if let Ok(v) = env::var("MEDIA_STORAGE_ROOT") {
            self.media.storage_root = PathBuf::from(v);
        }
        if let Ok(v) = env::var("MEDIA_MAX_UPLOAD_BYTES") {
            self.media.max_upload_bytes = v.parse().unwrap_or(self.media.max_upload_bytes);
        }
        if let Ok(v) = env::var("MEDIA_PUBLIC_BASE_URL") {
            self.media.public_base_url = v;
        }

        // Backup
        if let Ok(v) = env::var("BACKUP_DIR") {
            self.backup.backup_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("BACKUP_WORK_DIR") {
            self.backup.work_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("BACKUP_PG_DUMP_BIN") {
            self.backup.pg_dump_bin = v;
        }
        if let Ok(v) = env::var("BACKUP_PSQL_BIN") {
            self.backup.psql_bin = v;
        }
        if let Ok(v) = env::var("BACKUP_INCLUDE_MEDIA") {
            self.backup.include_media = v.parse().unwrap_or(self.backup.include_media);
        }
        if let Ok(v) = env::var("BACKUP_SCHEDULE_INTERVAL_HOURS") {
            self.backup.schedule_interval_hours = v.parse().unwrap_or(self.backup.schedule_interval_hours);
        }
        if let Ok(v) = env::var("BACKUP_RETENTION_COUNT") {
            self.backup.retention_count = v.parse().unwrap_or(self.backup.retention_count);
        }

        // Updates
        if let Ok(v) = env::var("UPDATE_MANIFEST_URL") {
            self.updates.manifest_url = Some(v).filter(|s| !s.is_empty());
        }
        if let Ok(v) = env::var("UPDATE_RELEASES_DIR") {
            self.updates.releases_dir = PathBuf::from(v);
        }

        // Domains
        if let Ok(v) = env::var("DOMAIN_DOH_ENDPOINT") {
            self.domains.doh_endpoint = v;
        }
        if let Ok(v) = env::var("DOMAIN_MAX_ATTEMPTS") {
            self.domains.max_attempts = v.parse().unwrap_or(self.domains.max_attempts);
        }
        if let Ok(v) = env::var("DOMAIN_SWEEP_INTERVAL_SECS") {
            self.domains.sweep_interval_secs = v.parse().unwrap_or(self.domains.sweep_interval_secs);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
                auto_migrate: true,
            },
            security: SecurityConfig {
                jwt_secret: "development-secret-change-me".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
                refresh_grace_hours: 24 * 7,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
            tenancy: TenancyConfig {
                base_domain: "localhost".to_string(),
                resolver_ttl_secs: 5,
                resolver_negative_ttl_secs: 1,
            },
            media: MediaConfig {
                storage_root: PathBuf::from("storage/media"),
                max_upload_bytes: 20 * 1024 * 1024, // 20MB
                allowed_mime_types: default_mime_types(),
                public_base_url: "/media".to_string(),
            },
            backup: BackupConfig {
                backup_dir: PathBuf::from("storage/backups"),
                work_dir: PathBuf::from("storage/work"),
                pg_dump_bin: "pg_dump".to_string(),
                psql_bin: "psql".to_string(),
                tar_bin: "tar".to_string(),
                include_media: true,
                schedule_interval_hours: 0,
                retention_count: 3,
            },
            updates: UpdateConfig {
                manifest_url: None,
                releases_dir: PathBuf::from("storage/releases"),
                current_version: env!("CARGO_PKG_VERSION").to_string(),
            },
            domains: DomainConfig {
                txt_record_prefix: "_cms-verification".to_string(),
                doh_endpoint: "https://cloudflare-dns.com/dns-query".to_string(),
                max_attempts: 5,
                backoff_base_secs: 30,
                backoff_max_secs: 60 * 10,
                sweep_interval_secs: 60,
            },
        }
    }

    pub fn staging() -> Self {
        let dev = Self::development();
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 10,
                auto_migrate: true,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
                refresh_grace_hours: 24 * 3,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
            tenancy: TenancyConfig {
                base_domain: "staging.example.com".to_string(),
                resolver_ttl_secs: 60,
                resolver_negative_ttl_secs: 10,
            },
            media: MediaConfig {
                storage_root: PathBuf::from("/var/lib/cms/media"),
                max_upload_bytes: 10 * 1024 * 1024, // 10MB
                ..dev.media
            },
            backup: BackupConfig {
                backup_dir: PathBuf::from("/var/lib/cms/backups"),
                work_dir: PathBuf::from("/var/lib/cms/work"),
                schedule_interval_hours: 24,
                retention_count: 7,
                ..dev.backup
            },
            updates: UpdateConfig {
                releases_dir: PathBuf::from("/var/lib/cms/releases"),
                ..dev.updates
            },
            domains: DomainConfig {
                max_attempts: 10,
                backoff_base_secs: 60,
                backoff_max_secs: 60 * 60,
                sweep_interval_secs: 60,
                ..dev.domains
            },
        }
    }

    pub fn production() -> Self {
        let staging = Self::staging();
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
                auto_migrate: false,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
                refresh_grace_hours: 24,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
            tenancy: TenancyConfig {
                base_domain: "example.com".to_string(),
                resolver_ttl_secs: 300,
                resolver_negative_ttl_secs: 30,
            },
            media: staging.media,
            backup: BackupConfig {
                retention_count: 14,
                ..staging.backup
            },
            updates: staging.updates,
            domains: DomainConfig {
                max_attempts: 12,
                backoff_base_secs: 120,
                backoff_max_secs: 60 * 60 * 6,
                sweep_interval_secs: 300,
                ..staging.domains
            },
        }
    }
}

fn default_mime_types() -> Vec<String> {
    [
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "image/svg+xml",
        "application/pdf",
        "video/mp4",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_defaults_are_usable_without_env() {
        let config = AppConfig::development();
        assert!(!config.security.jwt_secret.is_empty());
        assert!(config.database.auto_migrate);
        assert_eq!(config.backup.schedule_interval_hours, 0);
        assert!(config.media.allowed_mime_types.iter().any(|m| m == "image/png"));
    }

    #[test]
    fn production_requires_explicit_secret() {
        let config = AppConfig::production();
        assert!(config.security.jwt_secret.is_empty());
        assert!(!config.database.auto_migrate);
        assert!(config.backup.schedule_interval_hours > 0);
    }

    #[test]
    fn yaml_file_overrides_sections_but_keeps_secret() {
        let raw = r#"
server:
  host: 10.0.0.1
  port: 9000
security:
  jwt_secret: from-file
  jwt_expiry_hours: 1
  refresh_grace_hours: 2
  cors_origins: ["https://cms.test"]
"#;
        let config = AppConfig::development().with_yaml(raw).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.security.jwt_expiry_hours, 1);
        assert_eq!(config.security.jwt_secret, "development-secret-change-me");
        // Untouched sections keep their profile defaults
        assert_eq!(config.tenancy.base_domain, "localhost");
    }
}
