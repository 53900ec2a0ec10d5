use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub seed: SeedConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Directory holding the built single-page app (served as the fallback route)
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    /// Allowed CORS origins. Empty means same-origin only.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            static_dir: default_static_dir(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static/dist")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Email of the bootstrap admin account created on first start
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    /// Password of the bootstrap admin account. Only used when no admin exists yet.
    pub admin_password: Option<String>,
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
    /// Set the `Secure` attribute on the session cookie
    #[serde(default)]
    pub secure_cookies: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_email: default_admin_email(),
            admin_password: None,
            session_ttl_hours: default_session_ttl_hours(),
            secure_cookies: false,
        }
    }
}

fn default_admin_email() -> String {
    "admin@portal.local".to_string()
}

fn default_session_ttl_hours() -> i64 {
    24 * 7
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Requests per window for login and registration
    #[serde(default = "default_auth_requests")]
    pub auth_requests_per_window: u32,
    /// Requests per window for public (unauthenticated) endpoints
    #[serde(default = "default_public_requests")]
    pub public_requests_per_window: u32,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
    /// Key clients by X-Forwarded-For / X-Real-IP. Only enable behind a
    /// reverse proxy that overwrites these headers.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_seconds: default_window_seconds(),
            auth_requests_per_window: default_auth_requests(),
            public_requests_per_window: default_public_requests(),
            cleanup_interval: default_cleanup_interval(),
            trust_proxy_headers: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_window_seconds() -> u64 {
    60
}

fn default_auth_requests() -> u32 {
    20
}

fn default_public_requests() -> u32 {
    120
}

fn default_cleanup_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SeedConfig {
    /// Populate an empty database with demonstration records
    #[serde(default)]
    pub sample_data: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentsConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }

    /// Directory where uploaded document files are kept
    pub fn documents_dir(&self) -> PathBuf {
        self.server.data_dir.join("documents")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.session_ttl_hours, 168);
        assert!(config.rate_limit.enabled);
        assert!(!config.seed.sample_data);
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 9000
            cors_origins = ["http://localhost:5173"]

            [auth]
            admin_email = "ops@example.com"
            admin_password = "S3cure!Passphrase"

            [seed]
            sample_data = true
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.cors_origins.len(), 1);
        assert_eq!(config.auth.admin_email, "ops@example.com");
        assert_eq!(config.auth.admin_password.as_deref(), Some("S3cure!Passphrase"));
        assert!(config.seed.sample_data);
        assert_eq!(config.rate_limit.window_seconds, 60);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load(Path::new("/nonexistent/portal.toml")).unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.documents_dir(), PathBuf::from("./data/documents"));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(Config::from_toml("[server\nport = ").is_err());
    }
}
