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
    pub email: EmailConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
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

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Validity window for email verification tokens, in hours
    #[serde(default = "default_verification_ttl_hours")]
    pub verification_ttl_hours: i64,
    /// Validity window for password reset tokens, in hours
    #[serde(default = "default_reset_ttl_hours")]
    pub reset_ttl_hours: i64,
    /// Optional bootstrap admin account, created at startup if missing
    pub admin_username: Option<String>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            verification_ttl_hours: default_verification_ttl_hours(),
            reset_ttl_hours: default_reset_ttl_hours(),
            admin_username: None,
            admin_email: None,
            admin_password: None,
        }
    }
}

fn default_verification_ttl_hours() -> i64 {
    24
}

fn default_reset_ttl_hours() -> i64 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default = "default_smtp_tls")]
    pub smtp_tls: bool,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from_address: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Frontend page that posts the embedded token to /auth/verify-email
    #[serde(default = "default_verify_url")]
    pub verify_url: String,
    /// Frontend page that posts the embedded token to /auth/password/reset
    #[serde(default = "default_reset_url")]
    pub reset_url: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_tls: default_smtp_tls(),
            smtp_username: None,
            smtp_password: None,
            from_address: None,
            from_name: default_from_name(),
            verify_url: default_verify_url(),
            reset_url: default_reset_url(),
        }
    }
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.from_address.is_some()
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_tls() -> bool {
    true
}

fn default_from_name() -> String {
    "Podhost".to_string()
}

fn default_verify_url() -> String {
    "http://localhost:3000/verify-email".to_string()
}

fn default_reset_url() -> String {
    "http://localhost:3000/reset-password".to_string()
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

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.verification_ttl_hours, 24);
        assert_eq!(config.auth.reset_ttl_hours, 1);
        assert!(!config.email.is_configured());
    }

    #[test]
    fn test_parse_partial_config() {
        let config: Config = toml::from_str(
            r#"
            [auth]
            reset_ttl_hours = 2

            [email]
            smtp_host = "smtp.example.com"
            from_address = "no-reply@example.com"
            "#,
        )
        .unwrap();
        assert_eq!(config.auth.reset_ttl_hours, 2);
        assert_eq!(config.auth.verification_ttl_hours, 24);
        assert!(config.email.is_configured());
        assert_eq!(config.email.smtp_port, 587);
    }
}
