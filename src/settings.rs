use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::u2f::{AttestationPolicy, U2fSettings};

/// File name looked up in the working directory and in `U2FRS_CONFIG_DIR`
pub const SETTINGS_FILE: &str = "Settings.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerSettings {
    pub application: ApplicationSettings,
    pub u2f: U2fSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8081,
            cors_origins: "http://localhost:8081".to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ServerSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// Priority, highest first:
    /// 1. Environment variables
    /// 2. `Settings.toml` in `U2FRS_CONFIG_DIR` (if set and present)
    /// 3. `Settings.toml` in the current directory
    /// 4. Defaults
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A settings file exists but cannot be read or parsed
    /// - An environment override has an invalid value
    /// - The resulting settings fail validation
    pub fn load() -> anyhow::Result<Self> {
        Self::load_env_file();

        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings)?;
        settings.validate()?;

        Ok(settings)
    }

    fn load_base_settings() -> anyhow::Result<Self> {
        let mut settings = Self::default();

        let default_config_path = PathBuf::from(SETTINGS_FILE);
        if default_config_path.exists() {
            settings = Self::from_file(&default_config_path)?;
            println!("✓ Loaded base settings from {}", default_config_path.display());
        }

        if let Ok(config_dir) = std::env::var("U2FRS_CONFIG_DIR") {
            let config_path = Path::new(&config_dir).join(SETTINGS_FILE);
            if config_path.exists() {
                settings = Self::from_file(&config_path)?;
                println!("✓ Overriding settings from {}", config_path.display());
            } else {
                println!(
                    "ℹ U2FRS_CONFIG_DIR set but no {SETTINGS_FILE} found at: {}",
                    config_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Parse a TOML settings file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        basic_toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Apply environment variable overrides to settings
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric or policy override cannot be parsed
    pub fn apply_env_overrides(settings: &mut Self) -> anyhow::Result<()> {
        Self::apply_application_env_overrides(&mut settings.application)?;
        Self::apply_u2f_env_overrides(&mut settings.u2f)?;
        Self::apply_logging_env_overrides(&mut settings.logging);
        Ok(())
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) -> anyhow::Result<()> {
        if let Ok(host) = std::env::var("HOST") {
            app_settings.host = host;
        }
        if let Ok(port) = std::env::var("PORT") {
            app_settings.port = port
                .parse()
                .with_context(|| format!("invalid PORT value: {port}"))?;
        }
        if let Ok(cors_origins) = std::env::var("CORS_ORIGINS") {
            app_settings.cors_origins = cors_origins;
        }
        Ok(())
    }

    fn apply_u2f_env_overrides(u2f_settings: &mut U2fSettings) -> anyhow::Result<()> {
        if let Ok(app_id) = std::env::var("U2F_APP_ID") {
            u2f_settings.app_id = Some(app_id).filter(|value| !value.is_empty());
        }
        if let Ok(facets) = std::env::var("U2F_TRUSTED_FACETS") {
            u2f_settings.trusted_facets = split_list(&facets);
        }
        if let Ok(timeout) = std::env::var("U2F_CHALLENGE_TIMEOUT_SECONDS") {
            u2f_settings.challenge_timeout_seconds = timeout
                .parse()
                .with_context(|| format!("invalid U2F_CHALLENGE_TIMEOUT_SECONDS value: {timeout}"))?;
        }
        if let Ok(policy) = std::env::var("U2F_ATTESTATION_POLICY") {
            u2f_settings.attestation_policy = policy
                .parse::<AttestationPolicy>()
                .map_err(anyhow::Error::msg)?;
        }
        if let Ok(roots) = std::env::var("U2F_ATTESTATION_ROOTS") {
            u2f_settings.attestation_roots = Some(roots).filter(|value| !value.is_empty());
        }
        Ok(())
    }

    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging_settings.level = log_level;
        }
    }

    /// Load environment variables from a `.env` file, never overriding
    /// variables already set
    fn load_env_file() {
        if let Ok(contents) = fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let key = key.trim();
                    if std::env::var_os(key).is_none() {
                        std::env::set_var(key, value.trim());
                    }
                }
            }
        }
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns an error if the app id or a trusted facet is not an absolute
    /// `http`/`https` URL
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(app_id) = &self.u2f.app_id {
            validate_web_origin(app_id).context("invalid u2f.app_id")?;
        }
        for facet in &self.u2f.trusted_facets {
            validate_web_origin(facet).context("invalid u2f.trusted_facets entry")?;
        }
        Ok(())
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// Get CORS origins as a vector of strings
    #[must_use]
    pub fn get_cors_origins(&self) -> Vec<String> {
        split_list(&self.application.cors_origins)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn validate_web_origin(value: &str) -> anyhow::Result<()> {
    let url = Url::parse(value).with_context(|| format!("{value} is not a URL"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("{value} must use http or https");
    }
    if url.host_str().is_none() {
        bail!("{value} has no host");
    }
    Ok(())
}
