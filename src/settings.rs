use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::webauthn::WebAuthnSettings;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WalletSettings {
    pub application: ApplicationSettings,
    pub ledger: LedgerSettings,
    pub passkey: WebAuthnSettings,
    pub storage: StorageSettings,
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
pub struct LedgerSettings {
    /// Base URL of the transaction relay
    pub relay_url: String,
    /// Test-network faucet endpoint
    pub friendbot_url: String,
    pub network_passphrase: String,
    /// Contract that records votes
    pub vote_contract_id: String,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// JSON file holding the bundler secret and the deployed account
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: "http://localhost:3000,http://localhost:8080".to_string(),
        }
    }
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            relay_url: "http://localhost:8000".to_string(),
            friendbot_url: "https://friendbot.stellar.org".to_string(),
            network_passphrase: "Test SDF Network ; September 2015".to_string(),
            vote_contract_id: String::new(),
            request_timeout_seconds: 30,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: "data/passvote.json".to_string(),
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

impl WalletSettings {
    /// Load settings from configuration files and environment variables,
    /// then initialize logging at the configured level
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings file cannot be read or parsed
    /// - Logger initialization fails
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_env_file();

        let secrets_dir = std::env::var("PASSVOTE_SECRETS_DIR").ok().map(PathBuf::from);
        let mut settings = Self::load_base_settings(Path::new("Settings.toml"), secrets_dir)?;

        Self::apply_env_overrides(&mut settings);
        Self::initialize_logging(&settings.logging)?;

        Ok(settings)
    }

    /// `RUST_LOG` wins over the configured level when set
    fn initialize_logging(logging: &LoggingSettings) -> Result<(), Box<dyn std::error::Error>> {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&logging.level))
            .try_init()?;
        Ok(())
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `PASSVOTE_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file cannot be read or parsed
    fn load_base_settings(
        default_config_path: &Path,
        secrets_dir: Option<PathBuf>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::default();

        if default_config_path.exists() {
            let toml_content = fs::read_to_string(default_config_path)?;
            settings = basic_toml::from_str(&toml_content)?;
            println!(
                "✓ Loaded base settings from {}",
                default_config_path.display()
            );
        }

        if let Some(secrets_dir) = secrets_dir {
            let secrets_path = secrets_dir.join("Settings.toml");
            if secrets_path.exists() {
                let secrets_toml_content = fs::read_to_string(&secrets_path)?;
                settings = basic_toml::from_str(&secrets_toml_content)?;
                println!("✓ Overriding settings from {}", secrets_path.display());
            } else {
                println!(
                    "ℹ PASSVOTE_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Apply environment variable overrides to settings
    fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_ledger_env_overrides(&mut settings.ledger);
        Self::apply_passkey_env_overrides(&mut settings.passkey);
        Self::apply_string_env_override("STORAGE_PATH", &mut settings.storage.path);
        Self::apply_string_env_override("LOG_LEVEL", &mut settings.logging.level);
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        Self::apply_string_env_override("HOST", &mut app_settings.host);
        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                app_settings.port = port;
            }
        }
        Self::apply_string_env_override("CORS_ORIGINS", &mut app_settings.cors_origins);
    }

    fn apply_ledger_env_overrides(ledger_settings: &mut LedgerSettings) {
        Self::apply_string_env_override("LEDGER_RELAY_URL", &mut ledger_settings.relay_url);
        Self::apply_string_env_override("LEDGER_FRIENDBOT_URL", &mut ledger_settings.friendbot_url);
        Self::apply_string_env_override(
            "LEDGER_NETWORK_PASSPHRASE",
            &mut ledger_settings.network_passphrase,
        );
        Self::apply_string_env_override("VOTE_CONTRACT_ID", &mut ledger_settings.vote_contract_id);
    }

    fn apply_passkey_env_overrides(passkey_settings: &mut WebAuthnSettings) {
        Self::apply_string_env_override("PASSKEY_RP_ID", &mut passkey_settings.rp_id);
        Self::apply_string_env_override("PASSKEY_RP_ORIGIN", &mut passkey_settings.rp_origin);
    }

    /// Empty values are ignored so an exported-but-blank variable keeps the file value
    fn apply_string_env_override(env_var: &str, target: &mut String) {
        if let Ok(value) = std::env::var(env_var) {
            if !value.trim().is_empty() {
                *target = value;
            }
        }
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                if line.trim_start().starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// Get CORS origins as a vector of strings
    #[must_use]
    pub fn get_cors_origins(&self) -> Vec<String> {
        self.application
            .cors_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}
