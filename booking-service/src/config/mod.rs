use secrecy::{ExposeSecret, Secret};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::path::PathBuf;

pub const SANDBOX_BASE_URL: &str = "https://sandbox.safaricom.co.ke";
pub const PRODUCTION_BASE_URL: &str = "https://api.safaricom.co.ke";

#[derive(Debug, Clone)]
pub struct BookingConfig {
    pub common: core_config::Config,
    pub storage: StorageConfig,
    pub mpesa: MpesaConfig,
    pub service_name: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// JSON document holding the full booking collection.
    pub data_file: PathBuf,
    /// Directory for uploaded payment screenshots, served under `/uploads`.
    pub upload_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MpesaEnvironment {
    Sandbox,
    Production,
}

impl std::str::FromStr for MpesaEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sandbox" => Ok(MpesaEnvironment::Sandbox),
            "production" | "prod" => Ok(MpesaEnvironment::Production),
            _ => Err(format!("Invalid M-Pesa environment: {}", s)),
        }
    }
}

/// Daraja credentials. Everything except the base URL is optional at boot;
/// operations that need a missing value fail with a configuration error.
#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub environment: MpesaEnvironment,
    pub api_base_url: String,
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<Secret<String>>,
    pub shortcode: Option<String>,
    pub passkey: Option<Secret<String>>,
    pub callback_base_url: Option<String>,
}

impl MpesaConfig {
    pub fn new(environment: MpesaEnvironment) -> Self {
        let api_base_url = match environment {
            MpesaEnvironment::Sandbox => SANDBOX_BASE_URL,
            MpesaEnvironment::Production => PRODUCTION_BASE_URL,
        }
        .to_string();

        Self {
            environment,
            api_base_url,
            consumer_key: None,
            consumer_secret: None,
            shortcode: None,
            passkey: None,
            callback_base_url: None,
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.consumer_key.as_deref().is_some_and(|k| !k.is_empty())
            && self
                .consumer_secret
                .as_ref()
                .is_some_and(|s| !s.expose_secret().is_empty())
    }

    pub fn is_complete(&self) -> bool {
        self.has_credentials()
            && self.shortcode.is_some()
            && self.passkey.is_some()
            && self.callback_base_url.is_some()
    }
}

impl BookingConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env and APP__ prefix)
        let mut common = core_config::Config::load()?;

        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        if let Ok(port) = env::var("PORT") {
            common.port = port
                .parse()
                .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid PORT: {}", e)))?;
        }

        let environment: MpesaEnvironment = get_env("MPESA_ENV", Some("sandbox"), false)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let mut mpesa = MpesaConfig::new(environment);
        if let Some(base_url) = optional_env("MPESA_API_BASE_URL") {
            mpesa.api_base_url = base_url;
        }
        mpesa.consumer_key = optional_env("MPESA_CONSUMER_KEY");
        mpesa.consumer_secret = optional_env("MPESA_CONSUMER_SECRET").map(Secret::new);
        mpesa.shortcode = optional_env("MPESA_SHORTCODE");
        mpesa.passkey = optional_env("MPESA_PASSKEY").map(Secret::new);
        mpesa.callback_base_url = optional_env("MPESA_CALLBACK_BASE_URL");

        Ok(BookingConfig {
            common,
            storage: StorageConfig {
                data_file: get_env("BOOKINGS_DATA_FILE", Some("bookings.json"), is_prod)?.into(),
                upload_dir: get_env("BOOKINGS_UPLOAD_DIR", Some("uploads"), is_prod)?.into(),
            },
            mpesa,
            service_name: "booking-service".to_string(),
        })
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}
