use std::{env, path::PathBuf};

use anyhow::{Context, Result, bail};

const DEFAULT_DATABASE_URL: &str = "sqlite://users.db";
const DEFAULT_UPLOAD_DIR: &str = "static/uploads";
const DEFAULT_MODEL_PATH: &str = "models/skin_efficientnet_b0.onnx";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SMTP_PORT: u16 = 587;

/// Minimum secret length accepted for cookie signing and token HMACs.
const MIN_SECRET_LEN: usize = 32;

/// Runtime settings read from the process environment (and `.env` via dotenvy).
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub secret_key: String,
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub model_path: PathBuf,
    pub public_base_url: String,
    pub port: u16,
    pub smtp: Option<SmtpSettings>,
}

#[derive(Clone, Debug)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let secret_key = env::var("SECRET_KEY").context("SECRET_KEY env var is missing")?;
        if secret_key.len() < MIN_SECRET_LEN {
            bail!("SECRET_KEY must be at least {MIN_SECRET_LEN} bytes long");
        }

        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        Ok(Self {
            secret_key,
            database_url: env_or("DATABASE_URL", DEFAULT_DATABASE_URL),
            upload_dir: PathBuf::from(env_or("UPLOAD_DIR", DEFAULT_UPLOAD_DIR)),
            model_path: PathBuf::from(env_or("MODEL_PATH", DEFAULT_MODEL_PATH)),
            public_base_url: env_or("PUBLIC_BASE_URL", DEFAULT_PUBLIC_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            port,
            smtp: SmtpSettings::from_env(),
        })
    }
}

impl SmtpSettings {
    /// Returns `None` when SMTP is not configured; mail is then logged instead of sent.
    fn from_env() -> Option<Self> {
        let host = env::var("SMTP_HOST").ok()?;
        let username = env::var("SMTP_USERNAME").ok()?;
        let password = env::var("SMTP_PASSWORD").ok()?;
        let port = env::var("SMTP_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_SMTP_PORT);
        let from_address = env::var("SMTP_FROM").unwrap_or_else(|_| username.clone());

        Some(Self {
            host,
            port,
            username,
            password,
            from_address,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
