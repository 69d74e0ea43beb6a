use std::{path::PathBuf, str::FromStr, sync::Arc};

use anyhow::{Context, Result};
use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use sha2::{Digest, Sha512};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tracing::info;

use crate::{
    classifier::LesionClassifier,
    config::AppConfig,
    mail::Mailer,
    web::tokens::{EMAIL_CONFIRM_SALT, TokenSigner},
};

#[derive(Clone)]
pub struct AppState {
    pool: SqlitePool,
    cookie_key: Key,
    tokens: TokenSigner,
    mailer: Mailer,
    classifier: LesionClassifier,
    upload_root: Arc<PathBuf>,
    public_base_url: Arc<str>,
}

impl AppState {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str(&config.database_url)
            .with_context(|| format!("invalid DATABASE_URL {}", config.database_url))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await
            .context("failed to open SQLite database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run database migrations")?;
        info!(database = %config.database_url, "database ready");

        let mailer =
            Mailer::from_settings(config.smtp.as_ref()).context("failed to initialize mailer")?;

        Ok(Self::from_parts(config, pool, mailer))
    }

    pub fn from_parts(config: &AppConfig, pool: SqlitePool, mailer: Mailer) -> Self {
        Self {
            pool,
            cookie_key: derive_cookie_key(&config.secret_key),
            tokens: TokenSigner::new(&config.secret_key, EMAIL_CONFIRM_SALT),
            mailer,
            classifier: LesionClassifier::new(config.model_path.clone()),
            upload_root: Arc::new(config.upload_dir.clone()),
            public_base_url: Arc::from(config.public_base_url.as_str()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn tokens(&self) -> &TokenSigner {
        &self.tokens
    }

    pub fn mailer(&self) -> &Mailer {
        &self.mailer
    }

    pub fn classifier(&self) -> &LesionClassifier {
        &self.classifier
    }

    /// Per-account upload directory; accounts never share stored files.
    pub fn user_upload_dir(&self, user_id: i64) -> PathBuf {
        self.upload_root.join(user_id.to_string())
    }

    pub fn confirmation_url(&self, token: &str) -> String {
        format!("{}/confirm/{}", self.public_base_url, token)
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

/// Cookie signing keys need 64 bytes; stretch the configured secret with SHA-512.
fn derive_cookie_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}
