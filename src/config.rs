use anyhow::{anyhow, Context, Result};
use std::env;

use crate::payments::providers::ChapaConfig;
use crate::payments::reconciler::ReconcilerConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub chapa: ChapaConfig,
    pub auth: AuthConfig,
    pub reconciler: ReconcilerConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{key} must be a valid value")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let server = ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", 8080)?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        };

        let database = DatabaseConfig {
            url: env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 20)?,
        };

        let chapa = ChapaConfig {
            secret_key: env::var("CHAPA_SECRET_KEY").context("CHAPA_SECRET_KEY not set")?,
            base_url: env::var("CHAPA_BASE_URL")
                .unwrap_or_else(|_| "https://api.chapa.co".to_string()),
            currency: env::var("CHAPA_CURRENCY").unwrap_or_else(|_| "ETB".to_string()),
            callback_url: env::var("CHAPA_CALLBACK_URL").context("CHAPA_CALLBACK_URL not set")?,
            return_url: env::var("CHAPA_RETURN_URL").context("CHAPA_RETURN_URL not set")?,
            webhook_secret: env::var("CHAPA_WEBHOOK_SECRET").ok(),
            timeout_secs: env_or("CHAPA_TIMEOUT_SECS", 10)?,
            max_retries: env_or("CHAPA_MAX_RETRIES", 2)?,
        };

        let auth = AuthConfig {
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET not set")?,
        };

        let reconciler = ReconcilerConfig {
            enabled: env_or("RECONCILER_ENABLED", true)?,
            interval_secs: env_or("RECONCILER_INTERVAL_SECS", 300)?,
            stale_after_secs: env_or("RECONCILER_STALE_AFTER_SECS", 900)?,
            batch_limit: env_or("RECONCILER_BATCH_LIMIT", 50)?,
        };

        let config = Config {
            server,
            database,
            chapa,
            auth,
            reconciler,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        if self.database.url.trim().is_empty() {
            return Err(anyhow!("DATABASE_URL cannot be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }

        if self.chapa.secret_key.trim().is_empty() {
            return Err(anyhow!("CHAPA_SECRET_KEY cannot be empty"));
        }
        if self.chapa.callback_url.trim().is_empty() || self.chapa.return_url.trim().is_empty() {
            return Err(anyhow!("CHAPA_CALLBACK_URL and CHAPA_RETURN_URL cannot be empty"));
        }
        if self.chapa.currency.trim().is_empty() {
            return Err(anyhow!("CHAPA_CURRENCY cannot be empty"));
        }
        if self.chapa.timeout_secs == 0 {
            return Err(anyhow!("CHAPA_TIMEOUT_SECS must be greater than 0"));
        }

        if self.auth.jwt_secret.trim().is_empty() {
            return Err(anyhow!("JWT_SECRET cannot be empty"));
        }

        if self.reconciler.interval_secs == 0 {
            return Err(anyhow!("RECONCILER_INTERVAL_SECS must be greater than 0"));
        }
        if self.reconciler.stale_after_secs < 0 {
            return Err(anyhow!("RECONCILER_STALE_AFTER_SECS cannot be negative"));
        }

        Ok(())
    }
}
