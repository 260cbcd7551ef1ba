//! # Application State
//!
//! Configuration read once from the environment, and the shared state
//! handed to every handler: the lifecycle service plus the optional
//! database pool used by the readiness probe.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use safetrade_core::LifecycleError;
use safetrade_lifecycle::notify::DEFAULT_QUEUE_CAPACITY;
use safetrade_lifecycle::{
    LifecycleSettings, LoggingNotifier, NotificationDispatcher, Repositories, SafeTradeService,
};
use safetrade_state::{validate_amounts, FeeSchedule};
use sqlx::PgPool;
use thiserror::Error;

use crate::db;

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("business settings rejected: {0}")]
    Settings(#[from] LifecycleError),
}

/// Runtime configuration. Custom `Debug` redacts secrets.
#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    /// Bearer secret. `None` disables authentication.
    pub auth_token: Option<String>,
    /// `None` keeps all state in memory.
    pub database_url: Option<String>,
    pub log_format: LogFormat,
    pub notify_queue: usize,
    pub lifecycle: LifecycleSettings,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("log_format", &self.log_format)
            .field("notify_queue", &self.notify_queue)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            database_url: None,
            log_format: LogFormat::Text,
            notify_queue: DEFAULT_QUEUE_CAPACITY,
            lifecycle: LifecycleSettings::default(),
        }
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(raw: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let lookup = |var: &str| raw(var).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        let fee_defaults = FeeSchedule::default();

        let log_format = match lookup("SAFETRADE_LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "SAFETRADE_LOG_FORMAT",
                    value: other.to_string(),
                    reason: "expected 'text' or 'json'".to_string(),
                })
            }
        };

        let fees = FeeSchedule {
            buyer_fee_percentage: parse_or(
                &lookup,
                "SAFETRADE_BUYER_FEE_PERCENT",
                fee_defaults.buyer_fee_percentage,
            )?,
            dealer_commission_percentage: parse_or(
                &lookup,
                "SAFETRADE_DEALER_COMMISSION_PERCENT",
                fee_defaults.dealer_commission_percentage,
            )?,
            min_amount: parse_or(&lookup, "SAFETRADE_MIN_AMOUNT", fee_defaults.min_amount)?,
            max_amount: parse_or(&lookup, "SAFETRADE_MAX_AMOUNT", fee_defaults.max_amount)?,
        };
        fees.validate()?;

        let default_vat_percentage: Decimal = parse_or(
            &lookup,
            "SAFETRADE_VAT_PERCENT",
            defaults.lifecycle.default_vat_percentage,
        )?;
        validate_amounts(Decimal::ONE, default_vat_percentage)?;

        Ok(Self {
            port: parse_or(&lookup, "PORT", defaults.port)?,
            auth_token: lookup("AUTH_TOKEN"),
            database_url: lookup("DATABASE_URL"),
            log_format,
            notify_queue: parse_or(&lookup, "SAFETRADE_NOTIFY_QUEUE", defaults.notify_queue)?,
            lifecycle: LifecycleSettings {
                fees,
                default_vat_percentage,
                escrow_iban: lookup("SAFETRADE_ESCROW_IBAN"),
            },
        })
    }
}

// ─── State ───────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("database initialization failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("lifecycle service rejected its settings: {0}")]
    Lifecycle(#[from] LifecycleError),
}

#[derive(Clone)]
pub struct AppState {
    pub service: SafeTradeService,
    pub config: Arc<AppConfig>,
    pub db_pool: Option<PgPool>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("database", &self.db_pool.is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn with_service(
        config: AppConfig,
        service: SafeTradeService,
        db_pool: Option<PgPool>,
    ) -> Self {
        Self {
            service,
            config: Arc::new(config),
            db_pool,
        }
    }

    /// In-memory state without notification delivery.
    pub fn in_memory(config: AppConfig) -> Result<Self, LifecycleError> {
        let service = SafeTradeService::new(
            Repositories::in_memory(),
            NotificationDispatcher::disabled(),
            config.lifecycle.clone(),
        )?;
        Ok(Self::with_service(config, service, None))
    }

    /// Connect storage, start the notifier and resume invoice numbering.
    ///
    /// Must run inside a tokio runtime.
    pub async fn bootstrap(config: AppConfig) -> Result<Self, StartupError> {
        let (repos, pool) = match &config.database_url {
            Some(url) => {
                let pool = db::init_pool(url).await?;
                (db::repositories(&pool), Some(pool))
            }
            None => {
                tracing::warn!(
                    "DATABASE_URL not set; running in-memory only. State will not survive restarts."
                );
                (Repositories::in_memory(), None)
            }
        };
        let dispatcher =
            NotificationDispatcher::spawn(Arc::new(LoggingNotifier), config.notify_queue);
        let service = SafeTradeService::new(repos, dispatcher, config.lifecycle.clone())?;
        service.prime_invoice_numbers().await?;
        Ok(Self::with_service(config, service, pool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = AppConfig::from_lookup(lookup(&[
            ("PORT", "9090"),
            ("AUTH_TOKEN", "s3cret"),
            ("SAFETRADE_LOG_FORMAT", "json"),
            ("SAFETRADE_VAT_PERCENT", "7"),
            ("SAFETRADE_BUYER_FEE_PERCENT", "1.5"),
            ("SAFETRADE_ESCROW_IBAN", "DE89370400440532013000"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.lifecycle.default_vat_percentage, Decimal::new(7, 0));
        assert_eq!(config.lifecycle.fees.buyer_fee_percentage, Decimal::new(15, 1));
        assert!(config.lifecycle.escrow_iban.is_some());
    }

    #[test]
    fn test_malformed_values_fail() {
        let err = AppConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
        assert!(AppConfig::from_lookup(lookup(&[("SAFETRADE_VAT_PERCENT", "140")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("SAFETRADE_LOG_FORMAT", "xml")])).is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = AppConfig {
            auth_token: Some("s3cret".into()),
            database_url: Some("postgres://u:pw@db/safetrade".into()),
            ..AppConfig::default()
        };
        let printed = format!("{config:?}");
        assert!(!printed.contains("s3cret"));
        assert!(!printed.contains("pw@"));
    }
}
