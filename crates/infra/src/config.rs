//! Configuration loading.
//!
//! Layers, lowest precedence first:
//! 1. Defaults in code
//! 2. `config/<environment>.toml` (optional)
//! 3. Environment variables with the `SAWIT` prefix and `__` as the section
//!    separator, e.g. `SAWIT__DATABASE__URL` or `SAWIT__GRADING__PENALTY_STEPS`
//!
//! A `.env` file in the working directory is read first when present.

use chrono::FixedOffset;
use config::{ConfigError, Environment, File};
use serde::Deserialize;

use sawit_core::{DomainError, DomainResult};
use sawit_settlement::{DocumentPrefixes, GradePenaltyTable};

use crate::fulfillment::ServiceSettings;

/// Main application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Current environment (development, production, ...).
    pub environment: String,

    pub database: DatabaseConfig,

    pub numbering: NumberingConfig,

    pub grading: GradingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    pub url: String,

    /// Maximum number of connections in the pool.
    pub max_connections: u32,

    /// Minimum number of connections in the pool.
    pub min_connections: u32,

    /// Worker threads of the runtime that drives the pool.
    pub worker_threads: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/sawit".to_string(),
            max_connections: 10,
            min_connections: 2,
            worker_threads: 2,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NumberingConfig {
    /// Prefix of purchase order numbers (`PO-YYYYMMDD-NNNN`).
    pub order_prefix: String,

    /// Prefixes of the settlement document numbers.
    pub documents: DocumentPrefixes,

    /// Offset of the business day from UTC, in whole hours. Counters reset
    /// and document dates roll over at local midnight.
    pub utc_offset_hours: i32,
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            order_prefix: "PO".to_string(),
            documents: DocumentPrefixes::default(),
            utc_offset_hours: 7,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GradingConfig {
    /// Penalty percent per grade tier below the contracted grade; the first
    /// entry is for a matching grade and must be 0.
    pub penalty_steps: Vec<u32>,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            penalty_steps: GradePenaltyTable::default().steps().to_vec(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment =
            std::env::var("SAWIT_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            .set_default("environment", environment.clone())?
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            .add_source(
                Environment::with_prefix("SAWIT")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("grading.penalty_steps")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate the business settings and turn them into service settings.
    pub fn service_settings(&self) -> DomainResult<ServiceSettings> {
        let penalty_table = GradePenaltyTable::new(self.grading.penalty_steps.clone())?;

        let utc_offset = FixedOffset::east_opt(self.numbering.utc_offset_hours * 3600)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "utc offset of {} hours is out of range",
                    self.numbering.utc_offset_hours
                ))
            })?;

        if self.numbering.order_prefix.trim().is_empty() {
            return Err(DomainError::validation("order prefix cannot be empty"));
        }

        Ok(ServiceSettings {
            penalty_table,
            prefixes: self.numbering.documents.clone(),
            order_prefix: self.numbering.order_prefix.clone(),
            utc_offset,
        })
    }
}
