//! Apply the record schema to the configured database.

use std::process::ExitCode;

use sawit_infra::{AppConfig, PostgresStore};

fn main() -> ExitCode {
    sawit_observability::init();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = config.service_settings() {
        tracing::error!(error = %err, "invalid business settings");
        return ExitCode::FAILURE;
    }

    let store = match PostgresStore::connect(&config.database) {
        Ok(store) => store,
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to database");
            return ExitCode::FAILURE;
        }
    };

    match store.migrate() {
        Ok(()) => {
            tracing::info!(environment = %config.environment, "schema is up to date");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, "migration failed");
            ExitCode::FAILURE
        }
    }
}
