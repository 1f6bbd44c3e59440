//! Migrate command implementation
//!
//! Creates the `resources_inc` table and its indexes in the PostgreSQL
//! resource store. Running it again is harmless.

use crate::adapters::postgresql::PostgreSQLClient;
use crate::config::{load_config, DestinationKind};
use clap::Args;

/// Arguments for the migrate command
#[derive(Args, Debug)]
pub struct MigrateArgs {}

impl MigrateArgs {
    /// Execute the migrate command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Running resource store migration");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(1);
            }
        };

        if config.destination.kind != DestinationKind::Psql {
            tracing::warn!(
                dest = %config.destination.kind,
                "Migrating the PostgreSQL store although it is not the active destination"
            );
        }

        let Some(store) = config.destination.postgresql else {
            println!("❌ No [destination.postgresql] section configured");
            return Ok(1);
        };

        println!("🗄️  Preparing table {}", store.table);

        let client = match PostgreSQLClient::new(store.connection.clone()).await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to connect to resource store");
                println!("❌ Failed to connect to the resource store");
                println!("   Error: {e}");
                return Ok(1);
            }
        };

        match client.ensure_schema(&store.table).await {
            Ok(()) => {
                println!(
                    "✅ Table {} is ready on {}",
                    store.table,
                    client.connection_string_safe()
                );
                Ok(0)
            }
            Err(e) => {
                tracing::error!(error = %e, table = %store.table, "Migration failed");
                println!("❌ Migration failed");
                println!("   Error: {e}");
                Ok(1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_missing_config_fails() {
        let code = MigrateArgs {}
            .execute("/nonexistent/fhir-inc-sync.toml")
            .await
            .unwrap();
        assert_eq!(code, 1);
    }

    #[tokio::test]
    async fn test_hapi_only_config_fails() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[source]
connection_string = "postgresql://etl:pw@localhost:5432/dwh"

[destination]
kind = "hapi"

[destination.hapi]
base_url = "http://localhost:8080/fhir"

[pseudonymization]
url = "http://localhost:8081/gpas/TTPFHIRGatewayService"
patient_domain = "patients"
encounter_domain = "encounters"
"#
        )
        .unwrap();

        let code = MigrateArgs {}
            .execute(file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(code, 1);
    }
}
