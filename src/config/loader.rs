//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{DestinationKind, SyncConfig};
use super::secret::secret_string;
use crate::domain::errors::SyncError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Prefix of all environment overrides
pub const ENV_PREFIX: &str = "FHIR_SYNC_";

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (`${VAR}` syntax)
/// 3. Parses the TOML into [`SyncConfig`]
/// 4. Applies environment variable overrides (`FHIR_SYNC_*` prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns [`SyncError::Configuration`] if the file is missing or unreadable,
/// a referenced variable is unset, parsing fails or validation fails.
///
/// # Examples
///
/// ```no_run
/// use fhir_inc_sync::config::loader::load_config;
///
/// let config = load_config("fhir-inc-sync.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<SyncConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(SyncError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        SyncError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let mut config: SyncConfig = toml::from_str(&contents)
        .map_err(|e| SyncError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        SyncError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format `${VAR_NAME}`
///
/// Comment lines are copied untouched. Every unset variable is reported in a
/// single error.
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| SyncError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut missing_vars: Vec<String> = Vec::new();

    let lines: Vec<String> = input
        .lines()
        .map(|line| {
            if line.trim_start().starts_with('#') {
                return line.to_string();
            }

            let mut processed_line = line.to_string();
            for cap in re.captures_iter(line) {
                let var_name = &cap[1];
                match std::env::var(var_name) {
                    Ok(value) => {
                        processed_line = processed_line.replace(&cap[0], &value);
                    }
                    Err(_) => {
                        if !missing_vars.iter().any(|v| v == var_name) {
                            missing_vars.push(var_name.to_string());
                        }
                    }
                }
            }
            processed_line
        })
        .collect();

    if !missing_vars.is_empty() {
        return Err(SyncError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    let mut result = lines.join("\n");
    if input.ends_with('\n') {
        result.push('\n');
    }
    Ok(result)
}

fn env(key: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{key}")).ok()
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env(key) {
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            SyncError::Configuration(format!(
                "Invalid value '{raw}' for environment variable {ENV_PREFIX}{key}"
            ))
        }),
        None => Ok(None),
    }
}

/// Applies environment variable overrides using the `FHIR_SYNC_` prefix
///
/// Environment variables follow the pattern `FHIR_SYNC_<SECTION>_<KEY>`,
/// for example `FHIR_SYNC_DESTINATION_KIND` or `FHIR_SYNC_SOURCE_CONNECTION_STRING`.
/// Overrides for the destination sub-sections only apply when that section
/// is present in the file.
fn apply_env_overrides(config: &mut SyncConfig) -> Result<()> {
    // Application overrides
    if let Some(val) = env("APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Some(val) = env_parsed("APPLICATION_DRY_RUN")? {
        config.application.dry_run = val;
    }
    if let Some(val) = env_parsed("APPLICATION_CHUNK_SIZE")? {
        config.application.chunk_size = val;
    }
    if let Some(val) = env_parsed("APPLICATION_LAB_CHUNK_SIZE")? {
        config.application.lab_chunk_size = val;
    }
    if let Some(val) = env_parsed("APPLICATION_RESOLVER_CONCURRENCY")? {
        config.application.resolver_concurrency = val;
    }
    if let Some(val) = env_parsed("APPLICATION_INCLUDE_LAB")? {
        config.application.include_lab = val;
    }
    if let Some(val) = env_parsed("APPLICATION_INCLUDE_LUNG_FUNCTION")? {
        config.application.include_lung_function = val;
    }

    // Source overrides
    if let Some(val) = env("SOURCE_CONNECTION_STRING") {
        config.source.connection_string = secret_string(val);
    }
    if let Some(val) = env_parsed("SOURCE_MAX_CONNECTIONS")? {
        config.source.max_connections = val;
    }

    // Destination overrides
    if let Some(val) = env("DESTINATION_KIND") {
        config.destination.kind = val
            .parse::<DestinationKind>()
            .map_err(SyncError::Configuration)?;
    }
    if let Some(ref mut store) = config.destination.postgresql {
        if let Some(val) = env("DESTINATION_POSTGRESQL_CONNECTION_STRING") {
            store.connection.connection_string = secret_string(val);
        }
        if let Some(val) = env("DESTINATION_POSTGRESQL_TABLE") {
            store.table = val;
        }
    }
    if let Some(ref mut hapi) = config.destination.hapi {
        if let Some(val) = env("DESTINATION_HAPI_BASE_URL") {
            hapi.base_url = val;
        }
        if let Some(val) = env("DESTINATION_HAPI_USERNAME") {
            hapi.username = Some(val);
        }
        if let Some(val) = env("DESTINATION_HAPI_PASSWORD") {
            hapi.password = Some(secret_string(val));
        }
    }

    // Pseudonymization overrides
    if let Some(val) = env("PSEUDONYMIZATION_URL") {
        config.pseudonymization.url = val;
    }
    if let Some(val) = env("PSEUDONYMIZATION_PATIENT_DOMAIN") {
        config.pseudonymization.patient_domain = val;
    }
    if let Some(val) = env("PSEUDONYMIZATION_ENCOUNTER_DOMAIN") {
        config.pseudonymization.encounter_domain = val;
    }

    // Terminology overrides
    if let Some(val) = env("TERMINOLOGY_LOINC_URL") {
        config.terminology.loinc_url = Some(val);
    }

    // Lookup overrides
    if let Some(val) = env("LOOKUPS_PATH") {
        config.lookups.path = Some(val);
    }

    // Logging overrides
    if let Some(val) = env_parsed("LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = val;
    }
    if let Some(val) = env("LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
    if let Some(val) = env("LOGGING_LOCAL_ROTATION") {
        config.logging.local_rotation = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Tests in this module mutate the process environment
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const MINIMAL: &str = r#"
[source]
connection_string = "postgresql://etl:pw@dwh:5432/dwh"

[destination]
kind = "psql"

[destination.postgresql]
connection_string = "postgresql://fhir:pw@store:5432/fhir"

[pseudonymization]
url = "http://gpas:8080/gpas/gpasService"
"#;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_substitute_env_vars() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::set_var("FIS_TEST_VAR", "test_value");
        let input = "password = \"${FIS_TEST_VAR}\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "password = \"test_value\"");
        std::env::remove_var("FIS_TEST_VAR");
    }

    #[test]
    fn test_substitute_env_vars_keeps_trailing_newline() {
        let result = substitute_env_vars("a = 1\nb = 2\n").unwrap();
        assert_eq!(result, "a = 1\nb = 2\n");
    }

    #[test]
    fn test_substitute_env_vars_missing_reports_all() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::remove_var("FIS_MISSING_A");
        std::env::remove_var("FIS_MISSING_B");
        let input = "a = \"${FIS_MISSING_A}\"\nb = \"${FIS_MISSING_B}\"";
        let err = substitute_env_vars(input).unwrap_err().to_string();
        assert!(err.contains("FIS_MISSING_A"));
        assert!(err.contains("FIS_MISSING_B"));
    }

    #[test]
    fn test_substitute_env_vars_skips_comments() {
        let input = "# password = \"${FIS_NEVER_SET}\"\nx = 1";
        assert_eq!(substitute_env_vars(input).unwrap(), input);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent.toml");
        assert!(matches!(result, Err(SyncError::Configuration(_))));
    }

    #[test]
    fn test_load_config_applies_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let file = write_config(MINIMAL);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.application.chunk_size, 100);
        assert_eq!(config.application.lab_chunk_size, 1000);
        assert_eq!(config.application.resolver_concurrency, 1);
        assert!(config.application.include_lab);
        assert!(!config.application.include_lung_function);
        assert_eq!(config.destination.kind, DestinationKind::Psql);
        assert_eq!(
            config.destination.postgresql.as_ref().unwrap().table,
            "resources_inc"
        );
        assert_eq!(config.pseudonymization.patient_domain, "patient_id");
        assert_eq!(config.pseudonymization.encounter_domain, "encounter_id");
    }

    #[test]
    fn test_env_override_switches_destination() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let file = write_config(MINIMAL);
        std::env::set_var("FHIR_SYNC_DESTINATION_KIND", "hapi");
        let result = load_config(file.path());
        std::env::remove_var("FHIR_SYNC_DESTINATION_KIND");

        // hapi is now active but has no section
        let err = result.unwrap_err().to_string();
        assert!(err.contains("destination.hapi"));
    }

    #[test]
    fn test_env_override_rejects_bad_number() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let file = write_config(MINIMAL);
        std::env::set_var("FHIR_SYNC_APPLICATION_CHUNK_SIZE", "lots");
        let result = load_config(file.path());
        std::env::remove_var("FHIR_SYNC_APPLICATION_CHUNK_SIZE");
        assert!(result.is_err());
    }
}
