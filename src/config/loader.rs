//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::DeltaConfig;
use crate::domain::errors::DeltaError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Prefix of every environment override
pub const ENV_PREFIX: &str = "CNPJ_DELTA";

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into DeltaConfig
/// 4. Applies environment variable overrides (CNPJ_DELTA_* prefix)
/// 5. Validates the configuration
///
/// # Examples
///
/// ```no_run
/// use cnpj_delta::config::loader::load_config;
///
/// let config = load_config("cnpj-delta.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<DeltaConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(DeltaError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        DeltaError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses configuration text, applying substitution, overrides and validation
pub fn parse_config(contents: &str) -> Result<DeltaConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: DeltaConfig = toml::from_str(&contents)
        .map_err(|e| DeltaError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        DeltaError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static pattern"))
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// # Errors
///
/// Returns an error if a referenced environment variable is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = placeholder_regex();
    let mut result = String::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        // Comments are copied verbatim
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{var_name}}}");
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(DeltaError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}_{key}")).ok()
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        DeltaError::Configuration(format!("Invalid value '{value}' for {ENV_PREFIX}_{key}"))
    })
}

/// Applies environment variable overrides using the CNPJ_DELTA_* prefix
///
/// Environment variables follow the pattern: CNPJ_DELTA_<SECTION>_<KEY>
/// For example: CNPJ_DELTA_EXPORT_WORKERS, CNPJ_DELTA_PATHS_CACHE_DIR
fn apply_env_overrides(config: &mut DeltaConfig) -> Result<()> {
    // Application overrides
    if let Some(val) = env_var("APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Some(val) = env_var("APPLICATION_DRY_RUN") {
        config.application.dry_run = parse_override("APPLICATION_DRY_RUN", &val)?;
    }

    // Path overrides
    if let Some(val) = env_var("PATHS_RAW_DIR") {
        config.paths.raw_dir = PathBuf::from(val);
    }
    if let Some(val) = env_var("PATHS_STORE_DIR") {
        config.paths.store_dir = PathBuf::from(val);
    }
    if let Some(val) = env_var("PATHS_CACHE_DIR") {
        config.paths.cache_dir = PathBuf::from(val);
    }
    if let Some(val) = env_var("PATHS_OUTPUT_DIR") {
        config.paths.output_dir = PathBuf::from(val);
    }
    if let Some(val) = env_var("PATHS_ARCHIVE_DIR") {
        config.paths.archive_dir = PathBuf::from(val);
    }

    // Ingest overrides
    if let Some(val) = env_var("INGEST_ENCODING") {
        config.ingest.encoding = val;
    }
    if let Some(val) = env_var("INGEST_PARTITION_PREFIX_LEN") {
        config.ingest.partition_prefix_len = parse_override("INGEST_PARTITION_PREFIX_LEN", &val)?;
    }
    if let Some(val) = env_var("INGEST_MAX_SKIP_RATE") {
        config.ingest.max_skip_rate = parse_override("INGEST_MAX_SKIP_RATE", &val)?;
    }

    // Export overrides
    if let Some(val) = env_var("EXPORT_PERIOD") {
        config.export.period = Some(val);
    }
    if let Some(val) = env_var("EXPORT_SHARD_SIZE") {
        config.export.shard_size = parse_override("EXPORT_SHARD_SIZE", &val)?;
    }
    if let Some(val) = env_var("EXPORT_WORKERS") {
        config.export.workers = parse_override("EXPORT_WORKERS", &val)?;
    }
    if let Some(val) = env_var("EXPORT_MAX_RETRIES") {
        config.export.max_retries = parse_override("EXPORT_MAX_RETRIES", &val)?;
    }
    if let Some(val) = env_var("EXPORT_DRY_RUN") {
        config.export.dry_run = parse_override("EXPORT_DRY_RUN", &val)?;
    }

    // Verification overrides
    if let Some(val) = env_var("VERIFICATION_ENABLE_VERIFICATION") {
        config.verification.enable_verification =
            parse_override("VERIFICATION_ENABLE_VERIFICATION", &val)?;
    }
    if let Some(val) = env_var("VERIFICATION_SAMPLE_SIZE") {
        config.verification.sample_size = parse_override("VERIFICATION_SAMPLE_SIZE", &val)?;
    }

    // Logging overrides
    if let Some(val) = env_var("LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = parse_override("LOGGING_LOCAL_ENABLED", &val)?;
    }
    if let Some(val) = env_var("LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}
