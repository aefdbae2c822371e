use std::collections::HashSet;
use std::path::Path;

use secrecy::SecretString;

use crate::config::schema::{Config, ExtractionConfig};
use crate::error::ConfigError;
use crate::secrets::{expand_home, resolve_secret_optional};

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

fn require_positive(name: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(invalid(format!("{} must be at least 1", name)));
    }
    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    if config.messaging.base_url.trim().is_empty() {
        return Err(invalid("messaging.base_url must not be empty"));
    }
    require_positive(
        "messaging.request_timeout_secs",
        config.messaging.request_timeout_secs,
    )?;

    let extraction = &config.extraction;
    let has_key_source = extraction.api_keys.iter().any(|k| !k.trim().is_empty())
        || extraction.api_keys_file.as_deref().is_some_and(|s| !s.is_empty())
        || extraction.api_keys_env_var.as_deref().is_some_and(|s| !s.is_empty());
    if !has_key_source {
        return Err(invalid(
            "extraction needs at least one of api_keys, api_keys_file or api_keys_env_var",
        ));
    }
    require_positive("extraction.max_requests", extraction.max_requests as u64)?;
    require_positive("extraction.window_secs", extraction.window_secs)?;
    require_positive("extraction.timeout_secs", extraction.timeout_secs)?;

    require_positive("walker.target_count", config.walker.target_count as u64)?;
    require_positive("walker.page_size", config.walker.page_size as u64)?;
    require_positive("mentions.recent_limit", config.mentions.recent_limit as u64)?;
    require_positive("similarity.batch_size", config.similarity.batch_size as u64)?;
    require_positive("similarity.workers", config.similarity.workers as u64)?;
    require_positive(
        "scheduler.scrape_interval_secs",
        config.scheduler.scrape_interval_secs,
    )?;
    if let Some(secs) = config.scheduler.mention_interval_secs {
        require_positive("scheduler.mention_interval_secs", secs)?;
    }

    let mut ids = HashSet::new();
    for channel in &config.channels {
        if !ids.insert(channel.id) {
            return Err(ConfigError::DuplicateChannel(channel.id));
        }
    }

    Ok(())
}

/// Collects the generation API keys from every configured source, in order:
/// inline list, key file (one per line, `#` comments allowed), then the
/// comma separated env var. Duplicates are dropped.
pub fn resolve_api_keys(extraction: &ExtractionConfig) -> Result<Vec<SecretString>, ConfigError> {
    let mut raw: Vec<String> = extraction
        .api_keys
        .iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();

    if let Some(path) = extraction.api_keys_file.as_deref().filter(|p| !p.is_empty()) {
        let expanded = expand_home(path);
        let content = std::fs::read_to_string(&expanded).map_err(|e| ConfigError::ReadFile {
            path: expanded.into(),
            source: e,
        })?;
        raw.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string),
        );
    }

    if let Some(joined) = resolve_secret_optional(None, None, extraction.api_keys_env_var.as_deref())? {
        use secrecy::ExposeSecret;
        raw.extend(
            joined
                .expose_secret()
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string),
        );
    }

    let mut seen = HashSet::new();
    raw.retain(|k| seen.insert(k.clone()));

    if raw.is_empty() {
        return Err(invalid("no generation API keys could be resolved"));
    }

    Ok(raw.into_iter().map(SecretString::from).collect())
}
