//! Credential lookup for API keys and the messaging session token.
//!
//! A credential can be written inline in the config, kept in a file (the
//! container secrets pattern), or read from an environment variable. The
//! first source that is set wins, in that order.

use secrecy::SecretString;
use std::fs;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No credential source configured (inline value, file, or env var)")]
    NoSourceProvided,

    #[error("Failed to read credential file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Credential file '{path}' is empty")]
    EmptyFile { path: String },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves one credential. Empty strings count as "not configured", so a
/// config template with `"api_key": ""` falls through to the file or env var.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = non_empty(direct) {
        return Ok(SecretString::from(value.to_string()));
    }

    if let Some(path) = non_empty(file_path) {
        let expanded = expand_home(path);
        let content = fs::read_to_string(&expanded).map_err(|e| SecretError::FileReadError {
            path: expanded.clone(),
            source: e,
        })?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(SecretError::EmptyFile { path: expanded });
        }
        return Ok(SecretString::from(trimmed.to_string()));
    }

    if let Some(name) = non_empty(env_var) {
        return match std::env::var(name) {
            Ok(value) => Ok(SecretString::from(value.trim().to_string())),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: name.to_string(),
            }),
        };
    }

    Err(SecretError::NoSourceProvided)
}

/// Like [`resolve_secret`], but an entirely unconfigured credential is `None`.
pub fn resolve_secret_optional(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<Option<SecretString>> {
    match resolve_secret(direct, file_path, env_var) {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::NoSourceProvided) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Whether any source is configured, without reading it. Used by config
/// validation, which must not touch the filesystem or environment.
pub fn has_secret_source(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> bool {
    non_empty(direct).is_some() || non_empty(file_path).is_some() || non_empty(env_var).is_some()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

/// `~` and `~/...` only; `~user` is left as is.
pub(crate) fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            let home = home.to_string_lossy();
            return if path == "~" {
                home.into_owned()
            } else {
                format!("{}{}", home, &path[1..])
            };
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;

    #[test]
    fn test_inline_value_wins() {
        let secret = resolve_secret(Some("inline"), Some("/nonexistent"), Some("NOPE")).unwrap();
        assert_eq!(secret.expose_secret(), "inline");
    }

    #[test]
    fn test_empty_inline_falls_through_to_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  from-file  ").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let secret = resolve_secret(Some(""), Some(&path), None).unwrap();
        assert_eq!(secret.expose_secret(), "from-file");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = resolve_secret(None, Some("/definitely/not/here"), Some("ALSO_UNUSED")).unwrap_err();
        assert!(matches!(err, SecretError::FileReadError { .. }));
    }

    #[test]
    fn test_empty_file_is_an_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_string_lossy().to_string();
        let err = resolve_secret(None, Some(&path), None).unwrap_err();
        assert!(matches!(err, SecretError::EmptyFile { .. }));
    }

    #[test]
    fn test_env_var() {
        std::env::set_var("LISTING_SCOUT_TEST_SECRET", "env-value\n");
        let secret = resolve_secret(None, None, Some("LISTING_SCOUT_TEST_SECRET")).unwrap();
        assert_eq!(secret.expose_secret(), "env-value");

        let err = resolve_secret(None, None, Some("LISTING_SCOUT_TEST_SECRET_UNSET")).unwrap_err();
        assert!(matches!(err, SecretError::EnvVarNotSet { .. }));
    }

    #[test]
    fn test_optional_and_presence() {
        assert!(resolve_secret_optional(None, None, None).unwrap().is_none());
        assert!(!has_secret_source(Some(""), None, Some("")));
        assert!(has_secret_source(None, None, Some("KEY")));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), "/abs/path");
        assert_eq!(expand_home("~other/x"), "~other/x");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/keys"), format!("{}/keys", home.to_string_lossy()));
        }
    }
}
