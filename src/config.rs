//! Credential and endpoint configuration
//!
//! Values come from a `config.json` file (explicit path, current directory, or
//! next to the executable) and are then overridden by non-empty environment
//! variables. Both secrets are required.

use crate::error::{Result, RouterError};
use crate::redact::mask_secret;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_API_URL: &str = "https://api.agentpmt.com";
pub const CONFIG_FILE_NAME: &str = "config.json";

pub const ENV_API_URL: &str = "AGENTPMT_API_URL";
pub const ENV_API_KEY: &str = "AGENTPMT_API_KEY";
pub const ENV_BUDGET_KEY: &str = "AGENTPMT_BUDGET_KEY";

/// Resolved runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_url: String,
    pub api_key: String,
    pub budget_key: String,
    /// The `config.json` that was read, if any
    pub source: Option<PathBuf>,
}

/// On-disk shape of `config.json`. Every key is optional so a file may carry
/// only the URL and leave the secrets to the environment.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(rename = "APIURL", default)]
    pub api_url: Option<String>,
    #[serde(rename = "APIKey", default)]
    pub api_key: Option<String>,
    #[serde(rename = "BudgetKey", default)]
    pub budget_key: Option<String>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RouterError::Config(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        serde_json::from_str(&contents).map_err(|e| {
            RouterError::Config(format!(
                "invalid JSON in config file {}: {}",
                path.display(),
                e
            ))
        })
    }
}

impl Config {
    /// Load configuration from the file system and process environment.
    ///
    /// With `explicit_path` the file must exist; otherwise a missing file is
    /// fine and only the environment is consulted.
    ///
    /// Runs before logging is initialised, so the chosen file is recorded in
    /// [`Config::source`] for the caller to report.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = match explicit_path {
            Some(path) => Some(path.to_path_buf()),
            None => find_config_file(),
        };
        let file = path.as_deref().map(FileConfig::from_path).transpose()?;

        let mut config = Self::resolve(file, |key| std::env::var(key).ok())?;
        config.source = path;
        Ok(config)
    }

    /// Merge a parsed file with environment lookups and validate the result.
    pub fn resolve<F>(file: Option<FileConfig>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = file.unwrap_or_default();
        let pick = |file_value: Option<String>, key: &str| -> Option<String> {
            env(key)
                .filter(|v| !v.is_empty())
                .or(file_value)
                .filter(|v| !v.is_empty())
        };

        let api_url = pick(file.api_url, ENV_API_URL).unwrap_or_else(|| DEFAULT_API_URL.into());
        let api_key = pick(file.api_key, ENV_API_KEY).ok_or_else(|| {
            RouterError::Config(format!(
                "APIKey is required (set in {} or {} env var)",
                CONFIG_FILE_NAME, ENV_API_KEY
            ))
        })?;
        let budget_key = pick(file.budget_key, ENV_BUDGET_KEY).ok_or_else(|| {
            RouterError::Config(format!(
                "BudgetKey is required (set in {} or {} env var)",
                CONFIG_FILE_NAME, ENV_BUDGET_KEY
            ))
        })?;

        Ok(Self {
            api_url: normalize_url(&api_url),
            api_key,
            budget_key,
            source: None,
        })
    }

    pub fn with_api_url(mut self, api_url: Option<&str>) -> Self {
        if let Some(url) = api_url.filter(|u| !u.is_empty()) {
            self.api_url = normalize_url(url);
        }
        self
    }

    /// Secret values that must never appear in diagnostics.
    pub fn secrets(&self) -> [&str; 2] {
        [self.api_key.as_str(), self.budget_key.as_str()]
    }

    /// Copy with both secrets masked, safe to log.
    pub fn redacted(&self) -> Self {
        Self {
            api_url: self.api_url.clone(),
            api_key: mask_secret(&self.api_key),
            budget_key: mask_secret(&self.budget_key),
            source: self.source.clone(),
        }
    }
}

/// Help text printed when credentials cannot be resolved.
pub fn credentials_help() -> String {
    format!(
        "Please ensure:\n  \
         1. {file} exists next to the binary (or in the current directory), OR\n  \
         2. Environment variables are set:\n     \
         {key}\n     \
         {budget}\n     \
         {url} (optional, defaults to {default})",
        file = CONFIG_FILE_NAME,
        key = ENV_API_KEY,
        budget = ENV_BUDGET_KEY,
        url = ENV_API_URL,
        default = DEFAULT_API_URL,
    )
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    let exe_dir = std::env::current_exe().ok()?.parent()?.to_path_buf();
    let beside_exe = exe_dir.join(CONFIG_FILE_NAME);
    beside_exe.is_file().then_some(beside_exe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_resolve_from_env() {
        let env = env_from(&[
            (ENV_API_URL, "https://test.api.com"),
            (ENV_API_KEY, "test-api-key"),
            (ENV_BUDGET_KEY, "test-budget-key"),
        ]);

        let cfg = Config::resolve(None, env).unwrap();
        assert_eq!(cfg.api_url, "https://test.api.com");
        assert_eq!(cfg.api_key, "test-api-key");
        assert_eq!(cfg.budget_key, "test-budget-key");
    }

    #[test]
    fn test_resolve_default_url() {
        let env = env_from(&[(ENV_API_KEY, "k"), (ENV_BUDGET_KEY, "b")]);
        let cfg = Config::resolve(None, env).unwrap();
        assert_eq!(cfg.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_env_overrides_file() {
        let file = FileConfig {
            api_url: Some("https://file.api.com/".into()),
            api_key: Some("file-api-key".into()),
            budget_key: Some("file-budget-key".into()),
        };
        let env = env_from(&[(ENV_API_KEY, "env-api-key"), (ENV_BUDGET_KEY, "")]);

        let cfg = Config::resolve(Some(file), env).unwrap();
        assert_eq!(cfg.api_url, "https://file.api.com");
        assert_eq!(cfg.api_key, "env-api-key");
        // Empty env values do not override
        assert_eq!(cfg.budget_key, "file-budget-key");
    }

    #[test]
    fn test_missing_api_key() {
        let env = env_from(&[(ENV_BUDGET_KEY, "b")]);
        let err = Config::resolve(None, env).unwrap_err().to_string();
        assert!(err.contains("APIKey is required"));
        assert!(err.contains(ENV_API_KEY));
        assert!(err.contains(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_missing_budget_key() {
        let env = env_from(&[(ENV_API_KEY, "k")]);
        let err = Config::resolve(None, env).unwrap_err().to_string();
        assert!(err.contains("BudgetKey is required"));
        assert!(err.contains(ENV_BUDGET_KEY));
    }

    #[test]
    fn test_file_config_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"APIURL": "https://file.api.com", "APIKey": "file-api-key", "BudgetKey": "file-budget-key"}}"#
        )
        .unwrap();

        let parsed = FileConfig::from_path(file.path()).unwrap();
        assert_eq!(parsed.api_url.as_deref(), Some("https://file.api.com"));
        assert_eq!(parsed.api_key.as_deref(), Some("file-api-key"));
        assert_eq!(parsed.budget_key.as_deref(), Some("file-budget-key"));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();

        let err = Config::load(Some(file.path())).unwrap_err().to_string();
        assert!(err.contains("invalid JSON in config file"));
    }

    #[test]
    fn test_load_records_source_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"APIKey": "file-api-key", "BudgetKey": "file-budget-key"}}"#).unwrap();

        let cfg = Config::load(Some(file.path())).unwrap();
        assert_eq!(cfg.source.as_deref(), Some(file.path()));
        assert_eq!(cfg.redacted().source.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_resolve_has_no_source() {
        let env = env_from(&[(ENV_API_KEY, "k"), (ENV_BUDGET_KEY, "b")]);
        assert_eq!(Config::resolve(None, env).unwrap().source, None);
    }

    #[test]
    fn test_with_api_url_override() {
        let env = env_from(&[(ENV_API_KEY, "k"), (ENV_BUDGET_KEY, "b")]);
        let cfg = Config::resolve(None, env)
            .unwrap()
            .with_api_url(Some("http://127.0.0.1:9000/"));
        assert_eq!(cfg.api_url, "http://127.0.0.1:9000");
    }

    #[test]
    fn test_redacted_masks_secrets() {
        let cfg = Config {
            api_url: DEFAULT_API_URL.into(),
            api_key: "secret-key-12345".into(),
            budget_key: "short".into(),
            source: None,
        };
        let redacted = cfg.redacted();
        assert_eq!(redacted.api_key, "secr***2345");
        assert_eq!(redacted.budget_key, "***");
        assert_eq!(redacted.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_credentials_help_lists_both_mechanisms() {
        let help = credentials_help();
        assert!(help.contains(CONFIG_FILE_NAME));
        assert!(help.contains(ENV_API_KEY));
        assert!(help.contains(ENV_BUDGET_KEY));
    }
}
