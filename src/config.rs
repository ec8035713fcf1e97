//! Configuration management for debt-guardian
//!
//! Stores settings in ~/.config/debt-guardian/config.json. Secrets never live
//! in the file: the OpenRouter key and GitHub token come from the environment
//! first, then the system keychain.

use crate::autofix::AutoFixSettings;
use crate::cache::StoreBackend;
use crate::llm::Model;
use anyhow::{Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "debt-guardian";
const KEYRING_SERVICE: &str = "debt-guardian";
const OPENROUTER_KEY_USER: &str = "openrouter_api_key";
const GITHUB_TOKEN_USER: &str = "github_token";
const OPENROUTER_KEY_ENV: &str = "OPENROUTER_API_KEY";
const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

fn default_fix_limit() -> usize {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: Model,
    /// Cache backend, chosen once at startup
    #[serde(default)]
    pub store: StoreBackend,
    /// SQLite file for the durable store (defaults to the platform data dir)
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// How many top-ranked issues get a fix proposal
    #[serde(default = "default_fix_limit")]
    pub fix_limit: usize,
    #[serde(default)]
    pub autofix: AutoFixSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: Model::default(),
            store: StoreBackend::default(),
            database_path: None,
            fix_limit: default_fix_limit(),
            autofix: AutoFixSettings::default(),
        }
    }
}

fn keyring_entry(user: &str) -> Result<Entry, keyring::Error> {
    Entry::new(KEYRING_SERVICE, user)
}

fn read_keyring(user: &str) -> Result<Option<String>, keyring::Error> {
    let entry = keyring_entry(user)?;
    match entry.get_password() {
        Ok(value) => Ok(Some(value)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Environment variable first, then keychain.
fn lookup_secret(env_var: &str, user: &str) -> Option<String> {
    if let Ok(value) = std::env::var(env_var) {
        if !value.trim().is_empty() {
            return Some(value);
        }
    }
    match read_keyring(user) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, "failed to read system keychain");
            None
        }
    }
}

impl Config {
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR))
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return default
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from an explicit path. A corrupt file is moved aside and defaults are used.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                preserve_corrupt_config(path, &content);
                tracing::warn!(
                    error = %err,
                    path = %path.display(),
                    "config file was corrupted; a backup was saved and defaults were loaded"
                );
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().context("could not determine config directory")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let content = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        write_config_atomic(path, &content)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    /// SQLite file for the durable store.
    pub fn resolved_database_path(&self) -> PathBuf {
        if let Some(path) = &self.database_path {
            return path.clone();
        }
        dirs::data_dir()
            .map(|p| p.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from(".debt-guardian"))
            .join("cache.db")
    }

    /// OpenRouter API key (environment, then keychain)
    pub fn get_api_key(&self) -> Option<String> {
        lookup_secret(OPENROUTER_KEY_ENV, OPENROUTER_KEY_USER)
    }

    /// GitHub token (environment, then keychain)
    pub fn get_github_token(&self) -> Option<String> {
        lookup_secret(GITHUB_TOKEN_ENV, GITHUB_TOKEN_USER)
    }

    pub fn set_api_key(&self, key: &str) -> Result<()> {
        store_secret(OPENROUTER_KEY_USER, key, OPENROUTER_KEY_ENV)
    }

    pub fn set_github_token(&self, token: &str) -> Result<()> {
        store_secret(GITHUB_TOKEN_USER, token, GITHUB_TOKEN_ENV)
    }

    /// OpenRouter keys start with `sk-`.
    pub fn validate_api_key_format(key: &str) -> bool {
        key.starts_with("sk-")
    }

    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/debt-guardian/config.json".to_string())
    }
}

/// Write to the keychain and read it back to confirm it stuck.
fn store_secret(user: &str, value: &str, env_hint: &str) -> Result<()> {
    keyring_entry(user)
        .and_then(|entry| entry.set_password(value))
        .with_context(|| {
            format!("failed to store secret in system keychain; set {env_hint} instead")
        })?;

    match read_keyring(user) {
        Ok(Some(stored)) if stored == value => Ok(()),
        Ok(_) => anyhow::bail!("keychain verification failed; set {env_hint} instead"),
        Err(err) => Err(err).context(format!(
            "couldn't read back from keychain; set {env_hint} instead"
        )),
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

fn write_config_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    use std::io::Write;

    let tmp_path = path.with_extension("tmp");
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(err) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
            tracing::warn!(error = %err, "failed to set temp config file permissions");
        }
    }

    file.write_all(content.as_bytes())?;
    drop(file);

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.fix_limit, 10);
        assert_eq!(config.store, StoreBackend::Sqlite);
        assert_eq!(config.autofix.max_prs_per_day, 3);
        assert!(config.autofix.draft_prs_only);
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let config: Config = serde_json::from_str(r#"{"store": "memory"}"#).unwrap();
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.fix_limit, 10);
        assert_eq!(config.model, Model::Speed);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg").join("config.json");
        let mut config = Config::default();
        config.fix_limit = 4;
        config.database_path = Some(dir.path().join("db.sqlite"));
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path), config);
    }

    #[test]
    fn test_corrupt_config_is_preserved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.json.corrupt").exists());
        assert!(!path.exists());
    }

    #[test]
    fn test_explicit_database_path_wins() {
        let config = Config {
            database_path: Some(PathBuf::from("/tmp/x.db")),
            ..Default::default()
        };
        assert_eq!(config.resolved_database_path(), PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn test_validate_api_key_format() {
        assert!(Config::validate_api_key_format("sk-or-v1-abc"));
        assert!(!Config::validate_api_key_format("ghp_abc"));
    }
}
