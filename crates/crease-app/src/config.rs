// Configuration loading and parsing (app.toml, credentials.toml).

use std::path::{Path, PathBuf};
use std::time::Duration;

use crease_core::{Namespace, SignIn};
use crease_fantasy::{CreditTable, RosterRules};
use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },

    #[error("no default data directory available on this platform")]
    NoDataDir,
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub app_id: String,
    pub contest: ContestConfig,
    pub credits: CreditTable,
    pub storage: StorageConfig,
    pub seed: SeedConfig,
    pub credentials: CredentialsConfig,
}

// ---------------------------------------------------------------------------
// app.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire app.toml file.
#[derive(Debug, Clone, Deserialize)]
struct AppFile {
    app: AppSection,
    contest: ContestConfig,
    credits: CreditTable,
    storage: StorageConfig,
    seed: SeedConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct AppSection {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContestConfig {
    pub roster_size: usize,
    pub credit_cap: u32,
    pub leaderboard_top: usize,
    pub join_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: Backend,
    /// SQLite file. Falls back to the platform data directory when omitted.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    pub enabled: bool,
    pub players_csv: String,
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub auth_token: Option<String>,
}

impl Config {
    pub fn roster_rules(&self) -> RosterRules {
        RosterRules {
            max_players: self.contest.roster_size,
            credit_cap: self.contest.credit_cap,
            credits: self.credits,
        }
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.contest.join_timeout_ms)
    }

    /// Token sign-in when credentials carry a token, anonymous otherwise.
    pub fn sign_in(&self) -> SignIn {
        match self.credentials.auth_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => SignIn::Token(token.to_string()),
            _ => SignIn::Anonymous,
        }
    }

    /// Where the SQLite database lives.
    pub fn db_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.storage.path {
            return Ok(PathBuf::from(path));
        }
        let dirs =
            directories::ProjectDirs::from("", "", "crease").ok_or(ConfigError::NoDataDir)?;
        Ok(dirs.data_dir().join("crease.db"))
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/app.toml` and (optionally)
/// `config/credentials.toml`, relative to `base_dir`.
///
/// Does not copy defaults; `load_config()` does that first.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- app.toml (required) ---
    let app_path = config_dir.join("app.toml");
    let app_text = read_file(&app_path)?;
    let app_file: AppFile = toml::from_str(&app_text).map_err(|e| ConfigError::ParseError {
        path: app_path.clone(),
        source: e,
    })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        app_id: app_file.app.id,
        contest: app_file.contest,
        credits: app_file.credits,
        storage: app_file.storage,
        seed: app_file.seed,
        credentials,
    };

    validate(&config)?;

    Ok(config)
}

/// Copy `defaults/app.toml` into `config/` on first run.
///
/// Returns the path written, or `None` when `config/app.toml` already exists.
/// Credentials are never copied; `credentials.toml` stays optional.
pub fn ensure_app_config(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let target = base_dir.join("config").join("app.toml");
    if target.exists() {
        return Ok(None);
    }
    let source = base_dir.join("defaults").join("app.toml");
    if !source.exists() {
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "neither config/app.toml nor defaults/app.toml found in {}",
                base_dir.display()
            ),
        });
    }

    let copy_err = |e: std::io::Error| ConfigError::DefaultsCopyError {
        message: format!("failed to copy {} to {}: {e}", source.display(), target.display()),
    };
    std::fs::create_dir_all(base_dir.join("config")).map_err(copy_err)?;
    std::fs::copy(&source, &target).map_err(copy_err)?;
    Ok(Some(target))
}

/// Load config relative to the current working directory, copying the
/// default app.toml first if needed.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_app_config(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.app_id.trim().is_empty() {
        return Err(invalid("app.id", "must not be empty"));
    }
    if let Err(e) = Namespace::public(&config.app_id) {
        return Err(invalid("app.id", format!("not usable as a path segment: {e}")));
    }

    let contest = &config.contest;
    let contest_fields: &[(&str, u64)] = &[
        ("contest.roster_size", contest.roster_size as u64),
        ("contest.credit_cap", u64::from(contest.credit_cap)),
        ("contest.leaderboard_top", contest.leaderboard_top as u64),
        ("contest.join_timeout_ms", contest.join_timeout_ms),
    ];
    for (name, val) in contest_fields {
        if *val == 0 {
            return Err(invalid(name, "must be > 0"));
        }
    }

    let c = &config.credits;
    let credit_fields: &[(&str, u32)] = &[
        ("credits.batsman", c.batsman),
        ("credits.bowler", c.bowler),
        ("credits.all_rounder", c.all_rounder),
    ];
    for (name, val) in credit_fields {
        if *val == 0 {
            return Err(invalid(name, "must be > 0"));
        }
    }

    if config.storage.backend == Backend::Sqlite
        && config
            .storage
            .path
            .as_deref()
            .is_some_and(|p| p.trim().is_empty())
    {
        return Err(invalid("storage.path", "must not be empty"));
    }

    if config.seed.enabled && config.seed.players_csv.trim().is_empty() {
        return Err(invalid("seed.players_csv", "must not be empty when seeding"));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Path to the crease-app crate root (works from the crate or the
    /// workspace root).
    fn project_root() -> PathBuf {
        let cwd = std::env::current_dir().unwrap();
        if cwd.join("defaults").exists() {
            cwd
        } else if cwd.join("crates/crease-app/defaults").exists() {
            cwd.join("crates/crease-app")
        } else {
            panic!("Cannot locate defaults/ directory from CWD {:?}", cwd);
        }
    }

    /// Fresh temp dir with `config/app.toml` set to `app_toml`.
    fn temp_with_app_toml(name: &str, app_toml: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        fs::write(tmp.join("config/app.toml"), app_toml).unwrap();
        tmp
    }

    fn default_app_toml() -> String {
        fs::read_to_string(project_root().join("defaults/app.toml")).unwrap()
    }

    #[test]
    fn load_default_config() {
        let tmp = temp_with_app_toml("crease_config_defaults", &default_app_toml());
        let config = load_config_from(&tmp).expect("should load default config");

        assert_eq!(config.app_id, "crease-league");
        assert_eq!(config.contest.roster_size, 11);
        assert_eq!(config.contest.credit_cap, 100);
        assert_eq!(config.contest.leaderboard_top, 20);
        assert_eq!(config.join_timeout(), Duration::from_secs(10));
        assert_eq!(config.credits, CreditTable::default());
        assert_eq!(config.storage.backend, Backend::Sqlite);
        assert_eq!(config.storage.path.as_deref(), Some("crease.db"));
        assert!(config.seed.enabled);
        assert_eq!(config.seed.players_csv, "data/players.csv");
        assert_eq!(config.roster_rules(), RosterRules::default());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_credentials_means_anonymous() {
        let tmp = temp_with_app_toml("crease_config_no_creds", &default_app_toml());
        let config = load_config_from(&tmp).unwrap();
        assert!(config.credentials.auth_token.is_none());
        assert_eq!(config.sign_in(), SignIn::Anonymous);
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn credentials_token_used_for_sign_in() {
        let tmp = temp_with_app_toml("crease_config_with_creds", &default_app_toml());
        fs::write(
            tmp.join("config/credentials.toml"),
            "auth_token = \"  fan-42 \"\n",
        )
        .unwrap();
        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.sign_in(), SignIn::Token("fan-42".into()));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_app_toml_is_file_not_found() {
        let tmp = std::env::temp_dir().join("crease_config_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        let err = load_config_from(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let tmp = temp_with_app_toml("crease_config_malformed", "[app\nid = ");
        let err = load_config_from(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        let _ = fs::remove_dir_all(&tmp);
    }

    fn expect_invalid(name: &str, from: &str, to: &str, field: &str) {
        let toml = default_app_toml().replace(from, to);
        assert_ne!(toml, default_app_toml(), "replacement `{from}` did not apply");
        let tmp = temp_with_app_toml(name, &toml);
        match load_config_from(&tmp).unwrap_err() {
            ConfigError::ValidationError { field: got, .. } => assert_eq!(got, field),
            other => panic!("expected ValidationError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_empty_app_id() {
        expect_invalid(
            "crease_config_empty_id",
            "id = \"crease-league\"",
            "id = \"\"",
            "app.id",
        );
    }

    #[test]
    fn rejects_app_id_with_slash() {
        expect_invalid(
            "crease_config_slash_id",
            "id = \"crease-league\"",
            "id = \"a/b\"",
            "app.id",
        );
    }

    #[test]
    fn rejects_zero_roster_size() {
        expect_invalid(
            "crease_config_zero_roster",
            "roster_size = 11",
            "roster_size = 0",
            "contest.roster_size",
        );
    }

    #[test]
    fn rejects_zero_credit_cost() {
        expect_invalid(
            "crease_config_zero_bowler",
            "bowler = 8",
            "bowler = 0",
            "credits.bowler",
        );
    }

    #[test]
    fn rejects_empty_sqlite_path() {
        expect_invalid(
            "crease_config_empty_path",
            "path = \"crease.db\"",
            "path = \"\"",
            "storage.path",
        );
    }

    #[test]
    fn db_path_falls_back_to_data_dir() {
        let toml = default_app_toml().replace("path = \"crease.db\"\n", "");
        let tmp = temp_with_app_toml("crease_config_no_path", &toml);
        let config = load_config_from(&tmp).unwrap();
        assert!(config.storage.path.is_none());
        // Headless CI boxes may have no home directory.
        if let Ok(path) = config.db_path() {
            assert!(path.ends_with("crease.db"));
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn first_run_copies_default_app_config_only() {
        let root = project_root();
        let tmp = std::env::temp_dir().join("crease_config_ensure");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        for entry in fs::read_dir(root.join("defaults")).unwrap() {
            let path = entry.unwrap().path();
            fs::copy(&path, tmp.join("defaults").join(path.file_name().unwrap())).unwrap();
        }

        let copied = ensure_app_config(&tmp).unwrap();
        assert_eq!(copied, Some(tmp.join("config/app.toml")));
        assert!(!tmp.join("config/credentials.toml").exists());
        assert!(!tmp.join("config/credentials.toml.example").exists());
        assert_eq!(load_config_from(&tmp).unwrap().app_id, "crease-league");

        // Second run leaves an edited file alone.
        fs::write(tmp.join("config/app.toml"), "# edited").unwrap();
        assert_eq!(ensure_app_config(&tmp).unwrap(), None);
        assert_eq!(
            fs::read_to_string(tmp.join("config/app.toml")).unwrap(),
            "# edited"
        );

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_defaults_without_config_fails() {
        let tmp = std::env::temp_dir().join("crease_config_nothing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        let err = ensure_app_config(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::DefaultsCopyError { .. }));
        let _ = fs::remove_dir_all(&tmp);
    }
}
