//! Configuration for the archive front end.
//!
//! Defaults are derived from the environment; an optional YAML file is laid
//! over them as a partial config. Only fields present in the file override
//! the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_STATE_FILE: &str = "nav-state.json";

/// Root configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub global: GlobalConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub retry: RetryConfig,
    pub intro: IntroConfig,
}

#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub data_dir: PathBuf,
    pub config_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "console".to_string(),
        }
    }
}

/// Where durable navigation flags live.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// Explicit durable state file. Derived from `global.data_dir` when unset.
    pub path: Option<PathBuf>,
}

/// Backoff for mounting a screen whose host is not ready yet.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: u32,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 100,
            max_delay_ms: 2_000,
            multiplier: 2,
            max_attempts: 8,
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone)]
pub struct IntroConfig {
    pub enabled: bool,
    /// Key sequence that diverts the intro to the admin login screen.
    pub admin_sequence: String,
}

impl Default for IntroConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            admin_sequence: "admin".to_string(),
        }
    }
}

impl Config {
    pub fn default_from_env() -> Self {
        let home = std::env::var("HOME").unwrap_or_default();
        let data_dir = if home.is_empty() {
            PathBuf::from(".")
        } else {
            PathBuf::from(&home)
                .join(".local")
                .join("share")
                .join("archive")
        };
        let config_dir = if home.is_empty() {
            PathBuf::from(".")
        } else {
            PathBuf::from(&home).join(".config").join("archive")
        };
        Self {
            global: GlobalConfig {
                data_dir,
                config_dir,
            },
            logging: LoggingConfig::default(),
            storage: StorageConfig::default(),
            retry: RetryConfig::default(),
            intro: IntroConfig::default(),
        }
    }

    /// Effective durable state file (explicit or derived from data_dir).
    pub fn durable_store_path(&self) -> PathBuf {
        if let Some(path) = &self.storage.path {
            return path.clone();
        }
        self.global.data_dir.join(DEFAULT_STATE_FILE)
    }

    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.global.data_dir)?;
        std::fs::create_dir_all(&self.global.config_dir)?;
        Ok(())
    }

    /// Validates the entire configuration, returning an error message on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.global.data_dir.as_os_str().is_empty() {
            return Err("global.data_dir is required".into());
        }

        match self.logging.level.to_lowercase().trim() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(
                    "logging.level must be one of trace, debug, info, warn, error".into(),
                )
            }
        }
        match self.logging.format.to_lowercase().trim() {
            "console" | "json" => {}
            _ => return Err("logging.format must be one of console, json".into()),
        }

        if self.retry.initial_delay_ms == 0 {
            return Err("retry.initial_delay_ms must be greater than 0".into());
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err("retry.max_delay_ms must be at least retry.initial_delay_ms".into());
        }
        if self.retry.multiplier < 1 {
            return Err("retry.multiplier must be at least 1".into());
        }
        if self.retry.max_attempts < 1 {
            return Err("retry.max_attempts must be at least 1".into());
        }

        if self.intro.admin_sequence.trim().is_empty() {
            return Err("intro.admin_sequence is required".into());
        }

        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    #[serde(default)]
    global: PartialGlobalConfig,
    #[serde(default)]
    logging: PartialLoggingConfig,
    #[serde(default)]
    storage: PartialStorageConfig,
    #[serde(default)]
    retry: PartialRetryConfig,
    #[serde(default)]
    intro: PartialIntroConfig,
}

#[derive(Debug, Default, Deserialize)]
struct PartialGlobalConfig {
    #[serde(default)]
    data_dir: String,
    #[serde(default)]
    config_dir: String,
}

#[derive(Debug, Default, Deserialize)]
struct PartialLoggingConfig {
    #[serde(default)]
    level: String,
    #[serde(default)]
    format: String,
}

#[derive(Debug, Default, Deserialize)]
struct PartialStorageConfig {
    #[serde(default)]
    path: String,
}

#[derive(Debug, Default, Deserialize)]
struct PartialRetryConfig {
    #[serde(default)]
    initial_delay_ms: u64,
    #[serde(default)]
    max_delay_ms: u64,
    #[serde(default)]
    multiplier: u32,
    #[serde(default)]
    max_attempts: u32,
}

#[derive(Debug, Default, Deserialize)]
struct PartialIntroConfig {
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    admin_sequence: String,
}

/// Load config with precedence:
/// defaults < (optional) config file (explicit => hard error if unreadable).
pub fn load_config(config_file: Option<&str>) -> Result<(Config, Option<PathBuf>), String> {
    let mut cfg = Config::default_from_env();

    let explicit = config_file
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from);

    let (path_to_try, used) = if let Some(path) = explicit {
        (Some(path), true)
    } else {
        (default_config_path(), false)
    };

    if let Some(path) = path_to_try {
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                apply_yaml(&mut cfg, &text)?;
                cfg.validate()?;
                return Ok((cfg, Some(path)));
            }
            Err(err) => {
                if used {
                    return Err(format!("failed to load config file: {err}"));
                }
            }
        }
    }

    Ok((cfg, None))
}

/// Overlay a YAML document onto `cfg`.
pub fn apply_yaml(cfg: &mut Config, text: &str) -> Result<(), String> {
    let parsed: PartialConfig = if text.trim().is_empty() {
        PartialConfig::default()
    } else {
        serde_yaml::from_str(text).map_err(|err| format!("parse config: {err}"))?
    };
    apply_partial(cfg, parsed)
}

fn default_config_path() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.trim().is_empty() {
            return Some(PathBuf::from(xdg).join("archive").join("config.yaml"));
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        if !home.trim().is_empty() {
            return Some(
                PathBuf::from(home)
                    .join(".config")
                    .join("archive")
                    .join("config.yaml"),
            );
        }
    }
    None
}

fn apply_partial(cfg: &mut Config, partial: PartialConfig) -> Result<(), String> {
    if !partial.global.data_dir.trim().is_empty() {
        cfg.global.data_dir = expand_tilde(partial.global.data_dir.trim())?;
    }
    if !partial.global.config_dir.trim().is_empty() {
        cfg.global.config_dir = expand_tilde(partial.global.config_dir.trim())?;
    }
    if !partial.logging.level.trim().is_empty() {
        cfg.logging.level = partial.logging.level.trim().to_string();
    }
    if !partial.logging.format.trim().is_empty() {
        cfg.logging.format = partial.logging.format.trim().to_string();
    }
    if !partial.storage.path.trim().is_empty() {
        cfg.storage.path = Some(expand_tilde(partial.storage.path.trim())?);
    }
    if partial.retry.initial_delay_ms > 0 {
        cfg.retry.initial_delay_ms = partial.retry.initial_delay_ms;
    }
    if partial.retry.max_delay_ms > 0 {
        cfg.retry.max_delay_ms = partial.retry.max_delay_ms;
    }
    if partial.retry.multiplier > 0 {
        cfg.retry.multiplier = partial.retry.multiplier;
    }
    if partial.retry.max_attempts > 0 {
        cfg.retry.max_attempts = partial.retry.max_attempts;
    }
    if let Some(enabled) = partial.intro.enabled {
        cfg.intro.enabled = enabled;
    }
    if !partial.intro.admin_sequence.trim().is_empty() {
        cfg.intro.admin_sequence = partial.intro.admin_sequence.trim().to_string();
    }
    Ok(())
}

fn expand_tilde(input: &str) -> Result<PathBuf, String> {
    if input == "~" {
        let home = std::env::var("HOME").map_err(|_| "failed to resolve HOME".to_string())?;
        return Ok(PathBuf::from(home));
    }
    if let Some(rest) = input.strip_prefix("~/") {
        let home = std::env::var("HOME").map_err(|_| "failed to resolve HOME".to_string())?;
        return Ok(PathBuf::from(home).join(rest));
    }
    Ok(Path::new(input).to_path_buf())
}
