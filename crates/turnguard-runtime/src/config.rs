//! Engine configuration.
//!
//! Layers, lowest precedence first:
//! 1. built-in defaults
//! 2. `$XDG_CONFIG_HOME/turnguard/config.yaml` (optional)
//! 3. `TURNGUARD_*` environment variables
//!
//! Bad values in any layer are skipped and reported; loading never fails.
//! Environment access goes through a lookup function so tests can supply
//! their own variables.

use directories::BaseDirs;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use turnguard_core::{
    RuleSet, RuleSetError, DEFAULT_MAX_BLOCKS, DEFAULT_MIN_LAST_LENGTH, MAX_JUDGE_TIMEOUT,
};

use crate::judge::ApiCredential;

pub const ENV_MIN_LENGTH: &str = "TURNGUARD_MIN_LENGTH";
pub const ENV_MAX_BLOCKS: &str = "TURNGUARD_MAX_BLOCKS";
pub const ENV_JUDGE_TIMEOUT: &str = "TURNGUARD_JUDGE_TIMEOUT";
pub const ENV_BACKEND: &str = "TURNGUARD_BACKEND";
pub const ENV_OPENCODE_BIN: &str = "TURNGUARD_OPENCODE_BIN";
pub const ENV_OPENCODE_SERVER: &str = "TURNGUARD_OPENCODE_SERVER";
pub const ENV_STATE_DIR: &str = "TURNGUARD_STATE_DIR";
pub const ENV_RULES: &str = "TURNGUARD_RULES";
pub const ENV_ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";

pub const DEFAULT_JUDGE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SERVER_PORT: u16 = 4096;

const APP_DIR: &str = "turnguard";
const SETTINGS_FILE: &str = "config.yaml";
const USER_RULES_FILE: &str = "rules.csv";

/// Rules shipped with the binary, used when no rule file is configured.
pub const BUNDLED_RULES: &str = include_str!("../rules/default-rules.csv");

/// Errors reading the settings file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings file {path}: {source}")]
    YamlError {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Which judge backend answers rule prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    #[serde(rename = "opencode")]
    OpenCode,
    Anthropic,
    Scripted,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::OpenCode => "opencode",
            BackendKind::Anthropic => "anthropic",
            BackendKind::Scripted => "scripted",
        })
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opencode" => Ok(BackendKind::OpenCode),
            "anthropic" => Ok(BackendKind::Anthropic),
            "scripted" => Ok(BackendKind::Scripted),
            other => Err(ConfigError::InvalidValue {
                key: "backend".to_string(),
                reason: format!("unknown backend '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenCodeSettings {
    /// Explicit binary path; searched for when absent
    pub binary: Option<PathBuf>,

    /// Server to attach judge runs to
    pub server_url: String,

    /// Port `turnguard server acquire` starts the server on
    pub server_port: u16,
}

impl Default for OpenCodeSettings {
    fn default() -> Self {
        Self {
            binary: None,
            server_url: format!("http://127.0.0.1:{DEFAULT_SERVER_PORT}"),
            server_port: DEFAULT_SERVER_PORT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnthropicSettings {
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub api_key: Option<Arc<ApiCredential>>,
}

impl Default for AnthropicSettings {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5".to_string(),
            base_url: "https://api.anthropic.com/v1".to_string(),
            max_tokens: 500,
            api_key: None,
        }
    }
}

/// Effective configuration for one process.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum final-message length (characters) for `last` rules
    pub min_last_length: usize,

    /// Blocks allowed per session before the safety valve opens
    pub max_blocks: u32,

    /// Judge timeout for rules without their own
    pub judge_timeout: Duration,

    pub backend: BackendKind,

    pub opencode: OpenCodeSettings,

    pub anthropic: AnthropicSettings,

    /// Session counters, server refs and the log file live here
    pub state_dir: PathBuf,

    /// Directory holding `config.yaml` and the user rule file
    pub config_dir: PathBuf,

    /// Rule file override from settings or environment
    pub rules_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::defaults(&|_: &str| -> Option<String> { None })
    }
}

/// On-disk settings. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    min_length: Option<usize>,
    max_blocks: Option<u32>,
    judge_timeout: Option<String>,
    backend: Option<BackendKind>,
    rules: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    opencode: OpenCodeFile,
    anthropic: AnthropicFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct OpenCodeFile {
    binary: Option<PathBuf>,
    server_url: Option<String>,
    server_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct AnthropicFile {
    model: Option<String>,
    base_url: Option<String>,
    max_tokens: Option<u32>,
    api_key: Option<String>,
}

impl EngineConfig {
    /// Load from the process environment.
    pub fn load() -> Self {
        Self::load_with(&|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to read environment variables. Skipped values are
    /// logged.
    pub fn load_with(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        let (config, issues) = Self::load_reporting(lookup);
        for issue in &issues {
            tracing::warn!(error = %issue, "Ignoring configuration value");
        }
        config
    }

    /// Load using `lookup`, returning skipped values instead of logging them.
    /// Used when logging is configured from the result.
    pub fn load_reporting(lookup: &dyn Fn(&str) -> Option<String>) -> (Self, Vec<ConfigError>) {
        let mut config = Self::defaults(lookup);
        let mut issues = Vec::new();

        let settings_path = config.settings_path();
        let settings = match read_settings(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                issues.push(e);
                None
            }
        };

        let api_key_setting = settings.as_ref().and_then(|s| s.anthropic.api_key.clone());
        if let Some(settings) = settings {
            config.apply_settings(settings, &mut issues);
        }
        config.apply_env(lookup, &mut issues);

        config.anthropic.api_key = ApiCredential::from_config_or_env(
            api_key_setting.as_deref(),
            ENV_ANTHROPIC_API_KEY,
            "Anthropic API key",
            lookup,
        )
        .ok()
        .map(Arc::new);

        (config, issues)
    }

    fn defaults(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        let home = BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
        let xdg = |var: &str, fallback: &[&str]| -> PathBuf {
            lookup(var)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .or_else(|| {
                    home.as_ref()
                        .map(|h| fallback.iter().fold(h.clone(), |p, part| p.join(part)))
                })
                .unwrap_or_else(std::env::temp_dir)
                .join(APP_DIR)
        };

        Self {
            min_last_length: DEFAULT_MIN_LAST_LENGTH,
            max_blocks: DEFAULT_MAX_BLOCKS,
            judge_timeout: DEFAULT_JUDGE_TIMEOUT,
            backend: BackendKind::default(),
            opencode: OpenCodeSettings::default(),
            anthropic: AnthropicSettings::default(),
            state_dir: xdg("XDG_STATE_HOME", &[".local", "state"]),
            config_dir: xdg("XDG_CONFIG_HOME", &[".config"]),
            rules_path: None,
        }
    }

    fn apply_settings(&mut self, settings: SettingsFile, issues: &mut Vec<ConfigError>) {
        if let Some(v) = settings.min_length {
            self.min_last_length = v;
        }
        if let Some(v) = settings.max_blocks {
            self.max_blocks = v;
        }
        if let Some(raw) = settings.judge_timeout {
            match parse_timeout(&raw) {
                Ok(v) => self.judge_timeout = v,
                Err(e) => issues.push(e),
            }
        }
        if let Some(v) = settings.backend {
            self.backend = v;
        }
        if settings.rules.is_some() {
            self.rules_path = settings.rules;
        }
        if let Some(v) = settings.state_dir {
            self.state_dir = v;
        }

        if settings.opencode.binary.is_some() {
            self.opencode.binary = settings.opencode.binary;
        }
        if let Some(port) = settings.opencode.server_port {
            self.opencode.server_port = port;
            self.opencode.server_url = format!("http://127.0.0.1:{port}");
        }
        if let Some(v) = settings.opencode.server_url {
            self.opencode.server_url = v;
        }

        if let Some(v) = settings.anthropic.model {
            self.anthropic.model = v;
        }
        if let Some(v) = settings.anthropic.base_url {
            self.anthropic.base_url = v;
        }
        if let Some(v) = settings.anthropic.max_tokens {
            self.anthropic.max_tokens = v;
        }
    }

    fn apply_env(&mut self, lookup: &dyn Fn(&str) -> Option<String>, issues: &mut Vec<ConfigError>) {
        if let Some(v) = env_value(lookup, ENV_MIN_LENGTH, issues, |s| s.parse::<usize>()) {
            self.min_last_length = v;
        }
        if let Some(v) = env_value(lookup, ENV_MAX_BLOCKS, issues, |s| s.parse::<u32>()) {
            self.max_blocks = v;
        }
        if let Some(v) = env_value(lookup, ENV_JUDGE_TIMEOUT, issues, parse_timeout) {
            self.judge_timeout = v;
        }
        if let Some(v) = env_value(lookup, ENV_BACKEND, issues, BackendKind::from_str) {
            self.backend = v;
        }
        if let Some(v) = non_empty(lookup, ENV_OPENCODE_BIN) {
            self.opencode.binary = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty(lookup, ENV_OPENCODE_SERVER) {
            self.opencode.server_url = v;
        }
        if let Some(v) = non_empty(lookup, ENV_STATE_DIR) {
            self.state_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty(lookup, ENV_RULES) {
            self.rules_path = Some(PathBuf::from(v));
        }
    }

    pub fn settings_path(&self) -> PathBuf {
        self.config_dir.join(SETTINGS_FILE)
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.state_dir.join("sessions")
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join("turnguard.log")
    }

    /// Where this invocation's rules come from.
    ///
    /// Order: `cli_override`, the configured override, the user rule file,
    /// the bundled rules.
    pub fn rule_source(&self, cli_override: Option<&Path>) -> RuleSource {
        if let Some(path) = cli_override.or(self.rules_path.as_deref()) {
            return RuleSource::Explicit(path.to_path_buf());
        }

        let user = self.config_dir.join(USER_RULES_FILE);
        if user.is_file() {
            return RuleSource::User(user);
        }

        RuleSource::Bundled
    }

    /// Key/value view for display, with secrets redacted.
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        let path_or_none = |p: Option<&Path>| {
            p.map(|p| p.display().to_string())
                .unwrap_or_else(|| "(none)".to_string())
        };

        vec![
            ("min_length", self.min_last_length.to_string()),
            ("max_blocks", self.max_blocks.to_string()),
            (
                "judge_timeout",
                humantime::format_duration(self.judge_timeout).to_string(),
            ),
            ("backend", self.backend.to_string()),
            ("opencode.binary", path_or_none(self.opencode.binary.as_deref())),
            ("opencode.server_url", self.opencode.server_url.clone()),
            ("opencode.server_port", self.opencode.server_port.to_string()),
            ("anthropic.model", self.anthropic.model.clone()),
            ("anthropic.base_url", self.anthropic.base_url.clone()),
            (
                "anthropic.api_key",
                self.anthropic
                    .api_key
                    .as_ref()
                    .map(|k| k.to_string())
                    .unwrap_or_else(|| "(none)".to_string()),
            ),
            ("rules", path_or_none(self.rules_path.as_deref())),
            ("state_dir", self.state_dir.display().to_string()),
            ("config_dir", self.config_dir.display().to_string()),
        ]
    }
}

fn read_settings(path: &Path) -> Result<Option<SettingsFile>, ConfigError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::IoError {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if raw.trim().is_empty() {
        return Ok(None);
    }

    serde_yaml::from_str(&raw)
        .map(Some)
        .map_err(|source| ConfigError::YamlError {
            path: path.to_path_buf(),
            source,
        })
}

fn parse_timeout(raw: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        key: "judge_timeout".to_string(),
        reason,
    };
    let timeout = humantime::parse_duration(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if timeout.is_zero() {
        return Err(invalid("must be greater than zero".to_string()));
    }
    if timeout > MAX_JUDGE_TIMEOUT {
        return Err(invalid(format!(
            "must be at most {}",
            humantime::format_duration(MAX_JUDGE_TIMEOUT)
        )));
    }
    Ok(timeout)
}

fn non_empty(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn env_value<T, E: fmt::Display>(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    issues: &mut Vec<ConfigError>,
    parse: impl Fn(&str) -> Result<T, E>,
) -> Option<T> {
    let raw = non_empty(lookup, key)?;
    match parse(raw.trim()) {
        Ok(value) => Some(value),
        Err(e) => {
            issues.push(ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("'{raw}': {e}"),
            });
            None
        }
    }
}

/// Where the rules of an invocation were loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    /// `--rules`, `TURNGUARD_RULES` or the `rules` setting
    Explicit(PathBuf),
    /// `rules.csv` in the config directory
    User(PathBuf),
    /// Compiled into the binary
    Bundled,
}

impl RuleSource {
    pub fn load(&self) -> Result<RuleSet, RuleSetError> {
        match self {
            RuleSource::Explicit(path) | RuleSource::User(path) => RuleSet::from_csv_file(path),
            RuleSource::Bundled => RuleSet::from_csv(BUNDLED_RULES),
        }
    }

    /// Load, degrading to an empty rule set on any error.
    pub fn load_or_empty(&self) -> RuleSet {
        match self.load() {
            Ok(rules) => rules,
            Err(e) => {
                tracing::warn!(source = %self, error = %e, "Rule file invalid, evaluating no rules");
                RuleSet::empty()
            }
        }
    }
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleSource::Explicit(path) => write!(f, "{}", path.display()),
            RuleSource::User(path) => write!(f, "{} (user)", path.display()),
            RuleSource::Bundled => f.write_str("bundled defaults"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_str().unwrap();
        let config = EngineConfig::load_with(&env(&[
            ("XDG_CONFIG_HOME", dir_str),
            ("XDG_STATE_HOME", dir_str),
        ]));

        assert_eq!(config.min_last_length, 50);
        assert_eq!(config.max_blocks, 10);
        assert_eq!(config.judge_timeout, Duration::from_secs(60));
        assert_eq!(config.backend, BackendKind::OpenCode);
        assert_eq!(config.opencode.server_url, "http://127.0.0.1:4096");
        assert_eq!(config.state_dir, dir.path().join("turnguard"));
        assert_eq!(
            config.sessions_dir(),
            dir.path().join("turnguard").join("sessions")
        );
        assert!(config.anthropic.api_key.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_str().unwrap();
        let config = EngineConfig::load_with(&env(&[
            ("XDG_CONFIG_HOME", dir_str),
            (ENV_MIN_LENGTH, "20"),
            (ENV_MAX_BLOCKS, "3"),
            (ENV_JUDGE_TIMEOUT, "45s"),
            (ENV_BACKEND, "Scripted"),
            (ENV_STATE_DIR, "/var/lib/turnguard"),
            (ENV_RULES, "/etc/turnguard/rules.csv"),
            (ENV_OPENCODE_SERVER, "http://127.0.0.1:5000"),
        ]));

        assert_eq!(config.min_last_length, 20);
        assert_eq!(config.max_blocks, 3);
        assert_eq!(config.judge_timeout, Duration::from_secs(45));
        assert_eq!(config.backend, BackendKind::Scripted);
        assert_eq!(config.state_dir, PathBuf::from("/var/lib/turnguard"));
        assert_eq!(
            config.rules_path,
            Some(PathBuf::from("/etc/turnguard/rules.csv"))
        );
        assert_eq!(config.opencode.server_url, "http://127.0.0.1:5000");
    }

    #[test]
    fn test_invalid_env_values_keep_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_with(&env(&[
            ("XDG_CONFIG_HOME", dir.path().to_str().unwrap()),
            (ENV_MIN_LENGTH, "fifty"),
            (ENV_MAX_BLOCKS, "-1"),
            (ENV_JUDGE_TIMEOUT, "0s"),
            (ENV_BACKEND, "gpt"),
        ]));

        assert_eq!(config.min_last_length, 50);
        assert_eq!(config.max_blocks, 10);
        assert_eq!(config.judge_timeout, Duration::from_secs(60));
        assert_eq!(config.backend, BackendKind::OpenCode);
    }

    #[test]
    fn test_oversized_timeout_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (config, issues) = EngineConfig::load_reporting(&env(&[
            ("XDG_CONFIG_HOME", dir.path().to_str().unwrap()),
            (ENV_JUDGE_TIMEOUT, "500000000000y"),
            (ENV_MAX_BLOCKS, "many"),
        ]));

        assert_eq!(config.judge_timeout, DEFAULT_JUDGE_TIMEOUT);
        assert_eq!(config.max_blocks, 10);
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().any(|e| matches!(
            e,
            ConfigError::InvalidValue { key, reason }
                if key == ENV_MAX_BLOCKS && reason.starts_with("'many'")
        )));
        assert!(issues
            .iter()
            .any(|e| e.to_string().contains("judge_timeout") && e.to_string().contains("at most 1day")));

        let (config, issues) = EngineConfig::load_reporting(&env(&[
            ("XDG_CONFIG_HOME", dir.path().to_str().unwrap()),
            (ENV_JUDGE_TIMEOUT, "24h"),
        ]));
        assert_eq!(config.judge_timeout, MAX_JUDGE_TIMEOUT);
        assert!(issues.is_empty());
    }

    #[test]
    fn test_settings_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let app_dir = dir.path().join("turnguard");
        fs::create_dir_all(&app_dir).unwrap();
        fs::write(
            app_dir.join("config.yaml"),
            r#"
min_length: 80
max_blocks: 5
judge_timeout: 2m
backend: anthropic
opencode:
  server_port: 4200
anthropic:
  model: claude-haiku-4-5
  api_key: sk-from-file
"#,
        )
        .unwrap();

        let config = EngineConfig::load_with(&env(&[
            ("XDG_CONFIG_HOME", dir.path().to_str().unwrap()),
            (ENV_MAX_BLOCKS, "7"),
        ]));

        assert_eq!(config.min_last_length, 80);
        assert_eq!(config.max_blocks, 7);
        assert_eq!(config.judge_timeout, Duration::from_secs(120));
        assert_eq!(config.backend, BackendKind::Anthropic);
        assert_eq!(config.opencode.server_port, 4200);
        assert_eq!(config.opencode.server_url, "http://127.0.0.1:4200");
        assert_eq!(config.anthropic.model, "claude-haiku-4-5");
        assert_eq!(
            config.anthropic.api_key.as_ref().map(|k| k.expose()),
            Some("sk-from-file")
        );
    }

    #[test]
    fn test_broken_settings_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let app_dir = dir.path().join("turnguard");
        fs::create_dir_all(&app_dir).unwrap();
        fs::write(app_dir.join("config.yaml"), "max_blocks: [not, a, number]").unwrap();

        let (config, issues) =
            EngineConfig::load_reporting(&env(&[("XDG_CONFIG_HOME", dir.path().to_str().unwrap())]));
        assert_eq!(config.max_blocks, 10);
        assert!(matches!(issues.as_slice(), [ConfigError::YamlError { .. }]));
    }

    #[test]
    fn test_rule_source_priority() {
        let dir = tempfile::tempdir().unwrap();
        let mut config =
            EngineConfig::load_with(&env(&[("XDG_CONFIG_HOME", dir.path().to_str().unwrap())]));

        assert_eq!(config.rule_source(None), RuleSource::Bundled);

        let user = config.config_dir.join("rules.csv");
        fs::create_dir_all(&config.config_dir).unwrap();
        fs::write(&user, "Q?,turn,block,Explain").unwrap();
        assert_eq!(config.rule_source(None), RuleSource::User(user));

        config.rules_path = Some(PathBuf::from("/env/rules.csv"));
        assert_eq!(
            config.rule_source(None),
            RuleSource::Explicit(PathBuf::from("/env/rules.csv"))
        );

        let cli = PathBuf::from("/cli/rules.csv");
        assert_eq!(
            config.rule_source(Some(&cli)),
            RuleSource::Explicit(cli.clone())
        );
    }

    #[test]
    fn test_bundled_rules_are_valid() {
        let rules = RuleSource::Bundled.load().unwrap();
        assert!(!rules.is_empty());
    }

    #[test]
    fn test_invalid_rule_file_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.csv");
        fs::write(&path, "Q?,sometimes,block,Explain").unwrap();

        let source = RuleSource::Explicit(path);
        assert!(source.load().is_err());
        assert!(source.load_or_empty().is_empty());
        assert!(RuleSource::Explicit("/nonexistent.csv".into())
            .load_or_empty()
            .is_empty());
    }

    #[test]
    fn test_describe_redacts_api_key() {
        let mut config = EngineConfig::default();
        config.anthropic.api_key = Some(Arc::new(ApiCredential::new(
            "sk-secret",
            crate::judge::CredentialSource::Environment,
            "Anthropic API key",
        )));

        let rendered = format!("{:?}", config.describe());
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
