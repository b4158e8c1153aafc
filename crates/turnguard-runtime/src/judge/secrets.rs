//! Credential handling for judge backends that need an API key.
//!
//! Keys are wrapped in [`ApiCredential`] as soon as they are read, so they
//! cannot reach a log line, the `config` command output or an error message.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use turnguard_core::JudgeError;

/// Where a credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// The YAML settings file
    Config,
    /// An environment variable
    Environment,
    /// Passed in by code
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A secret API key that only prints as `[REDACTED]`.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Use the configured value, else the environment variable.
    ///
    /// `lookup` resolves environment variables; pass
    /// `|k| std::env::var(k).ok()` outside of tests.
    pub fn from_config_or_env(
        configured: Option<&str>,
        env_var: &str,
        name: &'static str,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, JudgeError> {
        if let Some(value) = configured.filter(|v| !v.is_empty()) {
            return Ok(Self::new(value, CredentialSource::Config, name));
        }

        if let Some(value) = lookup(env_var).filter(|v| !v.is_empty()) {
            return Ok(Self::new(value, CredentialSource::Environment, name));
        }

        Err(JudgeError::Unavailable(format!(
            "{name} required: set it in config.yaml or the {env_var} environment variable"
        )))
    }

    /// The raw value. Call only where the key is sent.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}
