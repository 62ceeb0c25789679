//! Runtime environment detection.
//!
//! Environment-scoped plugins ([`Model::use_in`](crate::Model::use_in)) run
//! only when the process environment matches. The environment comes from
//! `MODELKIT_ENV` (`browser`, `server` or `node`); without it, `wasm32`
//! targets count as `browser` and everything else as `server`.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

/// Variable read by [`RuntimeConfig::from_env`].
pub const ENV_VAR: &str = "MODELKIT_ENV";

/// Where the process runs. `node` parses as [`Environment::Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Browser,
    #[serde(alias = "node")]
    Server,
}

impl Environment {
    /// Environment implied by the compilation target.
    pub fn detect() -> Self {
        if cfg!(target_arch = "wasm32") {
            Environment::Browser
        } else {
            Environment::Server
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Browser => "browser",
            Environment::Server => "server",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown environment \"{0}\" (expected browser, server or node)")]
pub struct UnknownEnvironment(pub String);

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "browser" => Ok(Environment::Browser),
            "server" | "node" => Ok(Environment::Server),
            _ => Err(UnknownEnvironment(s.to_owned())),
        }
    }
}

/// Process-level settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub environment: Environment,
}

static CURRENT: LazyLock<RuntimeConfig> = LazyLock::new(RuntimeConfig::from_env);

impl RuntimeConfig {
    /// Reads `MODELKIT_ENV`, falling back to [`Environment::detect`] when it is
    /// unset or unrecognized.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup(ENV_VAR) {
            Some(raw) => raw.parse().unwrap_or_else(|err: UnknownEnvironment| {
                tracing::warn!(error = %err, "Ignoring {ENV_VAR}");
                Environment::detect()
            }),
            None => Environment::detect(),
        };
        Self { environment }
    }

    /// Configuration read once per process.
    pub fn current() -> Self {
        *CURRENT
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            environment: Environment::detect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_is_server() {
        assert_eq!("node".parse::<Environment>().unwrap(), Environment::Server);
        assert_eq!(" Browser ".parse::<Environment>().unwrap(), Environment::Browser);
        assert!("desktop".parse::<Environment>().is_err());
    }

    #[test]
    fn test_from_lookup() {
        let config = RuntimeConfig::from_lookup(|_| Some("browser".into()));
        assert_eq!(config.environment, Environment::Browser);

        let config = RuntimeConfig::from_lookup(|_| None);
        assert_eq!(config.environment, Environment::detect());

        let config = RuntimeConfig::from_lookup(|_| Some("mars".into()));
        assert_eq!(config.environment, Environment::detect());
    }

    #[test]
    fn test_deserialize_alias() {
        let config: RuntimeConfig = serde_json::from_str(r#"{"environment":"node"}"#).unwrap();
        assert_eq!(config.environment, Environment::Server);
    }
}
