use crate::core::types::Environment;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub api_key: Secret<String>,
    pub passphrase: Secret<String>,
    pub secret: Secret<String>,
    pub sandbox: bool,
    pub rest_url: Option<String>,
    pub ws_url: Option<String>,
}

// Custom Serialize implementation - never expose secrets in serialization
impl Serialize for ExchangeConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ExchangeConfig", 6)?;
        state.serialize_field("api_key", "[REDACTED]")?;
        state.serialize_field("passphrase", "[REDACTED]")?;
        state.serialize_field("secret", "[REDACTED]")?;
        state.serialize_field("sandbox", &self.sandbox)?;
        state.serialize_field("rest_url", &self.rest_url)?;
        state.serialize_field("ws_url", &self.ws_url)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ExchangeConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ExchangeConfigHelper {
            #[serde(default)]
            api_key: String,
            #[serde(default)]
            passphrase: String,
            #[serde(default)]
            secret: String,
            #[serde(default)]
            sandbox: bool,
            rest_url: Option<String>,
            ws_url: Option<String>,
        }

        let helper = ExchangeConfigHelper::deserialize(deserializer)?;
        Ok(Self {
            api_key: Secret::new(helper.api_key),
            passphrase: Secret::new(helper.passphrase),
            secret: Secret::new(helper.secret),
            sandbox: helper.sandbox,
            rest_url: helper.rest_url,
            ws_url: helper.ws_url,
        })
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self::read_only()
    }
}

impl ExchangeConfig {
    /// Create a new configuration with API credentials
    #[must_use]
    pub fn new(api_key: String, passphrase: String, secret: String) -> Self {
        Self {
            api_key: Secret::new(api_key),
            passphrase: Secret::new(passphrase),
            secret: Secret::new(secret),
            sandbox: false,
            rest_url: None,
            ws_url: None,
        }
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `{PREFIX}_API_KEY`
    /// - `{PREFIX}_PASSPHRASE`
    /// - `{PREFIX}_SECRET` (base64, as issued by the exchange)
    /// - `{PREFIX}_SANDBOX` (optional, defaults to false)
    /// - `{PREFIX}_REST_URL` / `{PREFIX}_WS_URL` (optional endpoint overrides)
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        let var = |name: &str| format!("{}_{}", prefix, name);

        let required = |name: &str| {
            let key = var(name);
            env::var(&key).map_err(|_| ConfigError::MissingEnvironmentVariable(key))
        };

        let api_key = required("API_KEY")?;
        let passphrase = required("PASSPHRASE")?;
        let secret = required("SECRET")?;

        let sandbox = match env::var(var("SANDBOX")) {
            Ok(raw) => raw.parse::<bool>().map_err(|_| {
                ConfigError::InvalidConfiguration(format!(
                    "{} must be true or false, got '{}'",
                    var("SANDBOX"),
                    raw
                ))
            })?,
            Err(_) => false,
        };

        Ok(Self {
            api_key: Secret::new(api_key),
            passphrase: Secret::new(passphrase),
            secret: Secret::new(secret),
            sandbox,
            rest_url: env::var(var("REST_URL")).ok(),
            ws_url: env::var(var("WS_URL")).ok(),
        })
    }

    /// Like `from_env`, but absent credentials fall back to read-only sandbox
    /// access. A present but invalid variable is still an error.
    pub fn from_env_or_read_only(prefix: &str) -> Result<Self, ConfigError> {
        match Self::from_env(prefix) {
            Err(ConfigError::MissingEnvironmentVariable(key)) => {
                tracing::info!(%key, "No credentials configured, using read-only sandbox access");
                Ok(Self::read_only().sandbox(true))
            }
            other => other,
        }
    }

    /// Create configuration from .env file and environment variables
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(prefix, ".env")
    }

    /// Create configuration from a specific .env file path
    ///
    /// A missing file is not an error; the process environment is used as-is.
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(prefix: &str, env_file_path: &str) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(_) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(prefix)
    }

    /// Configuration for public market data only
    #[must_use]
    pub fn read_only() -> Self {
        Self::new(String::new(), String::new(), String::new())
    }

    /// Check if all three credential fields are present
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.expose_secret().trim().is_empty()
            && !self.passphrase.expose_secret().trim().is_empty()
            && !self.secret.expose_secret().trim().is_empty()
    }

    /// Select the sandbox endpoints
    #[must_use]
    pub const fn sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Override the REST base URL
    #[must_use]
    pub fn rest_url(mut self, rest_url: String) -> Self {
        self.rest_url = Some(rest_url);
        self
    }

    /// Override the streaming feed URL
    #[must_use]
    pub fn ws_url(mut self, ws_url: String) -> Self {
        self.ws_url = Some(ws_url);
        self
    }

    pub fn environment(&self) -> Environment {
        if self.sandbox {
            Environment::Sandbox
        } else {
            Environment::Production
        }
    }

    /// Resolved REST base URL: explicit override, else the mode's endpoint
    pub fn resolved_rest_url(&self) -> String {
        self.rest_url
            .clone()
            .unwrap_or_else(|| self.environment().rest_url().to_string())
    }

    /// Resolved feed URL: explicit override, else the mode's endpoint
    pub fn resolved_ws_url(&self) -> String {
        self.ws_url
            .clone()
            .unwrap_or_else(|| self.environment().ws_url().to_string())
    }

    /// Get API key (use carefully - exposes secret)
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Get passphrase (use carefully - exposes secret)
    pub fn passphrase(&self) -> &str {
        self.passphrase.expose_secret()
    }

    /// Get base64 secret (use carefully - exposes secret)
    pub fn secret(&self) -> &str {
        self.secret.expose_secret()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_redacts_secrets() {
        let config = ExchangeConfig::new(
            "key".to_string(),
            "phrase".to_string(),
            "c2VjcmV0".to_string(),
        );
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("\"phrase\""));
        assert!(!json.contains("c2VjcmV0"));
        assert!(json.contains("[REDACTED]"));
    }

    #[test]
    fn test_missing_credentials_fall_back_to_read_only() {
        let config = ExchangeConfig::from_env_or_read_only("CBFEED_TEST_ABSENT").unwrap();
        assert!(!config.has_credentials());
        assert_eq!(config.environment(), Environment::Sandbox);
    }

    #[test]
    fn test_invalid_variable_is_not_masked_by_fallback() {
        env::set_var("CBFEED_TEST_BADMODE_API_KEY", "key");
        env::set_var("CBFEED_TEST_BADMODE_PASSPHRASE", "phrase");
        env::set_var("CBFEED_TEST_BADMODE_SECRET", "c2VjcmV0");
        env::set_var("CBFEED_TEST_BADMODE_SANDBOX", "yes");

        let result = ExchangeConfig::from_env_or_read_only("CBFEED_TEST_BADMODE");
        assert!(matches!(result, Err(ConfigError::InvalidConfiguration(_))));

        env::set_var("CBFEED_TEST_BADMODE_SANDBOX", "false");
        let config = ExchangeConfig::from_env_or_read_only("CBFEED_TEST_BADMODE").unwrap();
        assert!(config.has_credentials());
        assert_eq!(config.environment(), Environment::Production);
    }

    #[test]
    fn test_read_only_has_no_credentials() {
        assert!(!ExchangeConfig::read_only().has_credentials());
        let blank_passphrase =
            ExchangeConfig::new("key".to_string(), "  ".to_string(), "c2VjcmV0".to_string());
        assert!(!blank_passphrase.has_credentials());
    }

    #[test]
    fn test_mode_selects_endpoints() {
        let production = ExchangeConfig::read_only();
        let sandbox = ExchangeConfig::read_only().sandbox(true);

        assert_eq!(production.environment(), Environment::Production);
        assert_eq!(sandbox.environment(), Environment::Sandbox);
        assert_ne!(production.resolved_rest_url(), sandbox.resolved_rest_url());
        assert_ne!(production.resolved_ws_url(), sandbox.resolved_ws_url());

        let overridden = sandbox.ws_url("ws://127.0.0.1:9000".to_string());
        assert_eq!(overridden.resolved_ws_url(), "ws://127.0.0.1:9000");
    }
}
