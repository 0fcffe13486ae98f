//! Session credentials and broker endpoint.

use crate::error::{Error, Result};
use std::env;
use std::fmt;

pub const ENV_BROKER_URL: &str = "DROPWIRE_BROKER_URL";
pub const ENV_VPN: &str = "DROPWIRE_VPN";
pub const ENV_USERNAME: &str = "DROPWIRE_USERNAME";
pub const ENV_PASSWORD: &str = "DROPWIRE_PASSWORD";

const DEFAULT_URL: &str = "ws://localhost:8080";
const DEFAULT_VALUE: &str = "default";

/// Configuration handed to the transport when a session is opened
#[derive(Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Broker endpoint URL
    pub url: String,
    /// Virtual partition (message VPN) on the broker
    pub vpn_name: String,
    pub username: String,
    pub password: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            vpn_name: DEFAULT_VALUE.to_string(),
            username: DEFAULT_VALUE.to_string(),
            password: DEFAULT_VALUE.to_string(),
        }
    }
}

impl SessionConfig {
    /// Read the configuration from `DROPWIRE_*` environment variables,
    /// falling back to the defaults for anything unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            url: lookup(ENV_BROKER_URL).unwrap_or(defaults.url),
            vpn_name: lookup(ENV_VPN).unwrap_or(defaults.vpn_name),
            username: lookup(ENV_USERNAME).unwrap_or(defaults.username),
            password: lookup(ENV_PASSWORD).unwrap_or(defaults.password),
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::InvalidConfig("broker url cannot be empty".into()));
        }
        if self.vpn_name.trim().is_empty() {
            return Err(Error::InvalidConfig("vpn name cannot be empty".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("url", &self.url)
            .field("vpn_name", &self.vpn_name)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
