//! Configuration file handling for smtphook.

use crate::data::received::Location;
use serde::{Deserialize, Deserializer};
use std::path::Path;

/// Engine and listener configuration.
///
/// Every session holds a shared reference to this value and reads its
/// protocol settings from it.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "Config::default_hostname")]
    pub hostname: String,
    #[serde(default = "Config::default_software_name")]
    pub software_name: String,
    #[serde(default)]
    pub greeting: Option<String>,
    #[serde(default = "Config::default_listen_address")]
    pub listen_address: String,
    #[serde(default = "Config::default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "Config::default_true")]
    pub helo_ehlo_enforcement: bool,
    #[serde(default = "Config::default_true")]
    pub address_bracket_enforcement: bool,
    #[serde(default = "Config::default_hostname")]
    pub default_domain: String,
    #[serde(default, deserialize_with = "deserialize_sequence")]
    pub local_domains: Vec<String>,
    #[serde(default)]
    pub relaying_allowed: bool,
    /// Whether sessions advertise authentication support to clients.
    #[serde(default)]
    pub auth_announce: bool,
    #[serde(default = "Config::default_true")]
    pub use_virtual_hosting: bool,
    /// Maximum message size in bytes, 0 disables the limit.
    #[serde(default = "Config::default_max_message_size")]
    pub max_message_size: usize,
    #[serde(default)]
    pub max_sender_messages_per_minute: Option<u32>,
    #[serde(default)]
    pub received_header_location: Location,
    #[serde(default = "Config::default_hostname")]
    pub reinject_host: String,
    #[serde(default = "Config::default_reinject_port")]
    pub reinject_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
struct ConfigWrapper {
    // All engine settings live under the `smtp` section.
    pub smtp: Config,
}

/// Custom deserializer to parse space-separated strings into [`Vec<String>`].
fn deserialize_sequence<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Deserialize::deserialize(deserializer)?;
    Ok(match s {
        Some(v) => v
            .split(' ')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        None => Vec::new(),
    })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: Self::default_hostname(),
            software_name: Self::default_software_name(),
            greeting: None,
            listen_address: Self::default_listen_address(),
            listen_port: Self::default_listen_port(),
            helo_ehlo_enforcement: true,
            address_bracket_enforcement: true,
            default_domain: Self::default_hostname(),
            local_domains: Vec::new(),
            relaying_allowed: false,
            auth_announce: false,
            use_virtual_hosting: true,
            max_message_size: Self::default_max_message_size(),
            max_sender_messages_per_minute: None,
            received_header_location: Location::default(),
            reinject_host: Self::default_hostname(),
            reinject_port: Self::default_reinject_port(),
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, crate::error::Error> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ini(&content)
    }

    /// Parse configuration from the contents of an INI file.
    pub fn from_ini(content: &str) -> Result<Self, crate::error::Error> {
        let wrapped_config: ConfigWrapper = serini::from_str(content)?;
        Ok(wrapped_config.smtp)
    }

    /// Text sent after the code in the initial `220` greeting.
    pub fn greeting(&self) -> String {
        match &self.greeting {
            Some(greeting) => greeting.clone(),
            None => format!("ESMTP {} ready", self.software_name),
        }
    }

    /// Check if the domain is handled locally.
    pub fn is_local_domain(&self, domain: &str) -> bool {
        self.local_domains
            .iter()
            .any(|local| local.eq_ignore_ascii_case(domain))
    }

    // Following are needed since serde does not support default literals.

    fn default_hostname() -> String {
        "localhost".to_string()
    }
    fn default_software_name() -> String {
        concat!("smtphook ", env!("CARGO_PKG_VERSION")).to_string()
    }
    fn default_listen_address() -> String {
        "127.0.0.1".to_string()
    }
    const fn default_listen_port() -> u16 {
        2525
    }
    const fn default_true() -> bool {
        true
    }
    const fn default_max_message_size() -> usize {
        31457280
    }
    const fn default_reinject_port() -> u16 {
        10025
    }
}
