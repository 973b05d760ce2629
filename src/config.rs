//! Configuration types for the shop SOAP service.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SoapError};
use crate::ticket::{CertificateChain, KeyMaterial, TicketEncoder};

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopConfig {
    /// Config version
    pub version: String,

    /// HTTP listener settings
    pub server: ServerConfig,

    /// Request handling settings
    pub service: ServiceConfig,

    /// AES key material
    pub keys: KeysConfig,

    /// Binary artifacts loaded at startup
    pub templates: TemplatesConfig,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            server: ServerConfig::default(),
            service: ServiceConfig::default(),
            keys: KeysConfig::default(),
            templates: TemplatesConfig::default(),
        }
    }
}

impl ShopConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| SoapError::ConfigurationFatal(e.to_string()))
    }

    /// Build the ticket encoder. Any failure here is fatal for the process.
    pub fn load_encoder(&self) -> Result<TicketEncoder> {
        let keys = KeyMaterial::from_hex(&self.keys.common_key, &self.keys.content_key)?;
        let template = read_artifact(&self.templates.ticket_template)?;
        let certs = CertificateChain::new(read_artifact(&self.templates.cert_chain)?)?;
        TicketEncoder::new(&template, keys, certs)
    }

    /// Permitted serial numbers, or `None` when whitelisting is off.
    pub fn load_whitelist(&self) -> Result<Option<Whitelist>> {
        if !self.service.whitelist_enabled {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.service.whitelist_path).map_err(|e| {
            SoapError::ConfigurationFatal(format!(
                "cannot read whitelist {}: {}",
                self.service.whitelist_path.display(),
                e
            ))
        })?;
        Ok(Some(Whitelist::parse(&text)))
    }
}

fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        SoapError::ConfigurationFatal(format!("cannot read {}: {}", path.display(), e))
    })
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind
    pub address: String,

    /// Public host the console reaches services under
    /// (`ecs.<base_url>`, `ias.<base_url>`, ...)
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
            base_url: "shop.example.com".to_string(),
        }
    }
}

/// Request handling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Maximum request body size (bytes)
    pub max_body_size: usize,

    /// Only allow registration of whitelisted serial numbers
    pub whitelist_enabled: bool,

    /// One serial number per line
    pub whitelist_path: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_body_size: 65_536, // 64KB
            whitelist_enabled: false,
            whitelist_path: PathBuf::from("whitelist.txt"),
        }
    }
}

/// Hex-encoded AES-128 keys.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KeysConfig {
    /// Console common key
    pub common_key: String,

    /// Shared content key every title key is derived from
    pub content_key: String,
}

/// Paths of the binary ticket artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Fixed-size ticket template
    pub ticket_template: PathBuf,

    /// Certificate chain shipped after every ticket
    pub cert_chain: PathBuf,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            ticket_template: PathBuf::from("templates/ticket.bin"),
            cert_chain: PathBuf::from("templates/certs.bin"),
        }
    }
}

/// Serial numbers allowed to register.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    serials: HashSet<String>,
}

impl Whitelist {
    pub fn parse(text: &str) -> Self {
        Self {
            serials: text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    pub fn contains(&self, serial: &str) -> bool {
        self.serials.contains(serial)
    }
}
