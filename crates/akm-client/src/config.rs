//! Configuration loading and validation for the appliance client.
//!
//! Values come from an optional file (JSON, YAML or TOML, chosen by
//! extension) overlaid with `AKM_`-prefixed environment variables, e.g.
//! `AKM_KEY_NAME` or `AKM_PRIMARY_SERVER__HOST`. Host applications that already
//! hold the configuration as a JSON object can use [`AkmConfig::from_json_str`].
//!
//! The historical field names (`akm_host_server`, `akm_retrieve_port`, ...)
//! are accepted as aliases, and ports may be given as strings. An empty string
//! means "not set".

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use common::protocol::KEY_NAME_WIDTH;
use common::{AkmError, KeyDescriptor, KeyEncoding, KeyType};
use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::transport::Service;

/// Connection details for one key appliance.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    /// PEM file holding the client certificate chain and its private key.
    #[serde(default)]
    pub client_cert_and_key_file: PathBuf,

    /// PEM file holding the CA certificate(s) for the appliance.
    #[serde(default)]
    pub ca_cert_file: PathBuf,

    /// Appliance host name or IP address.
    #[serde(default, alias = "akm_host_server", alias = "akm_backup_server")]
    pub host: String,

    /// Port of the key retrieval service.
    #[serde(default, alias = "akm_retrieve_port", deserialize_with = "lenient_number")]
    pub retrieve_port: Option<u16>,

    /// Port of the encryption service.
    #[serde(default, alias = "akm_encrypt_port", deserialize_with = "lenient_number")]
    pub encrypt_port: Option<u16>,
}

impl ServerConfig {
    /// `true` if any field is set. A fully blank block means "not configured".
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty()
            || !self.client_cert_and_key_file.as_os_str().is_empty()
            || !self.ca_cert_file.as_os_str().is_empty()
            || self.retrieve_port.is_some()
            || self.encrypt_port.is_some()
    }

    /// Port serving `service`, if configured.
    pub fn port(&self, service: Service) -> Option<u16> {
        match service {
            Service::KeyRetrieval => self.retrieve_port,
            Service::Encryption => self.encrypt_port,
        }
        .filter(|&p| p != 0)
    }

    fn validate(&self, block: &str) -> Result<(), AkmError> {
        if self.host.trim().is_empty() {
            return Err(missing(block, "host"));
        }
        if self.client_cert_and_key_file.as_os_str().is_empty() {
            return Err(missing(block, "client_cert_and_key_file"));
        }
        if self.ca_cert_file.as_os_str().is_empty() {
            return Err(missing(block, "ca_cert_file"));
        }
        if self.port(Service::KeyRetrieval).is_none() {
            return Err(missing(block, "retrieve_port"));
        }
        if self.port(Service::Encryption).is_none() {
            return Err(missing(block, "encrypt_port"));
        }
        Ok(())
    }
}

/// Everything one operation needs: endpoints, key, and connection policy.
#[derive(Debug, Clone, Deserialize)]
pub struct AkmConfig {
    /// Appliance tried first for every operation. **Required.**
    pub primary_server: ServerConfig,

    /// Appliance tried once if the primary cannot be reached.
    #[serde(default)]
    pub backup_server: ServerConfig,

    /// Name of the appliance-held key. **Required**, at most 40 bytes.
    #[serde(default)]
    pub key_name: String,

    #[serde(default)]
    pub key_type: KeyType,

    /// Key size in bits. Defaults to the size implied by `key_type`.
    #[serde(default, deserialize_with = "lenient_number")]
    pub key_size: Option<u32>,

    /// Encoding requested for retrieved key material.
    #[serde(default)]
    pub encode: KeyEncoding,

    /// Budget for TCP connect plus TLS handshake, per endpoint.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Require the appliance certificate to match the configured host.
    #[serde(default)]
    pub verify_peer_name: bool,
}

fn default_connect_timeout_secs() -> u64 {
    30
}

impl AkmConfig {
    /// Load configuration from an optional file plus `AKM_*` environment
    /// variables, then validate it.
    ///
    /// # Errors
    ///
    /// Returns [`AkmError::Configuration`] if the sources cannot be read or
    /// deserialised, or any error from [`AkmConfig::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self, AkmError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let cfg = builder
            .add_source(
                config::Environment::with_prefix("AKM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| AkmError::Configuration(format!("failed to read configuration: {e}")))?;

        let c: AkmConfig = cfg.try_deserialize().map_err(|e| {
            AkmError::Configuration(format!("failed to deserialise configuration: {e}"))
        })?;
        c.validate()?;
        Ok(c)
    }

    /// Parse and validate a JSON configuration object.
    ///
    /// # Errors
    ///
    /// Returns [`AkmError::Configuration`] for malformed JSON, or any error from
    /// [`AkmConfig::validate`].
    pub fn from_json_str(json: &str) -> Result<Self, AkmError> {
        let c: AkmConfig = serde_json::from_str(json)
            .map_err(|e| AkmError::Configuration(format!("invalid configuration JSON: {e}")))?;
        c.validate()?;
        Ok(c)
    }

    /// Check the configuration shape. Runs before any network I/O.
    ///
    /// # Errors
    ///
    /// - [`AkmError::MissingKeyName`] if `key_name` is empty.
    /// - [`AkmError::FieldTooNarrow`] if `key_name` exceeds 40 bytes.
    /// - [`AkmError::Configuration`] for anything else.
    pub fn validate(&self) -> Result<(), AkmError> {
        if self.key_name.is_empty() {
            return Err(AkmError::MissingKeyName);
        }
        if self.key_name.len() > KEY_NAME_WIDTH {
            return Err(AkmError::FieldTooNarrow {
                field: "key name",
                width: KEY_NAME_WIDTH,
                len: self.key_name.len(),
            });
        }
        if !self.key_name.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
            return Err(AkmError::Configuration(
                "key_name must be printable ASCII".into(),
            ));
        }
        if let Some(size) = self.key_size {
            if size != self.key_type.bits() {
                return Err(AkmError::Configuration(format!(
                    "key_size {size} does not match key_type (expected {})",
                    self.key_type.bits()
                )));
            }
        }
        if self.connect_timeout_secs == 0 {
            return Err(AkmError::Configuration(
                "connect_timeout_secs must be > 0".into(),
            ));
        }

        self.primary_server.validate("primary_server")?;
        if let Some(backup) = self.backup() {
            backup.validate("backup_server")?;
        }
        Ok(())
    }

    /// The key this configuration operates on.
    pub fn key_descriptor(&self) -> KeyDescriptor {
        KeyDescriptor {
            name: self.key_name.clone(),
            key_type: self.key_type,
            key_size: self.key_size.unwrap_or_else(|| self.key_type.bits()),
            encoding: self.encode,
        }
    }

    /// The backup appliance, or `None` if its block is blank.
    pub fn backup(&self) -> Option<&ServerConfig> {
        self.backup_server
            .is_configured()
            .then_some(&self.backup_server)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn missing(block: &str, field: &str) -> AkmError {
    AkmError::Configuration(format!("{block}.{field} is required and must not be empty"))
}

/// Accept a number, a numeric string, or an empty string (as `None`).
fn lenient_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + TryFrom<u64>,
    <T as FromStr>::Err: fmt::Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => T::try_from(n)
            .map(Some)
            .map_err(|_| de::Error::custom(format!("{n} is out of range"))),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| de::Error::custom(format!("invalid number {s:?}: {e}"))),
    }
}
