//! Client for a remote key-management appliance.
//!
//! Three operations are exposed through [`AkmClient`]:
//!
//! - [`AkmClient::retrieve_key`] fetches a named key's raw bytes
//! - [`AkmClient::encrypt`] encrypts data on the appliance and returns an
//!   opaque [`CipherBlob`]
//! - [`AkmClient::decrypt`] turns such a blob back into plaintext
//!
//! Each call opens a fresh mutually authenticated TLS session to the primary
//! appliance, falling back to the backup exactly once, and speaks the
//! appliance's fixed-width ASCII protocol over it.
//!
//! ```no_run
//! # async fn run() -> Result<(), common::AkmError> {
//! use akm_client::{AkmClient, AkmConfig};
//!
//! let config = AkmConfig::load(Some("/etc/akm/client.yaml".as_ref()))?;
//! let client = AkmClient::new();
//! let blob = client.encrypt(b"4111111111111111", &config).await?;
//! let plaintext = client.decrypt(&blob.to_bytes(), &config).await?;
//! assert_eq!(plaintext, b"4111111111111111");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod key;
pub mod request;
pub mod response;
pub mod transport;

pub use client::AkmClient;
pub use common::{AkmError, CipherBlob, KeyDescriptor, KeyEncoding, KeyType};
pub use config::{AkmConfig, ServerConfig};
pub use key::KeyMaterial;
pub use transport::{Connector, MutualTlsConnector};
