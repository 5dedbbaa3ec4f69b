//! Transport connector: mutually authenticated sessions with primary → backup fallback.
//!
//! # Fallback policy
//!
//! ```text
//! open()
//!   ├─ primary  ──ok──► Session
//!   └─ fail/timeout
//!        ├─ no backup configured ──► ConnectFailure
//!        └─ backup ──ok──► Session
//!                  └─ fail/timeout ──► ConnectFailure
//! ```
//!
//! Each endpoint is attempted exactly once per operation. There is no pooling:
//! every operation performs a full handshake and re-reads its certificate files.

pub mod tls;

pub use tls::MutualTlsConnector;

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use common::AkmError;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use crate::config::{AkmConfig, ServerConfig};

/// Which configured appliance a connection targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    Backup,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Primary => "primary",
            Role::Backup => "backup",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Appliance service an operation talks to; selects the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Key retrieval, served on `retrieve_port`.
    KeyRetrieval,
    /// Remote encryption and decryption, served on `encrypt_port`.
    Encryption,
}

/// A fully resolved connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub role: Role,
    pub host: String,
    pub port: u16,
    /// PEM file holding the client certificate chain and its private key.
    pub client_cert_and_key_file: PathBuf,
    /// PEM file holding the CA certificate(s) that sign the appliance certificate.
    pub ca_cert_file: PathBuf,
    /// Whether the appliance certificate must also match `host`.
    pub verify_peer_name: bool,
}

impl Target {
    fn resolve(
        role: Role,
        server: &ServerConfig,
        service: Service,
        verify_peer_name: bool,
    ) -> Result<Self, TransportError> {
        let port = server.port(service).ok_or(TransportError::MissingPort(service))?;
        Ok(Self {
            role,
            host: server.host.trim().to_owned(),
            port,
            client_cert_and_key_file: server.client_cert_and_key_file.clone(),
            ca_cert_file: server.ca_cert_file.clone(),
            verify_peer_name,
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}", self.role, self.host, self.port)
    }
}

/// Failure of a single connection attempt to one endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no port configured for {0:?}")]
    MissingPort(Service),

    #[error("TLS credentials unusable: {0}")]
    Credentials(String),

    #[error("invalid appliance host {0:?}")]
    InvalidHost(String),

    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Opens an authenticated byte stream to one endpoint.
///
/// [`MutualTlsConnector`] is the production implementation; tests substitute
/// in-memory streams.
#[cfg_attr(test, mockall::automock(type Stream = tokio::io::DuplexStream;))]
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    async fn connect(&self, target: &Target) -> Result<Self::Stream, TransportError>;
}

/// A single-use stream to one appliance, owned by one operation.
pub struct Session<S> {
    stream: S,
    target: Target,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn new(stream: S, target: Target) -> Self {
        Self { stream, target }
    }

    /// The endpoint this session is connected to.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Write a complete request frame.
    pub async fn send(&mut self, frame: &[u8]) -> Result<(), AkmError> {
        self.stream.write_all(frame).await?;
        self.stream.flush().await?;
        debug!(endpoint = %self.target, bytes = frame.len(), "request sent");
        Ok(())
    }

    /// Readable half of the session for the response reader.
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Shut the stream down. Failures are logged, never surfaced: by the time
    /// a session is closed the operation's outcome is already decided.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(endpoint = %self.target, error = %e, "session shutdown failed");
        }
    }
}

/// Opens sessions using a [`Connector`], applying the connect timeout and the
/// primary → backup fallback.
#[derive(Debug, Clone, Default)]
pub struct Transport<C> {
    connector: C,
}

impl<C: Connector> Transport<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    /// Open a session for `service`, falling back to the backup appliance once.
    ///
    /// # Errors
    ///
    /// Returns [`AkmError::ConnectFailure`] if the primary fails and the backup
    /// is either not configured or also fails.
    pub async fn open(
        &self,
        config: &AkmConfig,
        service: Service,
    ) -> Result<Session<C::Stream>, AkmError> {
        let timeout = config.connect_timeout();

        let primary_err = match self
            .attempt(Role::Primary, &config.primary_server, service, config, timeout)
            .await
        {
            Ok(session) => return Ok(session),
            Err(e) => e,
        };
        warn!(
            host = %config.primary_server.host,
            ?service,
            error = %primary_err,
            "primary key appliance unavailable"
        );

        let Some(backup) = config.backup() else {
            error!(?service, "no backup key appliance configured");
            return Err(AkmError::ConnectFailure {
                primary: primary_err.to_string(),
                backup: None,
            });
        };

        match self
            .attempt(Role::Backup, backup, service, config, timeout)
            .await
        {
            Ok(session) => {
                info!(
                    endpoint = %session.target(),
                    "primary key appliance not reachable; using backup"
                );
                Ok(session)
            }
            Err(backup_err) => {
                error!(
                    host = %backup.host,
                    ?service,
                    error = %backup_err,
                    "backup key appliance unavailable"
                );
                Err(AkmError::ConnectFailure {
                    primary: primary_err.to_string(),
                    backup: Some(backup_err.to_string()),
                })
            }
        }
    }

    async fn attempt(
        &self,
        role: Role,
        server: &ServerConfig,
        service: Service,
        config: &AkmConfig,
        timeout: Duration,
    ) -> Result<Session<C::Stream>, TransportError> {
        let target = Target::resolve(role, server, service, config.verify_peer_name)?;
        debug!(endpoint = %target, "connecting to key appliance");
        match tokio::time::timeout(timeout, self.connector.connect(&target)).await {
            Ok(Ok(stream)) => Ok(Session::new(stream, target)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }
}
