//! Orchestrator: the three public operations.
//!
//! Every operation follows the same sequence:
//!
//! 1. validate the configuration and build the request frame (no I/O yet)
//! 2. open a session (primary, then at most one backup attempt)
//! 3. write the frame and read the response
//! 4. close the session, whatever the outcome
//!
//! Nothing past step 2 is retried. A failure on an open session is terminal
//! even if a backup appliance is configured.

use common::protocol::{CipherBlob, BLOCK_SIZE};
use common::AkmError;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, field, info, instrument, warn, Span};
use zeroize::Zeroizing;

use crate::codec::{check_hex_blocks, decode_output, trim_block_padding};
use crate::config::AkmConfig;
use crate::key::KeyMaterial;
use crate::request::{build_decrypt_request, build_encrypt_request, build_retrieve_key_request};
use crate::response::{read_cipher_response, read_key_response, CipherResponse};
use crate::transport::{Connector, MutualTlsConnector, Service, Session, Transport};

/// Client for a remote key appliance.
///
/// Holds no connections or cached state; each call opens and closes its own
/// session, so a single client can be shared freely across tasks.
#[derive(Debug, Clone)]
pub struct AkmClient<C = MutualTlsConnector> {
    transport: Transport<C>,
}

impl AkmClient<MutualTlsConnector> {
    /// Client that connects over mutual TLS.
    pub fn new() -> Self {
        Self::with_connector(MutualTlsConnector::new())
    }
}

impl Default for AkmClient<MutualTlsConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> AkmClient<C> {
    pub fn with_connector(connector: C) -> Self {
        Self {
            transport: Transport::new(connector),
        }
    }

    /// Fetch the configured key from the appliance and return its raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AkmError::MalformedResponse`] if the key value cannot be
    /// decoded or its length does not match `key_size`, plus the validation,
    /// transport and protocol errors shared by every operation.
    #[instrument(name = "retrieve_key", skip_all, fields(key_name = %config.key_name, role = field::Empty))]
    pub async fn retrieve_key(&self, config: &AkmConfig) -> Result<KeyMaterial, AkmError> {
        let result = self.retrieve_key_inner(config).await;
        log_outcome(&result);
        result
    }

    async fn retrieve_key_inner(&self, config: &AkmConfig) -> Result<KeyMaterial, AkmError> {
        config.validate()?;
        let key = config.key_descriptor();
        let frame = build_retrieve_key_request(&key)?;

        let mut session = self.transport.open(config, Service::KeyRetrieval).await?;
        Span::current().record("role", session.target().role.as_str());
        let result = exchange_key(&mut session, &frame).await;
        session.close().await;
        let encoded = result?;

        let raw = Zeroizing::new(decode_output(&encoded, key.encoding)?);
        if raw.len() != key.key_len() {
            return Err(AkmError::MalformedResponse(format!(
                "retrieved key is {} bytes; expected {} for a {}-bit key",
                raw.len(),
                key.key_len(),
                key.key_size
            )));
        }
        Ok(KeyMaterial::new(raw))
    }

    /// Encrypt `plaintext` under the configured key.
    ///
    /// The plaintext is space-padded to the cipher block size before it is
    /// sent; [`AkmClient::decrypt`] strips that padding again.
    ///
    /// # Errors
    ///
    /// Returns [`AkmError::MalformedResponse`] if the appliance does not return
    /// hex ciphertext in whole cipher blocks (a blob [`AkmClient::decrypt`]
    /// could never accept), plus the validation, transport and protocol errors
    /// shared by every operation.
    #[instrument(
        name = "encrypt",
        skip_all,
        fields(key_name = %config.key_name, len = plaintext.len(), role = field::Empty)
    )]
    pub async fn encrypt(&self, plaintext: &[u8], config: &AkmConfig) -> Result<CipherBlob, AkmError> {
        let result = self.encrypt_inner(plaintext, config).await;
        log_outcome(&result);
        result
    }

    async fn encrypt_inner(&self, plaintext: &[u8], config: &AkmConfig) -> Result<CipherBlob, AkmError> {
        config.validate()?;
        let key = config.key_descriptor();
        let request = build_encrypt_request(&key, plaintext)?;

        let mut session = self.transport.open(config, Service::Encryption).await?;
        Span::current().record("role", session.target().role.as_str());
        let result = exchange_cipher(&mut session, &request.frame).await;
        session.close().await;
        let response = result?;

        check_hex_blocks(&response.payload, BLOCK_SIZE).map_err(|reason| {
            AkmError::MalformedResponse(format!("appliance returned undecryptable ciphertext: {reason}"))
        })?;
        Ok(CipherBlob::new(request.iv, response.instance, response.payload))
    }

    /// Decrypt a blob produced by [`AkmClient::encrypt`] (in its
    /// [`CipherBlob::to_bytes`] form).
    ///
    /// Trailing spaces are stripped from the result, so a plaintext that
    /// originally ended in spaces comes back without them.
    ///
    /// # Errors
    ///
    /// Returns [`AkmError::InvalidCiphertext`] if `blob` is not a well-formed
    /// blob, plus the validation, transport and protocol errors shared by every
    /// operation.
    #[instrument(
        name = "decrypt",
        skip_all,
        fields(key_name = %config.key_name, len = blob.len(), role = field::Empty)
    )]
    pub async fn decrypt(&self, blob: &[u8], config: &AkmConfig) -> Result<Vec<u8>, AkmError> {
        let result = self.decrypt_inner(blob, config).await;
        log_outcome(&result);
        result
    }

    async fn decrypt_inner(&self, blob: &[u8], config: &AkmConfig) -> Result<Vec<u8>, AkmError> {
        config.validate()?;
        let key = config.key_descriptor();
        let blob = CipherBlob::from_bytes(blob)?;
        let frame = build_decrypt_request(&key, &blob)?;

        let mut session = self.transport.open(config, Service::Encryption).await?;
        Span::current().record("role", session.target().role.as_str());
        let result = exchange_cipher(&mut session, &frame).await;
        session.close().await;

        let mut plaintext = result?.payload;
        let len = trim_block_padding(&plaintext).len();
        plaintext.truncate(len);
        Ok(plaintext)
    }
}

async fn exchange_cipher<S>(session: &mut Session<S>, frame: &[u8]) -> Result<CipherResponse, AkmError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    session.send(frame).await?;
    let response = read_cipher_response(session.stream_mut()).await?;
    debug!(endpoint = %session.target(), payload_len = response.payload.len(), "cipher response received");
    Ok(response)
}

async fn exchange_key<S>(session: &mut Session<S>, frame: &[u8]) -> Result<Zeroizing<Vec<u8>>, AkmError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    session.send(frame).await?;
    let value = read_key_response(session.stream_mut()).await?;
    debug!(endpoint = %session.target(), "key response received");
    Ok(value)
}

fn log_outcome<T>(result: &Result<T, AkmError>) {
    match result {
        Ok(_) => info!("operation completed"),
        Err(e) => warn!(error.kind = e.kind(), error = %e, "operation failed"),
    }
}
