//! Response reader: length-prefixed reads and fixed-offset decoding.
//!
//! Every response starts with a 5-digit ASCII length giving the size of the
//! body that follows. Cipher responses carry a 39-byte header in that body and
//! then stream the variable-length payload separately:
//!
//! ```text
//! len(5) | cmd(4) status(4) flags(2) payload-len(5) instance(24) | payload(payload-len)
//! ```
//!
//! Key retrieval responses are a single body whose key value starts at byte 95.

use std::io;

use common::protocol::{
    CIPHER_HEADER_LEN, FLAGS_OFFSET, INSTANCE_OFFSET, INSTANCE_WIDTH, KEY_VALUE_OFFSET,
    LENGTH_FIELD_WIDTH, PAYLOAD_LENGTH_OFFSET, STATUS_OFFSET, STATUS_OK, STATUS_WIDTH,
};
use common::AkmError;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;
use zeroize::Zeroizing;

use crate::codec::parse_decimal;

/// Decoded encrypt or decrypt response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherResponse {
    /// Two flag bytes from the header, passed through undecoded.
    pub flags: [u8; 2],
    /// Instance identifier assigned by the appliance.
    pub instance: [u8; INSTANCE_WIDTH],
    /// Hex ciphertext (encrypt) or padded plaintext (decrypt).
    pub payload: Vec<u8>,
}

/// Read the 5-digit length prefix that opens every response.
///
/// # Errors
///
/// - [`AkmError::NoResponse`] if the stream ends before any byte arrives, or
///   the prefix is not five decimal digits.
/// - [`AkmError::TruncatedResponse`] if the stream ends part-way through the prefix.
pub async fn read_length_prefix<R>(reader: &mut R) -> Result<usize, AkmError>
where
    R: AsyncRead + Unpin,
{
    let prefix = read_up_to(reader, LENGTH_FIELD_WIDTH).await?;
    if prefix.is_empty() {
        return Err(AkmError::NoResponse);
    }
    if prefix.len() < LENGTH_FIELD_WIDTH {
        return Err(AkmError::TruncatedResponse {
            expected: LENGTH_FIELD_WIDTH,
            received: prefix.len(),
        });
    }
    parse_decimal(&prefix).ok_or(AkmError::NoResponse)
}

/// Read exactly `len` bytes, failing rather than returning a partial value.
///
/// # Errors
///
/// Returns [`AkmError::TruncatedResponse`] if the stream ends early.
pub async fn read_exact_field<R>(reader: &mut R, len: usize) -> Result<Vec<u8>, AkmError>
where
    R: AsyncRead + Unpin,
{
    let buf = read_up_to(reader, len).await?;
    if buf.len() < len {
        return Err(AkmError::TruncatedResponse {
            expected: len,
            received: buf.len(),
        });
    }
    Ok(buf)
}

/// Read and decode a two-stage encrypt or decrypt response.
pub async fn read_cipher_response<R>(reader: &mut R) -> Result<CipherResponse, AkmError>
where
    R: AsyncRead + Unpin,
{
    let len = read_length_prefix(reader).await?;
    let header = read_exact_field(reader, len).await?;
    check_status(&header)?;
    if header.len() < CIPHER_HEADER_LEN {
        return Err(AkmError::MalformedResponse(format!(
            "cipher response header is {} bytes; expected {CIPHER_HEADER_LEN}",
            header.len()
        )));
    }

    let payload_len = parse_decimal(&header[PAYLOAD_LENGTH_OFFSET..INSTANCE_OFFSET])
        .ok_or_else(|| AkmError::MalformedResponse("payload length is not decimal".into()))?;

    let mut flags = [0u8; 2];
    flags.copy_from_slice(&header[FLAGS_OFFSET..PAYLOAD_LENGTH_OFFSET]);
    let mut instance = [0u8; INSTANCE_WIDTH];
    instance.copy_from_slice(&header[INSTANCE_OFFSET..CIPHER_HEADER_LEN]);

    debug!(header_len = len, payload_len, "reading cipher payload");
    let payload = read_exact_field(reader, payload_len).await?;

    Ok(CipherResponse {
        flags,
        instance,
        payload,
    })
}

/// Read a key retrieval response and return the still-encoded key value.
pub async fn read_key_response<R>(reader: &mut R) -> Result<Zeroizing<Vec<u8>>, AkmError>
where
    R: AsyncRead + Unpin,
{
    let len = read_length_prefix(reader).await?;
    let body = Zeroizing::new(read_exact_field(reader, len).await?);
    check_status(&body)?;
    if body.len() < KEY_VALUE_OFFSET {
        return Err(AkmError::MalformedResponse(format!(
            "key response is {} bytes; key value starts at byte {KEY_VALUE_OFFSET}",
            body.len()
        )));
    }
    Ok(Zeroizing::new(body[KEY_VALUE_OFFSET..].to_vec()))
}

fn check_status(body: &[u8]) -> Result<(), AkmError> {
    let status = body
        .get(STATUS_OFFSET..STATUS_OFFSET + STATUS_WIDTH)
        .ok_or_else(|| {
            AkmError::MalformedResponse(format!(
                "response is {} bytes; too short to carry a status",
                body.len()
            ))
        })?;
    if status != STATUS_OK {
        return Err(AkmError::ApplianceRejected {
            status: String::from_utf8_lossy(status).into_owned(),
        });
    }
    Ok(())
}

/// Fill up to `len` bytes, stopping early only at end-of-stream.
async fn read_up_to<R>(reader: &mut R, len: usize) -> Result<Vec<u8>, AkmError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            // rustls reports a peer that hangs up without close_notify this way.
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(AkmError::Io(e)),
        }
    }
    buf.truncate(filled);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    const INSTANCE: &[u8; 24] = b"INSTANCE-000000000000042";

    fn cipher_body(status: &[u8; 4], payload_len: &str) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(b"2019");
        body.extend_from_slice(status);
        body.extend_from_slice(b"  ");
        body.extend_from_slice(payload_len.as_bytes());
        body.extend_from_slice(INSTANCE);
        body
    }

    #[tokio::test]
    async fn length_prefix_parses() {
        let mut input: &[u8] = b"00039rest";
        assert_eq!(read_length_prefix(&mut input).await.unwrap(), 39);
    }

    #[tokio::test]
    async fn empty_stream_is_no_response() {
        let mut input: &[u8] = b"";
        assert!(matches!(
            read_length_prefix(&mut input).await,
            Err(AkmError::NoResponse)
        ));
    }

    #[tokio::test]
    async fn non_numeric_prefix_is_no_response() {
        let mut input: &[u8] = b"ERROR";
        assert!(matches!(
            read_length_prefix(&mut input).await,
            Err(AkmError::NoResponse)
        ));
    }

    #[tokio::test]
    async fn partial_prefix_is_truncated() {
        let mut input: &[u8] = b"000";
        assert!(matches!(
            read_length_prefix(&mut input).await,
            Err(AkmError::TruncatedResponse { expected: 5, received: 3 })
        ));
    }

    #[tokio::test]
    async fn short_body_is_truncated() {
        let mut input: &[u8] = b"00039only-ten-b";
        assert!(matches!(
            read_cipher_response(&mut input).await,
            Err(AkmError::TruncatedResponse { expected: 39, received: 10 })
        ));
    }

    #[tokio::test]
    async fn cipher_response_two_stage_read() {
        let mut wire = b"00039".to_vec();
        wire.extend_from_slice(&cipher_body(b"0000", "00032"));
        wire.extend_from_slice(b"00112233445566778899aabbccddeeff");
        let mut input: &[u8] = &wire;

        let rsp = read_cipher_response(&mut input).await.unwrap();
        assert_eq!(&rsp.instance, INSTANCE);
        assert_eq!(rsp.payload, b"00112233445566778899aabbccddeeff");
        assert_eq!(&rsp.flags, b"  ");
        assert!(input.is_empty());
    }

    #[tokio::test]
    async fn cipher_payload_arriving_in_pieces() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            server.write_all(b"00").await.unwrap();
            server.write_all(b"039").await.unwrap();
            server.write_all(&cipher_body(b"0000", "00016")).await.unwrap();
            server.write_all(b"0011223344").await.unwrap();
            server.write_all(b"556677").await.unwrap();
        });
        let rsp = read_cipher_response(&mut client).await.unwrap();
        writer.await.unwrap();
        assert_eq!(rsp.payload, b"0011223344556677");
    }

    #[tokio::test]
    async fn short_payload_is_truncated() {
        let mut wire = b"00039".to_vec();
        wire.extend_from_slice(&cipher_body(b"0000", "00032"));
        wire.extend_from_slice(b"0011");
        let mut input: &[u8] = &wire;
        assert!(matches!(
            read_cipher_response(&mut input).await,
            Err(AkmError::TruncatedResponse { expected: 32, received: 4 })
        ));
    }

    #[tokio::test]
    async fn non_zero_status_is_rejected() {
        let mut wire = b"00039".to_vec();
        wire.extend_from_slice(&cipher_body(b"0011", "00000"));
        let mut input: &[u8] = &wire;
        match read_cipher_response(&mut input).await {
            Err(AkmError::ApplianceRejected { status }) => assert_eq!(status, "0011"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_payload_length_is_malformed() {
        let mut wire = b"00039".to_vec();
        wire.extend_from_slice(&cipher_body(b"0000", "00x32"));
        let mut input: &[u8] = &wire;
        assert!(matches!(
            read_cipher_response(&mut input).await,
            Err(AkmError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn short_header_is_malformed() {
        let mut input: &[u8] = b"00010200100000000";
        assert!(matches!(
            read_cipher_response(&mut input).await,
            Err(AkmError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn key_response_returns_tail() {
        let mut body = b"20010000".to_vec();
        body.resize(KEY_VALUE_OFFSET, b' ');
        body.extend_from_slice(b"c2VjcmV0");
        let mut wire = format!("{:05}", body.len()).into_bytes();
        wire.extend_from_slice(&body);
        let mut input: &[u8] = &wire;

        let value = read_key_response(&mut input).await.unwrap();
        assert_eq!(&value[..], b"c2VjcmV0");
    }

    #[tokio::test]
    async fn key_response_shorter_than_offset_is_malformed() {
        let mut input: &[u8] = b"0001020010000xx";
        assert!(matches!(
            read_key_response(&mut input).await,
            Err(AkmError::MalformedResponse(_))
        ));
    }
}
