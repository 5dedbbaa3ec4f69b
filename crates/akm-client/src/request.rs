//! Request builder: assembles the exact byte frames sent to the appliance.
//!
//! # Frame layouts
//!
//! ```text
//! encrypt:  preamble(14) len(5) flags(4) iv(16) key(40) instance(24) padded-plaintext
//! decrypt:  preamble(14) len(5) flags(7) iv(16) key(40) instance(24) hex-ciphertext
//! retrieve: preamble(9)  key(40) instance(24) encoding(3)
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use common::protocol::{
    BLOCK_SIZE, DECRYPT_FLAGS, DECRYPT_PREAMBLE, ENCRYPT_FLAGS, ENCRYPT_PREAMBLE, INSTANCE_WIDTH,
    IV_LEN, KEY_NAME_WIDTH, LENGTH_FIELD_WIDTH, RETRIEVE_PREAMBLE,
};
use common::{AkmError, CipherBlob, KeyDescriptor};

use crate::codec::{block_pad, check_hex_blocks, decimal_length, pad_field, random_iv};

/// A framed encrypt request together with the IV it carries.
///
/// The IV is needed again to assemble the [`CipherBlob`] once the appliance
/// responds.
#[derive(Debug, Clone)]
pub struct EncryptRequest {
    pub iv: [u8; IV_LEN],
    pub frame: Bytes,
}

/// Build an encrypt request with a fresh random IV.
///
/// # Errors
///
/// Returns [`AkmError::MissingKeyName`] or [`AkmError::FieldTooNarrow`] for a
/// bad key name, and [`AkmError::OutOfRange`] if the padded plaintext is too
/// long for the 5-digit length field.
pub fn build_encrypt_request(
    key: &KeyDescriptor,
    plaintext: &[u8],
) -> Result<EncryptRequest, AkmError> {
    build_encrypt_request_with_iv(key, plaintext, random_iv())
}

pub(crate) fn build_encrypt_request_with_iv(
    key: &KeyDescriptor,
    plaintext: &[u8],
    iv: [u8; IV_LEN],
) -> Result<EncryptRequest, AkmError> {
    let key_field = key_name_field(key)?;

    // An empty payload still occupies one full block.
    let padded = if plaintext.is_empty() {
        vec![b' '; BLOCK_SIZE]
    } else {
        block_pad(plaintext, BLOCK_SIZE)
    };
    let length = decimal_length(padded.len(), LENGTH_FIELD_WIDTH)?;

    let mut frame = BytesMut::with_capacity(
        ENCRYPT_PREAMBLE.len()
            + LENGTH_FIELD_WIDTH
            + ENCRYPT_FLAGS.len()
            + IV_LEN
            + KEY_NAME_WIDTH
            + INSTANCE_WIDTH
            + padded.len(),
    );
    frame.put_slice(ENCRYPT_PREAMBLE);
    frame.put_slice(&length);
    frame.put_slice(ENCRYPT_FLAGS);
    frame.put_slice(&iv);
    frame.put_slice(&key_field);
    frame.put_bytes(b' ', INSTANCE_WIDTH);
    frame.put_slice(&padded);

    Ok(EncryptRequest {
        iv,
        frame: frame.freeze(),
    })
}

/// Build a decrypt request from a blob produced by a prior encrypt call.
///
/// The IV and instance are echoed back exactly as the blob carries them.
///
/// # Errors
///
/// Returns [`AkmError::InvalidCiphertext`] if the blob's ciphertext is not
/// block-aligned hex, plus the key-name and length errors of
/// [`build_encrypt_request`].
pub fn build_decrypt_request(key: &KeyDescriptor, blob: &CipherBlob) -> Result<Bytes, AkmError> {
    let key_field = key_name_field(key)?;
    let ciphertext = blob.ciphertext();
    check_hex_blocks(ciphertext, BLOCK_SIZE).map_err(AkmError::InvalidCiphertext)?;
    let length = decimal_length(ciphertext.len(), LENGTH_FIELD_WIDTH)?;

    let mut frame = BytesMut::with_capacity(
        DECRYPT_PREAMBLE.len()
            + LENGTH_FIELD_WIDTH
            + DECRYPT_FLAGS.len()
            + IV_LEN
            + KEY_NAME_WIDTH
            + INSTANCE_WIDTH
            + ciphertext.len(),
    );
    frame.put_slice(DECRYPT_PREAMBLE);
    frame.put_slice(&length);
    frame.put_slice(DECRYPT_FLAGS);
    frame.put_slice(blob.iv());
    frame.put_slice(&key_field);
    frame.put_slice(blob.instance());
    frame.put_slice(ciphertext);

    Ok(frame.freeze())
}

/// Build a key retrieval request.
///
/// # Errors
///
/// Returns [`AkmError::MissingKeyName`] or [`AkmError::FieldTooNarrow`] for a
/// bad key name.
pub fn build_retrieve_key_request(key: &KeyDescriptor) -> Result<Bytes, AkmError> {
    let key_field = key_name_field(key)?;
    let tag = key.encoding.wire_tag();

    let mut frame = BytesMut::with_capacity(
        RETRIEVE_PREAMBLE.len() + KEY_NAME_WIDTH + INSTANCE_WIDTH + tag.len(),
    );
    frame.put_slice(RETRIEVE_PREAMBLE);
    frame.put_slice(&key_field);
    frame.put_bytes(b' ', INSTANCE_WIDTH);
    frame.put_slice(tag);

    Ok(frame.freeze())
}

fn key_name_field(key: &KeyDescriptor) -> Result<Vec<u8>, AkmError> {
    if key.name.is_empty() {
        return Err(AkmError::MissingKeyName);
    }
    pad_field("key name", key.name.as_bytes(), KEY_NAME_WIDTH)
}
