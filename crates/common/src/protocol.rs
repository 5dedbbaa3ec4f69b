//! Wire constants and value types for the key appliance protocol.
//!
//! Every request and response is ASCII framed with fixed-width fields. No field
//! describes itself beyond its declared width, so the constants in this module
//! are a compatibility contract with the appliance: changing any of them
//! silently corrupts data rather than producing a visible error.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AkmError;

// ---------------------------------------------------------------------------
// Field widths
// ---------------------------------------------------------------------------

/// Width of every decimal length field on the wire.
pub const LENGTH_FIELD_WIDTH: usize = 5;

/// Width of the left-justified, space-padded key name field.
pub const KEY_NAME_WIDTH: usize = 40;

/// Width of the instance identifier slot.
pub const INSTANCE_WIDTH: usize = 24;

/// Length of the initialisation vector sent with every encrypt request.
pub const IV_LEN: usize = 16;

/// Plaintext sent for encryption is padded to a multiple of this size.
pub const BLOCK_SIZE: usize = 16;

/// Width of the key encoding tag on key retrieval requests.
pub const ENCODING_TAG_WIDTH: usize = 3;

// ---------------------------------------------------------------------------
// Request constants (opaque, preserved byte-for-byte)
// ---------------------------------------------------------------------------

/// Encrypt request preamble: version, operation code, and format flags.
pub const ENCRYPT_PREAMBLE: &[u8; 14] = b"000982019YNB16";

/// Encrypt operation flags, sent after the payload length.
pub const ENCRYPT_FLAGS: &[u8; 4] = b"YNYY";

/// Decrypt request preamble.
pub const DECRYPT_PREAMBLE: &[u8; 14] = b"001012021YNB16";

/// Decrypt operation flags, sent after the ciphertext length.
pub const DECRYPT_FLAGS: &[u8; 7] = b"BINYNYY";

/// Key retrieval preamble, including the `2001` secondary command code.
pub const RETRIEVE_PREAMBLE: &[u8; 9] = b"000712001";

// ---------------------------------------------------------------------------
// Response layout
// ---------------------------------------------------------------------------

/// Status code returned by the appliance on success.
pub const STATUS_OK: &[u8; 4] = b"0000";

/// Offset of the status code within a response body.
pub const STATUS_OFFSET: usize = 4;

/// Width of the status code.
pub const STATUS_WIDTH: usize = 4;

/// Offset of the two flag bytes within a cipher response header.
pub const FLAGS_OFFSET: usize = 8;

/// Offset of the payload length field within a cipher response header.
pub const PAYLOAD_LENGTH_OFFSET: usize = 10;

/// Offset of the instance identifier within a cipher response header.
pub const INSTANCE_OFFSET: usize = 15;

/// Length of the fixed header that precedes the streamed cipher payload.
pub const CIPHER_HEADER_LEN: usize = INSTANCE_OFFSET + INSTANCE_WIDTH;

/// Offset of the key value within a key retrieval response body.
pub const KEY_VALUE_OFFSET: usize = 95;

// ---------------------------------------------------------------------------
// Key descriptor
// ---------------------------------------------------------------------------

/// Encoding in which the appliance returns key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum KeyEncoding {
    /// Raw binary.
    #[serde(rename = "BIN")]
    Binary,
    /// Standard base64.
    #[serde(rename = "B64")]
    #[default]
    Base64,
    /// Hexadecimal (base16).
    #[serde(rename = "B16")]
    Hex,
}

impl KeyEncoding {
    /// The 3-byte tag carried on key retrieval requests.
    pub fn wire_tag(&self) -> &'static [u8; ENCODING_TAG_WIDTH] {
        match self {
            Self::Binary => b"BIN",
            Self::Base64 => b"B64",
            Self::Hex => b"B16",
        }
    }
}

impl fmt::Display for KeyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Tags are ASCII by construction.
        f.write_str(std::str::from_utf8(self.wire_tag()).unwrap_or("???"))
    }
}

impl FromStr for KeyEncoding {
    type Err = AkmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BIN" => Ok(Self::Binary),
            "B64" => Ok(Self::Base64),
            "B16" => Ok(Self::Hex),
            other => Err(AkmError::Configuration(format!(
                "unsupported key encoding {other:?} (expected BIN, B64 or B16)"
            ))),
        }
    }
}

/// Key algorithm. The appliance protocol only carries AES-256 keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum KeyType {
    #[serde(rename = "AES-256")]
    #[default]
    Aes256,
}

impl KeyType {
    /// Key size in bits implied by the algorithm.
    pub fn bits(&self) -> u32 {
        match self {
            Self::Aes256 => 256,
        }
    }
}

/// Identifies the appliance-held key an operation runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescriptor {
    /// Key name as registered on the appliance (at most [`KEY_NAME_WIDTH`] bytes).
    pub name: String,
    /// Key algorithm.
    pub key_type: KeyType,
    /// Key size in bits.
    pub key_size: u32,
    /// Encoding requested for retrieved key material.
    pub encoding: KeyEncoding,
}

impl KeyDescriptor {
    /// Construct a descriptor for an AES-256 key.
    pub fn aes256(name: impl Into<String>, encoding: KeyEncoding) -> Self {
        Self {
            name: name.into(),
            key_type: KeyType::Aes256,
            key_size: KeyType::Aes256.bits(),
            encoding,
        }
    }

    /// Number of raw key bytes a retrieval should yield.
    pub fn key_len(&self) -> usize {
        (self.key_size / 8) as usize
    }
}

// ---------------------------------------------------------------------------
// Ciphertext blob
// ---------------------------------------------------------------------------

/// The opaque `{IV ‖ instance ‖ hex ciphertext}` triple produced by encrypt
/// and consumed by decrypt.
///
/// This is the only artefact callers persist; its byte layout must round-trip
/// exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherBlob {
    iv: [u8; IV_LEN],
    instance: [u8; INSTANCE_WIDTH],
    ciphertext: Vec<u8>,
}

impl CipherBlob {
    /// Byte offset at which the ciphertext starts.
    pub const HEADER_LEN: usize = IV_LEN + INSTANCE_WIDTH;

    /// Assemble a blob from its parts.
    pub fn new(iv: [u8; IV_LEN], instance: [u8; INSTANCE_WIDTH], ciphertext: Vec<u8>) -> Self {
        Self {
            iv,
            instance,
            ciphertext,
        }
    }

    /// Split a persisted blob back into its parts.
    ///
    /// # Errors
    ///
    /// Returns [`AkmError::InvalidCiphertext`] if `bytes` is too short to hold
    /// an IV, an instance, and at least one byte of ciphertext.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AkmError> {
        if bytes.len() <= Self::HEADER_LEN {
            return Err(AkmError::InvalidCiphertext(format!(
                "blob is {} bytes; at least {} required",
                bytes.len(),
                Self::HEADER_LEN + 1
            )));
        }
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&bytes[..IV_LEN]);
        let mut instance = [0u8; INSTANCE_WIDTH];
        instance.copy_from_slice(&bytes[IV_LEN..Self::HEADER_LEN]);
        Ok(Self {
            iv,
            instance,
            ciphertext: bytes[Self::HEADER_LEN..].to_vec(),
        })
    }

    /// Serialise to the persisted byte layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::HEADER_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.instance);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    pub fn instance(&self) -> &[u8; INSTANCE_WIDTH] {
        &self.instance
    }

    /// Hex-encoded ciphertext as returned by the appliance.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }
}
