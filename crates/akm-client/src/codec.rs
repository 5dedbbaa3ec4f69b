//! Field codec: pure helpers for the appliance's fixed-width ASCII framing.
//!
//! Nothing in this module performs I/O. Every function either produces an
//! exact-width field or fails; none of them silently truncates a value that
//! the appliance would then misread.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::protocol::IV_LEN;
use common::{AkmError, KeyEncoding};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};

/// Byte used for every kind of padding on the wire.
const PAD: u8 = b' ';

/// Left-justify `value` in a field of exactly `width` bytes, padding with spaces.
///
/// Trailing spaces beyond `width` may be dropped because the padded field is
/// identical either way. Any other byte past `width` is an error.
///
/// # Errors
///
/// Returns [`AkmError::FieldTooNarrow`] if a non-space byte would be cut off.
pub fn pad_field(field: &'static str, value: &[u8], width: usize) -> Result<Vec<u8>, AkmError> {
    if value.len() > width && value[width..].iter().any(|&b| b != PAD) {
        return Err(AkmError::FieldTooNarrow {
            field,
            width,
            len: value.len(),
        });
    }
    let mut out = Vec::with_capacity(width);
    out.extend_from_slice(&value[..value.len().min(width)]);
    out.resize(width, PAD);
    Ok(out)
}

/// Render `n` as a zero-padded decimal field of exactly `width` digits.
///
/// # Errors
///
/// Returns [`AkmError::OutOfRange`] if `n` needs more than `width` digits.
pub fn decimal_length(n: usize, width: usize) -> Result<Vec<u8>, AkmError> {
    let max = u32::try_from(width)
        .ok()
        .filter(|&w| w > 0)
        .and_then(|w| 10usize.checked_pow(w))
        .map(|limit| limit - 1);
    match max {
        Some(max) if n <= max => Ok(format!("{n:0width$}").into_bytes()),
        // Widths too large for `usize` can represent any value.
        None if width > 0 => Ok(format!("{n:0width$}").into_bytes()),
        _ => Err(AkmError::OutOfRange { value: n, width }),
    }
}

/// Parse a fixed-width ASCII decimal field.
///
/// Returns `None` if the field is empty or contains anything but digits.
pub fn parse_decimal(field: &[u8]) -> Option<usize> {
    if field.is_empty() || !field.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(field).ok()?.parse().ok()
}

/// Append spaces until the payload length is a multiple of `block_size`.
///
/// Already-aligned input (including empty input) is returned unchanged; a
/// whole extra block is never appended.
pub fn block_pad(payload: &[u8], block_size: usize) -> Vec<u8> {
    let mut out = payload.to_vec();
    if block_size == 0 {
        return out;
    }
    let rem = payload.len() % block_size;
    if rem != 0 {
        out.resize(payload.len() + block_size - rem, PAD);
    }
    out
}

/// Strip the trailing space padding the appliance leaves on decrypted output.
///
/// Lossy by construction: a plaintext that genuinely ended in spaces loses them.
pub fn trim_block_padding(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != PAD).map_or(0, |i| i + 1);
    &bytes[..end]
}

/// Check that `ciphertext` is non-empty hex made of whole `block_size` blocks.
///
/// This is the shape every ciphertext must have to be decryptable, so the same
/// check guards both the encrypt response and the decrypt request.
///
/// # Errors
///
/// Returns a description of the first problem found.
pub fn check_hex_blocks(ciphertext: &[u8], block_size: usize) -> Result<(), String> {
    if ciphertext.is_empty() {
        return Err("ciphertext is empty".into());
    }
    if !ciphertext.iter().all(u8::is_ascii_hexdigit) {
        return Err("ciphertext is not hex encoded".into());
    }
    if block_size != 0 && ciphertext.len() % block_size != 0 {
        return Err(format!(
            "ciphertext length {} is not a multiple of {block_size}",
            ciphertext.len()
        ));
    }
    Ok(())
}

/// Generate a fresh initialisation vector from the OS CSPRNG.
///
/// The bytes are drawn from the 62-symbol alphanumeric alphabet so the
/// persisted blob stays printable. That costs entropy: 16 such bytes carry
/// about 95 bits rather than the 128 of a uniformly random IV.
pub fn random_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    for (slot, byte) in iv.iter_mut().zip(OsRng.sample_iter(Alphanumeric)) {
        *slot = byte;
    }
    iv
}

/// Encode raw bytes per the configured key encoding.
pub fn encode_output(bytes: &[u8], encoding: KeyEncoding) -> Vec<u8> {
    match encoding {
        KeyEncoding::Binary => bytes.to_vec(),
        KeyEncoding::Hex => hex::encode(bytes).into_bytes(),
        KeyEncoding::Base64 => STANDARD.encode(bytes).into_bytes(),
    }
}

/// Inverse of [`encode_output`].
///
/// Surrounding ASCII whitespace is ignored for the text encodings.
///
/// # Errors
///
/// Returns [`AkmError::MalformedResponse`] if the text is not valid hex or base64.
pub fn decode_output(bytes: &[u8], encoding: KeyEncoding) -> Result<Vec<u8>, AkmError> {
    match encoding {
        KeyEncoding::Binary => Ok(bytes.to_vec()),
        KeyEncoding::Hex => hex::decode(trim_ascii_whitespace(bytes))
            .map_err(|e| AkmError::MalformedResponse(format!("invalid hex key value: {e}"))),
        KeyEncoding::Base64 => STANDARD
            .decode(trim_ascii_whitespace(bytes))
            .map_err(|e| AkmError::MalformedResponse(format!("invalid base64 key value: {e}"))),
    }
}

fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
