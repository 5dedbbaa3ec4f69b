//! [`KeyMaterial`]: raw key bytes returned by key retrieval.

use std::fmt;

use zeroize::Zeroizing;

/// Decoded key bytes. The buffer is zeroed when dropped.
///
/// Deliberately not `Clone`: callers that need a copy must make one explicitly
/// via [`KeyMaterial::as_bytes`].
pub struct KeyMaterial(Zeroizing<Vec<u8>>);

impl KeyMaterial {
    pub fn new(bytes: Zeroizing<Vec<u8>>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material, not even in debug builds.
        write!(f, "KeyMaterial([REDACTED; {} bytes])", self.len())
    }
}
