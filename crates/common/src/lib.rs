//! Common types, wire constants, and errors shared across the `akm-client` crates.

pub mod error;
pub mod protocol;

pub use error::AkmError;
pub use protocol::{CipherBlob, KeyDescriptor, KeyEncoding, KeyType};
