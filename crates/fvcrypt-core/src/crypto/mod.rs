//! Cryptographic primitives for FileVault v2 containers

pub mod chunk;
pub mod keys;

// Re-export commonly used types
pub use chunk::{CHUNK_SIZE, CIPHER_BLOCK_SIZE, ChunkCryptor, chunk_number, chunk_offset};
pub use keys::{KEY_HEX_LEN, KeyFormatError, KeyMaterial};
