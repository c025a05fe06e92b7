//! Transparent encryption layer for FileVault v2 (`encrcdsa`) disk images.
//!
//! A [`FileVaultFile`] wraps any random-access storage holding an encrypted
//! container and exposes its content as a plain plaintext byte stream:
//! reads and writes at arbitrary offsets and lengths, while everything that
//! touches the underlying storage is ciphertext.
//!
//! Callers supply the already-unwrapped key pair (16-byte AES content key +
//! 20-byte HMAC key, hex-encoded); deriving that pair from a passphrase and
//! the header's encrypted keyblob is outside this crate.
//!
//! # Format
//!
//! - **Header (832 bytes)**: fixed big-endian layout at offset 0, carrying
//!   the logical data size and the offset of the ciphertext region.
//! - **Content chunks (4096 bytes)**: AES-128-CBC per chunk, IV =
//!   `HMAC-SHA1(hmac_key, be32(chunk_index))` truncated to 16 bytes.
//! - No per-chunk authentication: the format has no MAC over the
//!   ciphertext, so this layer cannot detect corruption or tampering.
//!
//! Only the v2 container format is supported; v1 images are detected and
//! rejected.
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use fvcrypt_core::{FileVaultFile, ImageCreator};
//!
//! const KEY_HEX: &str =
//!     "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f20212223";
//!
//! let mut storage = Cursor::new(Vec::new());
//! ImageCreator::new().create(&mut storage)?;
//!
//! let mut file = FileVaultFile::open(storage, KEY_HEX)?;
//! file.write(b"plaintext in, ciphertext out")?;
//! file.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod container;
pub mod crypto;
pub mod error;
pub mod fs;

// Re-export commonly used types at crate root
pub use container::creator::ImageCreator;
pub use container::header::{ContainerHeader, HEADER_SIZE, V2Header};
pub use crypto::chunk::CHUNK_SIZE;
pub use crypto::keys::KeyMaterial;
pub use fs::file::{FileVaultError, FileVaultFile};
pub use fs::storage::Storage;
