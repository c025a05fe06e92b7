//! Per-chunk cipher for FileVault v2 content.
//!
//! Container content is organized as fixed 4 KiB chunks, each encrypted
//! independently with AES-128-CBC. The IV for chunk `i` is
//! `HMAC-SHA1(hmac_key, be32(i))` truncated to the cipher block size, which
//! gives every chunk a unique, deterministic IV without any per-chunk
//! metadata on disk.
//!
//! The format carries no MAC over the ciphertext itself: corruption or
//! tampering is not detected at this layer. That is a property of FileVault
//! v2, not something this module attempts to paper over.

use aes::Aes128;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, InnerIvInit};
use generic_array::GenericArray;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use zeroize::Zeroizing;

use super::keys::{HMAC_KEY_SIZE, KeyMaterial};

/// Plaintext (and ciphertext) size of one content chunk.
pub const CHUNK_SIZE: usize = 4096;

/// AES block size; also the length of a derived IV.
pub const CIPHER_BLOCK_SIZE: usize = 16;

type HmacSha1 = Hmac<Sha1>;
type ChunkEncryptor = cbc::Encryptor<Aes128>;
type ChunkDecryptor = cbc::Decryptor<Aes128>;

/// Calculate which chunk contains the given plaintext byte offset.
#[inline]
pub fn chunk_number(offset: u64) -> u32 {
    (offset / CHUNK_SIZE as u64) as u32
}

/// Calculate the byte offset within its chunk for a given plaintext offset.
#[inline]
pub fn chunk_offset(offset: u64) -> usize {
    (offset % CHUNK_SIZE as u64) as usize
}

/// Chunk cipher state for one opened container.
///
/// Holds the expanded AES-128 schedule (both cipher directions) and the HMAC
/// key. The keyed hash for IV derivation is computed fresh per call; no
/// mutable digest state persists between chunks.
pub struct ChunkCryptor {
    aes: Aes128,
    hmac_key: Zeroizing<[u8; HMAC_KEY_SIZE]>,
}

impl ChunkCryptor {
    pub fn new(keys: &KeyMaterial) -> Self {
        Self {
            aes: keys.expand_cipher(),
            hmac_key: Zeroizing::new(*keys.hmac_key()),
        }
    }

    /// Derive the IV for a chunk: HMAC-SHA1 over the 4-byte big-endian chunk
    /// index, truncated to the cipher block size.
    pub fn derive_iv(&self, chunk: u32) -> [u8; CIPHER_BLOCK_SIZE] {
        let mut mac = HmacSha1::new_from_slice(&self.hmac_key[..])
            .expect("HMAC accepts keys of any length");
        mac.update(&chunk.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        let mut iv = [0u8; CIPHER_BLOCK_SIZE];
        iv.copy_from_slice(&digest[..CIPHER_BLOCK_SIZE]);
        iv
    }

    /// Encrypt one chunk in place.
    ///
    /// `data` must be exactly [`CHUNK_SIZE`] bytes.
    pub fn encrypt_chunk(&self, chunk: u32, data: &mut [u8]) {
        debug_assert_eq!(data.len(), CHUNK_SIZE);
        let iv = self.derive_iv(chunk);
        let len = data.len();
        ChunkEncryptor::inner_iv_init(self.aes.clone(), GenericArray::from_slice(&iv))
            .encrypt_padded_mut::<NoPadding>(data, len)
            .expect("chunk length is a whole number of cipher blocks");
    }

    /// Decrypt one chunk in place.
    ///
    /// `data` must be exactly [`CHUNK_SIZE`] bytes.
    pub fn decrypt_chunk(&self, chunk: u32, data: &mut [u8]) {
        debug_assert_eq!(data.len(), CHUNK_SIZE);
        let iv = self.derive_iv(chunk);
        ChunkDecryptor::inner_iv_init(self.aes.clone(), GenericArray::from_slice(&iv))
            .decrypt_padded_mut::<NoPadding>(data)
            .expect("chunk length is a whole number of cipher blocks");
    }
}
