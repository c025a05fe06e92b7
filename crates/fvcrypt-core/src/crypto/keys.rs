//! Raw key material for an unlocked FileVault container.
//!
//! Key derivation from a passphrase (and the header's encrypted keyblob) is
//! out of scope here: callers hand over the already-unwrapped key pair as a
//! single hex string. The first 32 hex characters are the 16-byte AES content
//! key, the remaining 40 are the 20-byte HMAC-SHA1 key used for per-chunk IV
//! derivation.

use std::fmt;

use aes::Aes128;
use aes::cipher::KeyInit;
use generic_array::GenericArray;
use thiserror::Error;
use zeroize::Zeroizing;

/// Size of the AES content key in bytes.
pub const AES_KEY_SIZE: usize = 16;

/// Size of the HMAC-SHA1 key in bytes.
pub const HMAC_KEY_SIZE: usize = 20;

/// Expected length of the hex-encoded key string.
pub const KEY_HEX_LEN: usize = 2 * (AES_KEY_SIZE + HMAC_KEY_SIZE);

/// Errors that can occur while parsing the hex-encoded key pair.
#[derive(Error, Debug)]
pub enum KeyFormatError {
    /// The key string is not exactly [`KEY_HEX_LEN`] characters.
    #[error("key string must be exactly {KEY_HEX_LEN} hex characters, got {actual}")]
    InvalidLength { actual: usize },

    /// The key string contains non-hexadecimal characters.
    #[error("key string is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// The unwrapped AES + HMAC key pair for one container.
///
/// Both keys are stored in [`Zeroizing`] buffers and erased when the value is
/// dropped. The `Debug` implementation redacts the key bytes so they cannot
/// leak into logs.
pub struct KeyMaterial {
    aes_key: Zeroizing<[u8; AES_KEY_SIZE]>,
    hmac_key: Zeroizing<[u8; HMAC_KEY_SIZE]>,
}

impl KeyMaterial {
    /// Parse key material from its hex-encoded wire form.
    ///
    /// The string must be exactly [`KEY_HEX_LEN`] hex characters: the AES
    /// content key followed by the HMAC key. Malformed input fails with
    /// [`KeyFormatError`] rather than being partially consumed.
    pub fn from_hex(key_hex: &str) -> Result<Self, KeyFormatError> {
        if key_hex.len() != KEY_HEX_LEN {
            return Err(KeyFormatError::InvalidLength {
                actual: key_hex.len(),
            });
        }

        let mut aes_key = Zeroizing::new([0u8; AES_KEY_SIZE]);
        let mut hmac_key = Zeroizing::new([0u8; HMAC_KEY_SIZE]);
        hex::decode_to_slice(&key_hex[..AES_KEY_SIZE * 2], &mut aes_key[..])?;
        hex::decode_to_slice(&key_hex[AES_KEY_SIZE * 2..], &mut hmac_key[..])?;

        Ok(Self { aes_key, hmac_key })
    }

    /// Create key material from raw key bytes.
    ///
    /// The caller is responsible for zeroing its own copies if they hold
    /// sensitive data.
    pub fn new(aes_key: [u8; AES_KEY_SIZE], hmac_key: [u8; HMAC_KEY_SIZE]) -> Self {
        Self {
            aes_key: Zeroizing::new(aes_key),
            hmac_key: Zeroizing::new(hmac_key),
        }
    }

    /// Expand the AES-128 key schedule.
    ///
    /// `Aes128` carries the round keys for both cipher directions, so this is
    /// done once per opened container and the result reused for every chunk.
    pub(crate) fn expand_cipher(&self) -> Aes128 {
        Aes128::new(GenericArray::from_slice(&self.aes_key[..]))
    }

    pub(crate) fn hmac_key(&self) -> &[u8; HMAC_KEY_SIZE] {
        &self.hmac_key
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("aes_key", &"[REDACTED]")
            .field("hmac_key", &"[REDACTED]")
            .finish()
    }
}
