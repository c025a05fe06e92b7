//! Fresh-container creation.
//!
//! Formats empty v2 containers: a header with `data_size = 0` and nothing
//! else. The KDF and keyblob fields are filled with the CSSM identifiers real
//! `encrcdsa` images carry, but they are opaque to this layer either way —
//! key unwrapping happens elsewhere and the engine only round-trips them.

use std::io::{self, Read, Seek, SeekFrom, Write};

use rand::RngCore;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::crypto::chunk::CHUNK_SIZE;
use crate::fs::storage::Storage;

use super::header::{HEADER_SIZE, V1_SIGNATURE, V2_SIGNATURE, V2_VERSION, V2Header};

// CSSM identifiers carried in the keyblob fields of real encrcdsa images.
const KDF_ALGORITHM_PBKDF2: u32 = 103;
const KDF_SALT_LEN: u32 = 20;
const BLOB_ENC_ALGORITHM_3DES_EDE: u32 = 17;
const BLOB_ENC_PADDING_PKCS7: u32 = 7;
const BLOB_ENC_MODE_CBC_PAD_IV8: u32 = 6;

const DEFAULT_KDF_ITERATION_COUNT: u32 = 1000;

/// Errors that can occur while formatting a fresh container.
#[derive(Error, Debug)]
pub enum CreateError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The storage already starts with a FileVault signature.
    #[error("storage already contains a FileVault container")]
    AlreadyFormatted,
}

/// Builder for formatting a fresh, empty v2 container.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use fvcrypt_core::container::creator::ImageCreator;
///
/// let mut storage = Cursor::new(Vec::new());
/// ImageCreator::new()
///     .create(&mut storage)
///     .expect("failed to format container");
/// ```
pub struct ImageCreator {
    uuid: Option<[u8; 16]>,
    kdf_iteration_count: u32,
}

impl ImageCreator {
    pub fn new() -> Self {
        Self {
            uuid: None,
            kdf_iteration_count: DEFAULT_KDF_ITERATION_COUNT,
        }
    }

    /// Set a fixed container UUID (defaults to random).
    ///
    /// Primarily useful for deterministic tests.
    pub fn with_uuid(mut self, uuid: [u8; 16]) -> Self {
        self.uuid = Some(uuid);
        self
    }

    /// Set the KDF iteration count recorded in the header.
    ///
    /// The value is opaque passthrough for this layer; it only matters to the
    /// external key-unwrapping step.
    pub fn with_kdf_iteration_count(mut self, count: u32) -> Self {
        self.kdf_iteration_count = count;
        self
    }

    /// Write a fresh v2 header to the start of `storage`.
    ///
    /// The formatted container has `data_size = 0` and an empty ciphertext
    /// region beginning at `data_offset = HEADER_SIZE`. Storage that already
    /// carries a FileVault signature is refused.
    #[instrument(level = "debug", skip(self, storage))]
    pub fn create<S: Storage>(self, storage: &mut S) -> Result<(), CreateError> {
        if storage.len()? >= 8 {
            storage.seek(SeekFrom::Start(0))?;
            let mut signature = [0u8; 8];
            storage.read_exact(&mut signature)?;
            let signature = u64::from_be_bytes(signature);
            if signature == V2_SIGNATURE || signature == V1_SIGNATURE {
                return Err(CreateError::AlreadyFormatted);
            }
        }

        let uuid = self.uuid.unwrap_or_else(|| {
            let mut uuid = [0u8; 16];
            rand::rng().fill_bytes(&mut uuid);
            uuid
        });
        let mut kdf_salt = [0u8; 0x20];
        rand::rng().fill_bytes(&mut kdf_salt[..KDF_SALT_LEN as usize]);

        let header = V2Header {
            signature: V2_SIGNATURE,
            version: V2_VERSION,
            enc_iv_size: 16,
            unk1: 0,
            unk2: 0,
            unk3: 0,
            unk4: 0,
            unk5: 0,
            uuid,
            block_size: CHUNK_SIZE as u32,
            data_size: 0,
            data_offset: HEADER_SIZE as u64,
            padding: [0u8; 0x260],
            kdf_algorithm: KDF_ALGORITHM_PBKDF2,
            kdf_prng_algorithm: 0,
            kdf_iteration_count: self.kdf_iteration_count,
            kdf_salt_len: KDF_SALT_LEN,
            kdf_salt,
            blob_enc_iv_size: 32,
            blob_enc_iv: [0u8; 0x20],
            blob_enc_key_bits: 128,
            blob_enc_algorithm: BLOB_ENC_ALGORITHM_3DES_EDE,
            blob_enc_padding: BLOB_ENC_PADDING_PKCS7,
            blob_enc_mode: BLOB_ENC_MODE_CBC_PAD_IV8,
            encrypted_keyblob_size: 48,
            encrypted_keyblob: [0u8; 0x30],
        };

        storage.seek(SeekFrom::Start(0))?;
        header.write_to(storage)?;
        storage.flush()?;

        debug!(uuid = %hex::encode(uuid), "formatted fresh container");
        Ok(())
    }
}

impl Default for ImageCreator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::header::ContainerHeader;
    use std::io::Cursor;

    #[test]
    fn formats_an_empty_v2_container() {
        let mut storage = Cursor::new(Vec::new());
        ImageCreator::new()
            .with_uuid([7; 16])
            .create(&mut storage)
            .unwrap();

        let bytes = storage.into_inner();
        assert_eq!(bytes.len(), HEADER_SIZE);

        let ContainerHeader::V2(header) = ContainerHeader::decode(&bytes).unwrap() else {
            panic!("expected V2 header");
        };
        assert_eq!(header.version, 2);
        assert_eq!(header.uuid, [7; 16]);
        assert_eq!(header.block_size, CHUNK_SIZE as u32);
        assert_eq!(header.data_size, 0);
        assert_eq!(header.data_offset, HEADER_SIZE as u64);
    }

    #[test]
    fn refuses_already_formatted_storage() {
        let mut storage = Cursor::new(Vec::new());
        ImageCreator::new().create(&mut storage).unwrap();

        let result = ImageCreator::new().create(&mut storage);
        assert!(matches!(result, Err(CreateError::AlreadyFormatted)));
    }

    #[test]
    fn salts_are_random_per_container() {
        let mut a = Cursor::new(Vec::new());
        let mut b = Cursor::new(Vec::new());
        ImageCreator::new().create(&mut a).unwrap();
        ImageCreator::new().create(&mut b).unwrap();

        let ContainerHeader::V2(ha) = ContainerHeader::decode(a.get_ref()).unwrap() else {
            panic!("expected V2 header");
        };
        let ContainerHeader::V2(hb) = ContainerHeader::decode(b.get_ref()).unwrap() else {
            panic!("expected V2 header");
        };
        assert_ne!(ha.kdf_salt, hb.kdf_salt);
        assert_ne!(ha.uuid, hb.uuid);
    }
}
