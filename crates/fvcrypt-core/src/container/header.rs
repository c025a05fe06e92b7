//! FileVault v2 (`encrcdsa`) container header codec.
//!
//! The header is a fixed 832-byte structure at offset 0 of the container.
//! Every multi-byte integer is stored big-endian on disk and host-endian in
//! memory; the byte arrays (UUID, KDF salt, keyblob IV, keyblob) are carried
//! verbatim. Decoding followed by encoding must reproduce the original bytes
//! exactly, including every reserved field — most of the KDF and keyblob
//! fields are opaque payload for this layer, consumed only by whoever unwraps
//! the key material.

use std::fmt;
use std::io::{self, Read, Write};

use thiserror::Error;

/// On-disk signature of a v2 container: `b"encrcdsa"` read big-endian.
pub const V2_SIGNATURE: u64 = 0x656e637263647361;

/// On-disk signature of the legacy v1 format: `b"cdsaencr"` read big-endian.
///
/// Recognized only to be rejected; the v1 layout is not implemented.
pub const V1_SIGNATURE: u64 = 0x63647361656e6372;

/// Total size of the fixed v2 header in bytes.
pub const HEADER_SIZE: usize = 832;

/// The container version this crate implements.
pub const V2_VERSION: u32 = 2;

/// Errors produced while decoding a container header.
#[derive(Error, Debug)]
pub enum HeaderError {
    /// The first 8 bytes match no known FileVault signature.
    #[error("not a FileVault container: bad signature {found:#018x}")]
    InvalidSignature { found: u64 },

    /// The container is a recognized FileVault format this crate does not
    /// implement (v1), or a v2-signed header with an unexpected version field.
    #[error("unsupported FileVault container version {version}")]
    UnsupportedVersion { version: u32 },

    /// Fewer than [`HEADER_SIZE`] bytes were available.
    #[error("container header truncated: expected {HEADER_SIZE} bytes, got {actual}")]
    Truncated { actual: usize },
}

/// A decoded container header, tagged by format version.
///
/// Only v2 is implemented; the v1 magic decodes to [`Unsupported`] so callers
/// pattern-match the rejection instead of inspecting a raw version field.
///
/// [`Unsupported`]: ContainerHeader::Unsupported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerHeader {
    V2(V2Header),
    Unsupported { version: u32 },
}

impl ContainerHeader {
    /// Decode a header from the first [`HEADER_SIZE`] bytes of a container.
    pub fn decode(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.len() < 8 {
            return Err(HeaderError::Truncated {
                actual: bytes.len(),
            });
        }

        let signature = u64::from_be_bytes(bytes[..8].try_into().unwrap());
        match signature {
            V2_SIGNATURE => {
                if bytes.len() < HEADER_SIZE {
                    return Err(HeaderError::Truncated {
                        actual: bytes.len(),
                    });
                }
                let header = V2Header::parse(bytes);
                if header.version != V2_VERSION {
                    return Err(HeaderError::UnsupportedVersion {
                        version: header.version,
                    });
                }
                Ok(ContainerHeader::V2(header))
            }
            V1_SIGNATURE => Ok(ContainerHeader::Unsupported { version: 1 }),
            found => Err(HeaderError::InvalidSignature { found }),
        }
    }
}

/// The fixed-layout v2 header, host-endian in memory.
///
/// `unk1`..`unk5`, `padding` and the KDF/keyblob fields are opaque: this
/// layer round-trips them byte-exactly but never interprets them.
#[derive(Clone, PartialEq, Eq)]
pub struct V2Header {
    pub signature: u64,
    pub version: u32,
    pub enc_iv_size: u32,
    pub unk1: u32,
    pub unk2: u32,
    pub unk3: u32,
    pub unk4: u32,
    pub unk5: u32,
    pub uuid: [u8; 16],
    pub block_size: u32,
    /// Logical plaintext length of the container content.
    pub data_size: u64,
    /// Byte offset of chunk 0 in the underlying file.
    pub data_offset: u64,
    pub padding: [u8; 0x260],
    pub kdf_algorithm: u32,
    pub kdf_prng_algorithm: u32,
    pub kdf_iteration_count: u32,
    pub kdf_salt_len: u32,
    pub kdf_salt: [u8; 0x20],
    pub blob_enc_iv_size: u32,
    pub blob_enc_iv: [u8; 0x20],
    pub blob_enc_key_bits: u32,
    pub blob_enc_algorithm: u32,
    pub blob_enc_padding: u32,
    pub blob_enc_mode: u32,
    pub encrypted_keyblob_size: u32,
    pub encrypted_keyblob: [u8; 0x30],
}

impl V2Header {
    /// Parse from a buffer of at least [`HEADER_SIZE`] bytes.
    ///
    /// The caller has already verified the signature and length.
    fn parse(bytes: &[u8]) -> Self {
        let mut r = FieldReader { buf: bytes };
        Self {
            signature: r.u64(),
            version: r.u32(),
            enc_iv_size: r.u32(),
            unk1: r.u32(),
            unk2: r.u32(),
            unk3: r.u32(),
            unk4: r.u32(),
            unk5: r.u32(),
            uuid: r.bytes(),
            block_size: r.u32(),
            data_size: r.u64(),
            data_offset: r.u64(),
            padding: r.bytes(),
            kdf_algorithm: r.u32(),
            kdf_prng_algorithm: r.u32(),
            kdf_iteration_count: r.u32(),
            kdf_salt_len: r.u32(),
            kdf_salt: r.bytes(),
            blob_enc_iv_size: r.u32(),
            blob_enc_iv: r.bytes(),
            blob_enc_key_bits: r.u32(),
            blob_enc_algorithm: r.u32(),
            blob_enc_padding: r.u32(),
            blob_enc_mode: r.u32(),
            encrypted_keyblob_size: r.u32(),
            encrypted_keyblob: r.bytes(),
        }
    }

    /// Encode to the on-disk big-endian layout.
    ///
    /// Exact inverse of [`ContainerHeader::decode`] for every field,
    /// including the opaque ones.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut w = FieldWriter {
            buf: Vec::with_capacity(HEADER_SIZE),
        };
        w.u64(self.signature);
        w.u32(self.version);
        w.u32(self.enc_iv_size);
        w.u32(self.unk1);
        w.u32(self.unk2);
        w.u32(self.unk3);
        w.u32(self.unk4);
        w.u32(self.unk5);
        w.bytes(&self.uuid);
        w.u32(self.block_size);
        w.u64(self.data_size);
        w.u64(self.data_offset);
        w.bytes(&self.padding);
        w.u32(self.kdf_algorithm);
        w.u32(self.kdf_prng_algorithm);
        w.u32(self.kdf_iteration_count);
        w.u32(self.kdf_salt_len);
        w.bytes(&self.kdf_salt);
        w.u32(self.blob_enc_iv_size);
        w.bytes(&self.blob_enc_iv);
        w.u32(self.blob_enc_key_bits);
        w.u32(self.blob_enc_algorithm);
        w.u32(self.blob_enc_padding);
        w.u32(self.blob_enc_mode);
        w.u32(self.encrypted_keyblob_size);
        w.bytes(&self.encrypted_keyblob);

        w.buf
            .try_into()
            .expect("header layout totals exactly HEADER_SIZE bytes")
    }

    /// Read and decode a header from a stream.
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<ContainerHeader> {
        let mut buf = [0u8; HEADER_SIZE];
        reader.read_exact(&mut buf)?;
        ContainerHeader::decode(&buf).map_err(io::Error::other)
    }

    /// Encode and write this header to a stream.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.encode())
    }
}

impl fmt::Debug for V2Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("V2Header")
            .field("version", &self.version)
            .field("uuid", &hex::encode(self.uuid))
            .field("block_size", &self.block_size)
            .field("data_size", &self.data_size)
            .field("data_offset", &self.data_offset)
            .field("kdf_iteration_count", &self.kdf_iteration_count)
            .field("encrypted_keyblob_size", &self.encrypted_keyblob_size)
            .finish_non_exhaustive()
    }
}

struct FieldReader<'a> {
    buf: &'a [u8],
}

impl FieldReader<'_> {
    fn u32(&mut self) -> u32 {
        let value = u32::from_be_bytes(self.buf[..4].try_into().unwrap());
        self.buf = &self.buf[4..];
        value
    }

    fn u64(&mut self) -> u64 {
        let value = u64::from_be_bytes(self.buf[..8].try_into().unwrap());
        self.buf = &self.buf[8..];
        value
    }

    fn bytes<const N: usize>(&mut self) -> [u8; N] {
        let value: [u8; N] = self.buf[..N].try_into().unwrap();
        self.buf = &self.buf[N..];
        value
    }
}

struct FieldWriter {
    buf: Vec<u8>,
}

impl FieldWriter {
    fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn bytes(&mut self, value: &[u8]) {
        self.buf.extend_from_slice(value);
    }
}
