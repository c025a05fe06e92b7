//! Random-access plaintext view of an encrypted container.
//!
//! [`FileVaultFile`] owns the underlying storage and a single-chunk cache,
//! and translates logical offset/length I/O into chunk-aligned cipher
//! operations. Reads and writes see plaintext; everything that reaches the
//! storage is ciphertext (plus the cleartext header).
//!
//! # Container layout
//!
//! - **Header (832 bytes)**: fixed big-endian structure at offset 0.
//! - **Content chunks (4096 bytes each)**: chunk `i` occupies
//!   `[data_offset + i * 4096, data_offset + (i + 1) * 4096)`, AES-128-CBC
//!   encrypted under the IV derived from `i`.
//!
//! The format authenticates nothing: there is no MAC over the ciphertext,
//! so corruption or tampering surfaces as garbled plaintext, not an error.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};

use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

use crate::container::header::{
    ContainerHeader, HEADER_SIZE, HeaderError, V1_SIGNATURE, V2_SIGNATURE, V2Header,
};
use crate::crypto::chunk::{CHUNK_SIZE, ChunkCryptor, chunk_number, chunk_offset};
use crate::crypto::keys::{KeyFormatError, KeyMaterial};

use super::cache::ChunkCache;
use super::storage::{Storage, read_full};

/// Context for I/O failures, providing debugging information.
#[derive(Debug, Clone, Default)]
pub struct IoContext {
    /// Operation being performed
    pub operation: Option<&'static str>,
    /// Chunk involved, if any
    pub chunk: Option<u32>,
}

impl IoContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation = Some(operation);
        self
    }

    #[must_use]
    pub fn with_chunk(mut self, chunk: u32) -> Self {
        self.chunk = Some(chunk);
        self
    }
}

impl fmt::Display for IoContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(operation) = self.operation {
            parts.push(operation.to_string());
        }
        if let Some(chunk) = self.chunk {
            parts.push(format!("chunk {chunk}"));
        }

        if parts.is_empty() {
            write!(f, "(no context)")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Errors produced by container operations.
#[derive(Error, Debug)]
pub enum FileVaultError {
    /// IO error from the underlying storage.
    #[error("IO error during {context}: {source}")]
    Io {
        #[source]
        source: io::Error,
        context: IoContext,
    },

    /// A chunk slot is only partially present in the underlying storage.
    #[error("incomplete chunk {chunk}: expected {expected} ciphertext bytes, got {actual}")]
    IncompleteChunk {
        chunk: u32,
        expected: usize,
        actual: usize,
    },

    /// Container header error (bad signature, unsupported version, truncated).
    #[error("container header error: {0}")]
    Header(#[from] HeaderError),

    /// The supplied key string is malformed.
    #[error("key format error: {0}")]
    Key(#[from] KeyFormatError),
}

impl FileVaultError {
    /// Create an IO error with context
    #[must_use]
    pub fn io_with_context(source: io::Error, context: IoContext) -> Self {
        FileVaultError::Io { source, context }
    }
}

/// A random-access plaintext view of a FileVault v2 container.
///
/// Created by [`open`](Self::open), which takes ownership of the underlying
/// storage; closing (or dropping) the view releases it. A `FileVaultFile` is
/// not internally synchronized — share it across threads only behind
/// external serialization.
///
/// It also implements [`Read`], [`Write`], [`Seek`] and [`Storage`], so a
/// decrypted view can itself back other stream consumers, including another
/// layered container.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use fvcrypt_core::container::creator::ImageCreator;
/// use fvcrypt_core::fs::file::FileVaultFile;
///
/// const KEY_HEX: &str =
///     "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f20212223";
///
/// let mut storage = Cursor::new(Vec::new());
/// ImageCreator::new().create(&mut storage)?;
///
/// let mut file = FileVaultFile::open(storage, KEY_HEX)?;
/// file.write(b"hello")?;
/// file.seek(0)?;
///
/// let mut back = [0u8; 5];
/// file.read(&mut back)?;
/// assert_eq!(&back, b"hello");
/// file.close()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct FileVaultFile<S: Storage> {
    cache: ChunkCache<S>,
    header: V2Header,
    /// Logical cursor into the plaintext.
    offset: u64,
    header_dirty: bool,
    closed: bool,
}

impl<S: Storage> FileVaultFile<S> {
    /// Open a container, taking ownership of its storage.
    ///
    /// Validates the signature before anything else: storage that is not a
    /// v2 container is rejected without having been mutated. The key string
    /// must be the 72-hex-character AES + HMAC pair.
    #[instrument(level = "debug", skip(storage, key_hex))]
    pub fn open(mut storage: S, key_hex: &str) -> Result<Self, FileVaultError> {
        let keys = KeyMaterial::from_hex(key_hex)?;
        let context = IoContext::new().with_operation("open container");

        storage
            .seek(SeekFrom::Start(0))
            .map_err(|e| FileVaultError::io_with_context(e, context.clone()))?;
        let mut signature = [0u8; 8];
        let got = read_full(&mut storage, &mut signature)
            .map_err(|e| FileVaultError::io_with_context(e, context.clone()))?;
        if got < signature.len() {
            return Err(HeaderError::Truncated { actual: got }.into());
        }
        match u64::from_be_bytes(signature) {
            V2_SIGNATURE => {}
            V1_SIGNATURE => {
                return Err(HeaderError::UnsupportedVersion { version: 1 }.into());
            }
            found => return Err(HeaderError::InvalidSignature { found }.into()),
        }

        storage
            .seek(SeekFrom::Start(0))
            .map_err(|e| FileVaultError::io_with_context(e, context.clone()))?;
        let mut header_bytes = [0u8; HEADER_SIZE];
        let got = read_full(&mut storage, &mut header_bytes)
            .map_err(|e| FileVaultError::io_with_context(e, context))?;
        if got < HEADER_SIZE {
            return Err(HeaderError::Truncated { actual: got }.into());
        }

        let header = match ContainerHeader::decode(&header_bytes)? {
            ContainerHeader::V2(header) => header,
            ContainerHeader::Unsupported { version } => {
                return Err(HeaderError::UnsupportedVersion { version }.into());
            }
        };

        let cryptor = ChunkCryptor::new(&keys);
        let mut cache = ChunkCache::new(storage, cryptor, header.data_offset);
        cache.ensure(0)?;

        debug!(
            data_size = header.data_size,
            data_offset = header.data_offset,
            "container opened"
        );

        Ok(Self {
            cache,
            header,
            offset: 0,
            header_dirty: false,
            closed: false,
        })
    }

    /// Read `buf.len()` plaintext bytes at the logical cursor.
    ///
    /// Requests crossing chunk boundaries are split into per-chunk segments;
    /// after each segment the cache is moved to the chunk under the advanced
    /// cursor, so a request ending exactly on a boundary pre-loads the next
    /// chunk. Reads beyond the last written chunk return zeros.
    #[instrument(level = "trace", skip(self, buf), fields(offset = self.offset, len = buf.len()))]
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, FileVaultError> {
        self.cache.ensure(chunk_number(self.offset))?;

        let mut copied = 0;
        while copied < buf.len() {
            let within = chunk_offset(self.offset);
            let take = (buf.len() - copied).min(CHUNK_SIZE - within);
            buf[copied..copied + take].copy_from_slice(&self.cache.chunk()[within..within + take]);
            copied += take;
            self.offset += take as u64;
            self.cache.ensure(chunk_number(self.offset))?;
        }

        trace!(read_bytes = copied, "read complete");
        Ok(copied)
    }

    /// Write `buf` at the logical cursor.
    ///
    /// Writing past the current logical size grows it to `cursor + len` and
    /// marks the header dirty; the new size is persisted on
    /// [`flush`](Self::flush)/[`close`](Self::close). Boundary-crossing
    /// writes use the same segment discipline as [`read`](Self::read).
    #[instrument(level = "trace", skip(self, buf), fields(offset = self.offset, len = buf.len()))]
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, FileVaultError> {
        let end = self.offset + buf.len() as u64;
        if end > self.header.data_size {
            self.header.data_size = end;
            self.header_dirty = true;
            trace!(data_size = end, "logical size grown");
        }

        self.cache.ensure(chunk_number(self.offset))?;

        let mut copied = 0;
        while copied < buf.len() {
            let within = chunk_offset(self.offset);
            let take = (buf.len() - copied).min(CHUNK_SIZE - within);
            self.cache.chunk_mut()[within..within + take]
                .copy_from_slice(&buf[copied..copied + take]);
            self.cache.mark_dirty();
            copied += take;
            self.offset += take as u64;
            self.cache.ensure(chunk_number(self.offset))?;
        }

        trace!(written_bytes = copied, "write complete");
        Ok(copied)
    }

    /// Move the logical cursor.
    ///
    /// Seeking is eager: the target chunk is loaded (and any dirty resident
    /// chunk flushed) immediately, not on the next access.
    pub fn seek(&mut self, offset: u64) -> Result<(), FileVaultError> {
        self.offset = offset;
        self.cache.ensure(chunk_number(offset))
    }

    /// The logical cursor position.
    pub fn tell(&self) -> u64 {
        self.offset
    }

    /// The logical plaintext length of the container.
    pub fn len(&self) -> u64 {
        self.header.data_size
    }

    pub fn is_empty(&self) -> bool {
        self.header.data_size == 0
    }

    /// Write back the resident chunk and, if the logical size changed, the
    /// re-encoded header.
    pub fn flush(&mut self) -> Result<(), FileVaultError> {
        self.cache.flush()?;

        if self.header_dirty {
            let context = IoContext::new().with_operation("write header");
            let bytes = self.header.encode();
            let storage = self.cache.storage_mut();
            storage
                .seek(SeekFrom::Start(0))
                .map_err(|e| FileVaultError::io_with_context(e, context.clone()))?;
            storage
                .write_all(&bytes)
                .map_err(|e| FileVaultError::io_with_context(e, context.clone()))?;
            self.header_dirty = false;
            debug!(data_size = self.header.data_size, "header rewritten");
        }

        let context = IoContext::new().with_operation("flush storage");
        self.cache
            .storage_mut()
            .flush()
            .map_err(|e| FileVaultError::io_with_context(e, context))?;
        Ok(())
    }

    /// Flush and release the container.
    ///
    /// Dropping the view also releases it (with a best-effort flush), but
    /// `close` surfaces the final write-back errors that `Drop` can only log.
    #[instrument(level = "debug", skip(self))]
    pub fn close(mut self) -> Result<(), FileVaultError> {
        self.flush()?;
        self.closed = true;
        debug!("container closed");
        Ok(())
    }
}

impl<S: Storage> Drop for FileVaultFile<S> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.flush() {
                warn!(error = %e, "flush failed while dropping unclosed container");
            }
        }
    }
}

impl<S: Storage> fmt::Debug for FileVaultFile<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileVaultFile")
            .field("offset", &self.offset)
            .field("data_size", &self.header.data_size)
            .field("header_dirty", &self.header_dirty)
            .finish_non_exhaustive()
    }
}

impl<S: Storage> Read for FileVaultFile<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        FileVaultFile::read(self, buf).map_err(io::Error::other)
    }
}

impl<S: Storage> Write for FileVaultFile<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        FileVaultFile::write(self, buf).map_err(io::Error::other)
    }

    fn flush(&mut self) -> io::Result<()> {
        FileVaultFile::flush(self).map_err(io::Error::other)
    }
}

impl<S: Storage> Seek for FileVaultFile<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.header.data_size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.offset.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before byte 0")
        })?;
        FileVaultFile::seek(self, target).map_err(io::Error::other)?;
        Ok(target)
    }
}

impl<S: Storage> Storage for FileVaultFile<S> {
    fn len(&mut self) -> io::Result<u64> {
        Ok(self.header.data_size)
    }
}
