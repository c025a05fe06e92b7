//! Single-chunk read-modify-write cache.
//!
//! At most one chunk is resident in decrypted form. Switching chunks flushes
//! the outgoing chunk first when it has been modified, so the write-back
//! order is always flush-then-load. The resident plaintext lives in a
//! [`Zeroizing`] buffer and is erased on drop.

use std::io::{Seek, SeekFrom, Write};

use tracing::trace;
use zeroize::Zeroizing;

use crate::crypto::chunk::{CHUNK_SIZE, ChunkCryptor};

use super::file::{FileVaultError, IoContext};
use super::storage::{Storage, read_full};

pub(crate) struct ChunkCache<S> {
    storage: S,
    cryptor: ChunkCryptor,
    data_offset: u64,
    /// Index of the chunk currently held in `chunk`, `None` before the first
    /// load or after a failed one.
    resident: Option<u32>,
    chunk: Zeroizing<Vec<u8>>,
    dirty: bool,
}

impl<S: Storage> ChunkCache<S> {
    pub(crate) fn new(storage: S, cryptor: ChunkCryptor, data_offset: u64) -> Self {
        Self {
            storage,
            cryptor,
            data_offset,
            resident: None,
            chunk: Zeroizing::new(vec![0u8; CHUNK_SIZE]),
            dirty: false,
        }
    }

    fn chunk_position(&self, index: u32) -> u64 {
        self.data_offset + u64::from(index) * CHUNK_SIZE as u64
    }

    pub(crate) fn resident(&self) -> Option<u32> {
        self.resident
    }

    /// The resident plaintext chunk.
    pub(crate) fn chunk(&self) -> &[u8] {
        &self.chunk
    }

    /// Mutable access to the resident plaintext chunk; the caller must
    /// follow any mutation with [`mark_dirty`](Self::mark_dirty).
    pub(crate) fn chunk_mut(&mut self) -> &mut [u8] {
        &mut self.chunk
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Write the resident chunk back as ciphertext if it is dirty.
    ///
    /// The plaintext stays resident; only the dirty flag is cleared.
    pub(crate) fn flush(&mut self) -> Result<(), FileVaultError> {
        if !self.dirty {
            return Ok(());
        }
        let index = self
            .resident
            .expect("dirty flag implies a resident chunk");
        let context = IoContext::new()
            .with_operation("flush chunk")
            .with_chunk(index);

        let mut ciphertext = self.chunk.clone();
        self.cryptor.encrypt_chunk(index, &mut ciphertext);

        self.storage
            .seek(SeekFrom::Start(self.chunk_position(index)))
            .map_err(|e| FileVaultError::io_with_context(e, context.clone()))?;
        self.storage
            .write_all(&ciphertext)
            .map_err(|e| FileVaultError::io_with_context(e, context))?;

        self.dirty = false;
        trace!(chunk = index, "chunk written back");
        Ok(())
    }

    /// Make `target` the resident chunk.
    ///
    /// No-op when already resident. Otherwise the outgoing chunk is flushed
    /// if dirty, then the target's ciphertext is read and decrypted in place.
    /// A chunk slot entirely beyond the end of the storage loads as zeroed
    /// plaintext (the slot has simply never been written); a partially
    /// present slot is a torn container and fails with
    /// [`FileVaultError::IncompleteChunk`].
    pub(crate) fn ensure(&mut self, target: u32) -> Result<(), FileVaultError> {
        if self.resident == Some(target) {
            return Ok(());
        }

        self.flush()?;
        // From here the old resident content is about to be overwritten;
        // keep the state coherent if the load fails partway.
        self.resident = None;

        let context = IoContext::new()
            .with_operation("load chunk")
            .with_chunk(target);

        self.storage
            .seek(SeekFrom::Start(self.chunk_position(target)))
            .map_err(|e| FileVaultError::io_with_context(e, context.clone()))?;
        let filled = read_full(&mut self.storage, &mut self.chunk)
            .map_err(|e| FileVaultError::io_with_context(e, context))?;

        if filled == 0 {
            self.chunk.fill(0);
            trace!(chunk = target, "chunk slot not yet written, zero plaintext");
        } else if filled < CHUNK_SIZE {
            return Err(FileVaultError::IncompleteChunk {
                chunk: target,
                expected: CHUNK_SIZE,
                actual: filled,
            });
        } else {
            self.cryptor.decrypt_chunk(target, &mut self.chunk);
            trace!(chunk = target, "chunk loaded and decrypted");
        }

        self.resident = Some(target);
        Ok(())
    }
}
