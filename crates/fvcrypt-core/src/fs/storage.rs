//! The narrow storage capability the engine consumes.
//!
//! The engine is storage-agnostic: anything that can seek, read, write and
//! report its total length can back a container — a disk file, an in-memory
//! buffer, or another layered view (including a [`FileVaultFile`] itself,
//! which implements this trait so decrypted views stack).
//!
//! [`FileVaultFile`]: crate::fs::file::FileVaultFile

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, Write};

/// Random-access backing storage for a container.
///
/// Dropping the value releases the underlying resource; there is no separate
/// close operation on this trait.
pub trait Storage: Read + Write + Seek {
    /// Total length of the storage in bytes.
    fn len(&mut self) -> io::Result<u64>;
}

impl Storage for File {
    fn len(&mut self) -> io::Result<u64> {
        self.metadata().map(|m| m.len())
    }
}

impl Storage for Cursor<Vec<u8>> {
    fn len(&mut self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }
}

impl<S: Storage + ?Sized> Storage for &mut S {
    fn len(&mut self) -> io::Result<u64> {
        (**self).len()
    }
}

/// Read until `buf` is full or the stream hits EOF.
///
/// Returns the number of bytes actually read; short only at end of stream.
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
