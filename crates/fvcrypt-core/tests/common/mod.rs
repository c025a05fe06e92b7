//! Shared fixtures for container integration tests.

use std::io::Cursor;

use fvcrypt_core::ImageCreator;

/// The unwrapped AES + HMAC key pair used across the integration tests.
pub const KEY_HEX: &str =
    "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f20212223";

/// A second, unrelated key pair.
pub const OTHER_KEY_HEX: &str =
    "ffeeddccbbaa99887766554433221100f0e0d0c0b0a090807060504030201000deadbeef";

/// Format a fresh, empty v2 container in memory.
pub fn fresh_container() -> Cursor<Vec<u8>> {
    let mut storage = Cursor::new(Vec::new());
    ImageCreator::new()
        .create(&mut storage)
        .expect("failed to format container");
    storage
}

/// A deterministic byte pattern for write/read-back checks.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}
