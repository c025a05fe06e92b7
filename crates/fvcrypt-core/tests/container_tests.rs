//! End-to-end container scenarios: growth, persistence, boundary crossing,
//! and composition over different storage backends.

mod common;

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use fvcrypt_core::container::header::ContainerHeader;
use fvcrypt_core::crypto::chunk::ChunkCryptor;
use fvcrypt_core::crypto::keys::KeyMaterial;
use fvcrypt_core::{CHUNK_SIZE, FileVaultFile, HEADER_SIZE, ImageCreator};
use hex_literal::hex;

use common::{KEY_HEX, OTHER_KEY_HEX, fresh_container, pattern};

fn test_cryptor() -> ChunkCryptor {
    let keys = KeyMaterial::new(
        hex!("000102030405060708090a0b0c0d0e0f"),
        hex!("101112131415161718191a1b1c1d1e1f20212223"),
    );
    ChunkCryptor::new(&keys)
}

/// Decode the header out of raw container bytes.
fn decode_header(bytes: &[u8]) -> fvcrypt_core::V2Header {
    match ContainerHeader::decode(bytes).expect("container header should decode") {
        ContainerHeader::V2(header) => header,
        other => panic!("expected a V2 header, got {other:?}"),
    }
}

#[test]
fn write_5000_bytes_survives_close_and_reopen() {
    let mut storage = fresh_container();
    let data = pattern(5000, 3);

    {
        let mut file = FileVaultFile::open(&mut storage, KEY_HEX).unwrap();
        assert_eq!(file.len(), 0);
        assert_eq!(file.write(&data).unwrap(), 5000);
        assert_eq!(file.len(), 5000);

        file.seek(0).unwrap();
        let mut back = vec![0u8; 5000];
        assert_eq!(file.read(&mut back).unwrap(), 5000);
        assert_eq!(back, data);

        file.close().unwrap();
    }

    // Reopen with the same key: size and content are unchanged.
    let mut file = FileVaultFile::open(storage, KEY_HEX).unwrap();
    assert_eq!(file.len(), 5000);
    let mut back = vec![0u8; 5000];
    file.read(&mut back).unwrap();
    assert_eq!(back, data);
}

#[test]
fn boundary_write_lands_in_both_chunks() {
    let mut storage = fresh_container();
    let data = pattern(10, 0x40);

    {
        let mut file = FileVaultFile::open(&mut storage, KEY_HEX).unwrap();
        file.seek(4090).unwrap();
        file.write(&data).unwrap();
        assert_eq!(file.len(), 4100);
        file.close().unwrap();
    }

    // Independently decrypt both chunks straight from the ciphertext region.
    let bytes = storage.into_inner();
    let cryptor = test_cryptor();
    let header = decode_header(&bytes);
    assert_eq!(header.data_offset, HEADER_SIZE as u64);

    let region = &bytes[HEADER_SIZE..];
    let mut chunk0 = region[..CHUNK_SIZE].to_vec();
    let mut chunk1 = region[CHUNK_SIZE..2 * CHUNK_SIZE].to_vec();
    cryptor.decrypt_chunk(0, &mut chunk0);
    cryptor.decrypt_chunk(1, &mut chunk1);

    assert_eq!(&chunk0[4090..], &data[..6]);
    assert_eq!(&chunk1[..4], &data[6..]);
    // Bytes never written stay zero.
    assert!(chunk0[..4090].iter().all(|&b| b == 0));
    assert!(chunk1[4..].iter().all(|&b| b == 0));
}

#[test]
fn growth_is_persisted_in_the_header() {
    let mut storage = fresh_container();

    {
        let mut file = FileVaultFile::open(&mut storage, KEY_HEX).unwrap();
        file.seek(10_000).unwrap();
        file.write(&pattern(50, 9)).unwrap();
        assert_eq!(file.len(), 10_050);
        file.close().unwrap();
    }

    let header = decode_header(storage.get_ref());
    assert_eq!(header.data_size, 10_050);
}

#[test]
fn reads_and_writes_spanning_several_chunks() {
    let mut file = FileVaultFile::open(fresh_container(), KEY_HEX).unwrap();
    let data = pattern(3 * CHUNK_SIZE, 7);

    file.seek(100).unwrap();
    file.write(&data).unwrap();
    assert_eq!(file.len(), 100 + data.len() as u64);
    assert_eq!(file.tell(), 100 + data.len() as u64);

    file.seek(100).unwrap();
    let mut back = vec![0u8; data.len()];
    file.read(&mut back).unwrap();
    assert_eq!(back, data);

    // A read that straddles just one boundary.
    file.seek(CHUNK_SIZE as u64 + 90).unwrap();
    let mut window = [0u8; 20];
    file.read(&mut window).unwrap();
    assert_eq!(&window[..], &data[CHUNK_SIZE - 10..CHUNK_SIZE + 10]);
}

#[test]
fn sequential_small_writes_concatenate() {
    let mut file = FileVaultFile::open(fresh_container(), KEY_HEX).unwrap();
    for piece in [&b"one"[..], b"two", b"three"] {
        file.write(piece).unwrap();
    }
    assert_eq!(file.len(), 11);

    file.seek(0).unwrap();
    let mut back = [0u8; 11];
    file.read(&mut back).unwrap();
    assert_eq!(&back, b"onetwothree");
}

#[test]
fn wrong_key_garbles_content_without_error() {
    let mut storage = fresh_container();
    let data = pattern(2000, 1);

    {
        let mut file = FileVaultFile::open(&mut storage, KEY_HEX).unwrap();
        file.write(&data).unwrap();
        file.close().unwrap();
    }

    // The format has no MAC: a wrong key opens fine and reads garbage.
    let mut file = FileVaultFile::open(storage, OTHER_KEY_HEX).unwrap();
    assert_eq!(file.len(), 2000);
    let mut back = vec![0u8; 2000];
    file.read(&mut back).unwrap();
    assert_ne!(back, data);
}

#[test]
fn ciphertext_region_holds_no_plaintext() {
    let mut storage = fresh_container();
    let data = vec![0x5A; 3 * CHUNK_SIZE];

    {
        let mut file = FileVaultFile::open(&mut storage, KEY_HEX).unwrap();
        file.write(&data).unwrap();
        file.close().unwrap();
    }

    let region = &storage.get_ref()[HEADER_SIZE..];
    assert_eq!(region.len(), 3 * CHUNK_SIZE);
    // A constant plaintext must not show through in any chunk.
    for chunk in region.chunks(CHUNK_SIZE) {
        assert!(chunk.iter().any(|&b| b != 0x5A));
    }
}

#[test]
fn file_backed_storage_round_trip() {
    let mut backing = tempfile::tempfile().unwrap();
    ImageCreator::new().create(&mut backing).unwrap();
    let data = pattern(CHUNK_SIZE + 500, 5);

    {
        let mut file = FileVaultFile::open(&mut backing, KEY_HEX).unwrap();
        file.write(&data).unwrap();
        file.close().unwrap();
    }

    backing.seek(SeekFrom::Start(0)).unwrap();
    let mut file = FileVaultFile::open(backing, KEY_HEX).unwrap();
    assert_eq!(file.len(), data.len() as u64);
    let mut back = vec![0u8; data.len()];
    file.read(&mut back).unwrap();
    assert_eq!(back, data);
}

#[test]
fn decrypted_views_stack() {
    // A FileVaultFile is itself Storage, so a container can live inside the
    // plaintext of another container.
    let mut outer_storage = fresh_container();
    {
        let mut outer = FileVaultFile::open(&mut outer_storage, KEY_HEX).unwrap();
        ImageCreator::new().create(&mut outer).unwrap();

        let mut inner = FileVaultFile::open(&mut outer, OTHER_KEY_HEX).unwrap();
        inner.write(b"nested plaintext").unwrap();
        inner.close().unwrap();
        outer.close().unwrap();
    }

    let mut outer = FileVaultFile::open(&mut outer_storage, KEY_HEX).unwrap();
    let mut inner = FileVaultFile::open(&mut outer, OTHER_KEY_HEX).unwrap();
    assert_eq!(inner.len(), 16);
    let mut back = [0u8; 16];
    inner.read(&mut back).unwrap();
    assert_eq!(&back, b"nested plaintext");

    // Release the nested views so the mutable borrow of `outer_storage` ends
    // before we inspect its raw bytes below.
    drop(inner);
    drop(outer);

    // The outer ciphertext region must not leak the nested plaintext.
    let raw = outer_storage.get_ref();
    assert!(
        !raw.windows(6).any(|w| w == b"nested"),
        "nested plaintext visible in outer ciphertext"
    );
}

#[test]
fn std_io_copy_through_the_view() {
    let mut file = FileVaultFile::open(fresh_container(), KEY_HEX).unwrap();
    let data = pattern(2 * CHUNK_SIZE + 77, 11);

    let mut source = Cursor::new(data.clone());
    std::io::copy(&mut source, &mut file).unwrap();
    assert_eq!(file.len(), data.len() as u64);

    Seek::seek(&mut file, SeekFrom::Start(0)).unwrap();
    let mut back = Vec::new();
    Read::by_ref(&mut file)
        .take(data.len() as u64)
        .read_to_end(&mut back)
        .unwrap();
    assert_eq!(back, data);

    Write::flush(&mut file).unwrap();
}
