//! The 100-byte file header that precedes the btree forest. Only page 1
//! carries it; every other page starts its node header at offset 0.

use crate::binary::{read_u16, read_u32, write_u16, write_u32};
use crate::error::{Error, Result};
use crate::layout::{file_header, FILE_HEADER_SIZE, HEADER_MAGIC};

/// Builds a fresh 100-byte header for a brand-new database file.
pub fn produce(page_size: u16) -> [u8; FILE_HEADER_SIZE as usize] {
    let mut buf = [0u8; FILE_HEADER_SIZE as usize];
    buf[file_header::MAGIC..file_header::MAGIC + HEADER_MAGIC.len()].copy_from_slice(HEADER_MAGIC);
    write_u16(&mut buf, file_header::PAGE_SIZE, page_size);
    buf[file_header::WRITE_VERSION] = 1;
    buf[file_header::READ_VERSION] = 1;
    buf[file_header::RESERVED_SPACE] = 0;
    buf[file_header::MAX_PAYLOAD_FRACTION] = 64;
    buf[file_header::MIN_PAYLOAD_FRACTION] = 32;
    buf[file_header::LEAF_PAYLOAD_FRACTION] = 32;
    write_u32(&mut buf, file_header::FIRST_FREELIST_TRUNK, 0);
    buf[file_header::TOTAL_FREELIST_PAGES] = 0;
    write_u32(&mut buf, file_header::SCHEMA_FORMAT, 1);
    write_u32(&mut buf, file_header::DEFAULT_CACHE_SIZE, 20000);
    buf[file_header::LARGEST_ROOT_PAGE] = 0;
    write_u32(&mut buf, file_header::TEXT_ENCODING, 1);
    buf[file_header::INCREMENTAL_VACUUM] = 0;
    buf
}

/// Verifies that `buf` holds a well-formed header: the magic string, and
/// every fixed constant byte named in the layout. Offsets 24, 40, and 60 are
/// deliberately left unchecked, matching the documented format.
pub fn verify(buf: &[u8; FILE_HEADER_SIZE as usize]) -> Result<()> {
    if &buf[file_header::MAGIC..file_header::MAGIC + HEADER_MAGIC.len()] != HEADER_MAGIC {
        return Err(Error::CorruptHeader);
    }

    let checks: &[(usize, u8)] = &[
        (file_header::WRITE_VERSION, 1),
        (file_header::READ_VERSION, 1),
        (file_header::RESERVED_SPACE, 0),
        (file_header::MAX_PAYLOAD_FRACTION, 64),
        (file_header::MIN_PAYLOAD_FRACTION, 32),
        (file_header::LEAF_PAYLOAD_FRACTION, 32),
        (file_header::TOTAL_FREELIST_PAGES, 0),
        (file_header::LARGEST_ROOT_PAGE, 0),
        (file_header::INCREMENTAL_VACUUM, 0),
    ];
    for &(offset, expected) in checks {
        if buf[offset] != expected {
            return Err(Error::CorruptHeader);
        }
    }

    if read_u32(buf, file_header::FIRST_FREELIST_TRUNK) != 0 {
        return Err(Error::CorruptHeader);
    }
    if read_u32(buf, file_header::SCHEMA_FORMAT) != 1 {
        return Err(Error::CorruptHeader);
    }
    if read_u32(buf, file_header::DEFAULT_CACHE_SIZE) != 20000 {
        return Err(Error::CorruptHeader);
    }
    if read_u32(buf, file_header::TEXT_ENCODING) != 1 {
        return Err(Error::CorruptHeader);
    }

    Ok(())
}

/// Extracts the page size the header advertises.
pub fn page_size(buf: &[u8; FILE_HEADER_SIZE as usize]) -> u16 {
    read_u16(buf, file_header::PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produced_header_verifies() {
        let buf = produce(1024);
        verify(&buf).unwrap();
        assert_eq!(page_size(&buf), 1024);
    }

    #[test]
    fn bad_magic_is_corrupt() {
        let mut buf = produce(1024);
        buf[0] = b'X';
        assert!(matches!(verify(&buf), Err(Error::CorruptHeader)));
    }

    #[test]
    fn tampered_constant_is_corrupt() {
        let mut buf = produce(1024);
        buf[file_header::MAX_PAYLOAD_FRACTION] = 99;
        assert!(matches!(verify(&buf), Err(Error::CorruptHeader)));
    }

    #[test]
    fn tampered_four_byte_word_is_corrupt() {
        let mut buf = produce(1024);
        write_u32(&mut buf, file_header::DEFAULT_CACHE_SIZE, 1);
        assert!(matches!(verify(&buf), Err(Error::CorruptHeader)));
    }

    #[test]
    fn reserved_offsets_are_not_checked() {
        let mut buf = produce(1024);
        buf[24] = 0xFF;
        buf[40] = 0xFF;
        buf[60] = 0xFF;
        verify(&buf).unwrap();
    }
}
