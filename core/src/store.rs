//! Byte-addressable nonvolatile storage and the checksum shared by every region.

use alloc::{vec, vec::Vec};

use crate::error::StoreError;

/// Erased flash / EEPROM reads back as all ones.
pub const ERASED_BYTE: u8 = 0xFF;

/// A fixed-capacity byte store. Writes become durable on [`NvStore::commit`].
pub trait NvStore {
    fn capacity(&self) -> usize;

    fn get(&self, offset: usize, buf: &mut [u8]) -> Result<(), StoreError>;

    fn put(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StoreError>;

    fn commit(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

impl<S: NvStore + ?Sized> NvStore for &mut S {
    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn get(&self, offset: usize, buf: &mut [u8]) -> Result<(), StoreError> {
        (**self).get(offset, buf)
    }

    fn put(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StoreError> {
        (**self).put(offset, bytes)
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        (**self).commit()
    }
}

pub fn check_bounds(offset: usize, len: usize, capacity: usize) -> Result<(), StoreError> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(StoreError::OutOfBounds {
            offset,
            len,
            capacity,
        }),
    }
}

/// In-memory store used by tests, benchmarks and boards that shadow EEPROM in RAM.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemStore {
    bytes: Vec<u8>,
    commits: u32,
}

impl MemStore {
    pub fn erased(capacity: usize) -> Self {
        Self {
            bytes: vec![ERASED_BYTE; capacity],
            commits: 0,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes, commits: 0 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn commit_count(&self) -> u32 {
        self.commits
    }
}

impl NvStore for MemStore {
    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn get(&self, offset: usize, buf: &mut [u8]) -> Result<(), StoreError> {
        check_bounds(offset, buf.len(), self.bytes.len())?;
        buf.copy_from_slice(&self.bytes[offset..offset + buf.len()]);
        Ok(())
    }

    fn put(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StoreError> {
        check_bounds(offset, bytes.len(), self.bytes.len())?;
        self.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.commits = self.commits.wrapping_add(1);
        Ok(())
    }
}

const CRC_TABLE: [u32; 256] = build_crc_table();

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;

    while i < 256 {
        let mut c = i as u32;
        let mut j = 0;

        while j < 8 {
            c = if (c & 1) != 0 {
                0xEDB8_8320u32 ^ (c >> 1)
            } else {
                c >> 1
            };
            j += 1;
        }

        table[i] = c;
        i += 1;
    }

    table
}

pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;

    for byte in data {
        let idx = ((crc ^ (*byte as u32)) & 0xFF) as usize;
        crc = CRC_TABLE[idx] ^ (crc >> 8);
    }

    crc ^ 0xFFFF_FFFFu32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_matches_known_vector() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn erased_store_reads_all_ones() {
        let store = MemStore::erased(64);
        let mut buf = [0u8; 16];
        store.get(48, &mut buf).unwrap();
        assert!(buf.iter().all(|b| *b == ERASED_BYTE));
    }

    #[test]
    fn rejects_out_of_bounds_access() {
        let mut store = MemStore::erased(32);
        let err = store.put(30, &[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            StoreError::OutOfBounds {
                offset: 30,
                len: 3,
                capacity: 32
            }
        ));
        let mut buf = [0u8; 4];
        assert!(store.get(usize::MAX, &mut buf).is_err());
    }

    #[test]
    fn put_then_get_through_mut_ref() {
        let mut store = MemStore::erased(16);
        {
            let mut handle = &mut store;
            handle.put(4, &[9, 8, 7]).unwrap();
            handle.commit().unwrap();
        }
        let mut buf = [0u8; 3];
        store.get(4, &mut buf).unwrap();
        assert_eq!(buf, [9, 8, 7]);
        assert_eq!(store.commit_count(), 1);
    }
}
