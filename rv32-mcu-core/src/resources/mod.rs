//! Provides implementations for the memory resources of the microcontroller: RAM and ROM.

pub mod ram;
pub mod rom;

use crate::PAGE_SIZE;

/// Contiguous little-endian byte storage shared by [`ram::Ram`] and [`rom::Rom`].
///
/// Accesses are expected to be already translated with
/// [`Peripheral::translate_address`](crate::Peripheral::translate_address). Any
/// access of which the last byte falls outside the block reads as zero or is dropped.
#[derive(Debug, Clone, Eq, PartialEq)]
struct MemoryBlock {
    page_count: u32,
    data: Box<[u8]>,
}

impl MemoryBlock {
    /// Allocates a zero-initialized block of `page_count` pages.
    fn new(page_count: u32) -> Self {
        const_assert!(usize::BITS >= 32);
        let len = page_count as usize * PAGE_SIZE as usize;
        Self {
            page_count,
            data: vec![0u8; len].into_boxed_slice(),
        }
    }

    fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Copies `contents` to the start of the block. Bytes past the end of the block are ignored.
    fn set_contents(&mut self, contents: &[u8]) {
        let len = contents.len().min(self.data.len());
        self.data[..len].copy_from_slice(&contents[..len]);
    }

    fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the `N` bytes starting at `address`, or `None` if any of them is out of range.
    fn read<const N: usize>(&self, address: u32) -> Option<[u8; N]> {
        let start = address as usize;
        let end = start.checked_add(N)?;
        self.data.get(start..end)?.try_into().ok()
    }

    /// Stores `bytes` at `address`, unless any of them would fall out of range.
    fn write<const N: usize>(&mut self, address: u32, bytes: [u8; N]) {
        let start = address as usize;
        let Some(end) = start.checked_add(N) else {
            return;
        };
        if let Some(slice) = self.data.get_mut(start..end) {
            slice.copy_from_slice(&bytes);
        }
    }

    fn read_byte(&self, address: u32) -> u8 {
        self.read::<1>(address).map(|[b]| b).unwrap_or(0)
    }

    fn read_halfword(&self, address: u32) -> u16 {
        self.read(address).map(u16::from_le_bytes).unwrap_or(0)
    }

    fn read_word(&self, address: u32) -> u32 {
        self.read(address).map(u32::from_le_bytes).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_size() {
        let block = MemoryBlock::new(2);
        assert_eq!(2, block.page_count());
        assert_eq!(2048, block.bytes().len());
        assert!(block.bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_block_little_endian() {
        let mut block = MemoryBlock::new(1);
        block.write(0x10, 0x1234_5678u32.to_le_bytes());
        assert_eq!(0x78, block.read_byte(0x10));
        assert_eq!(0x5678, block.read_halfword(0x10));
        assert_eq!(0x1234, block.read_halfword(0x12));
        assert_eq!(0x1234_5678, block.read_word(0x10));
    }

    #[test]
    fn test_block_straddling_end() {
        let mut block = MemoryBlock::new(1);
        block.set_contents(&[0xFF; 1024]);
        assert_eq!(0xFF, block.read_byte(1023));
        assert_eq!(0, block.read_halfword(1023));
        assert_eq!(0, block.read_word(1021));
        assert_eq!(0xFFFF_FFFF, block.read_word(1020));
        block.write(1022, [0u8; 4]);
        assert_eq!(0xFFFF_FFFF, block.read_word(1020));
    }

    #[test]
    fn test_block_contents_truncated() {
        let mut block = MemoryBlock::new(1);
        block.set_contents(&[0xAB; 2000]);
        assert_eq!(1024, block.bytes().len());
        assert_eq!(0xAB, block.read_byte(1023));
    }
}
