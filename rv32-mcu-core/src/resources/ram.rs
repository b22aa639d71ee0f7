use super::MemoryBlock;
use crate::peripheral::Peripheral;

/// Byte-based RAM peripheral, zero-initialized.
///
/// Local addresses wrap at the next power of two of the RAM size (see
/// [`Peripheral::translate_address`]). An access that does not fully fit in the RAM after that
/// translation reads as zero, or is ignored for writes.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Ram {
    block: MemoryBlock,
}

impl Ram {
    /// Create a new zero-initialized RAM resource spanning `page_count` pages.
    pub fn new(page_count: u32) -> Self {
        Self {
            block: MemoryBlock::new(page_count),
        }
    }

    /// Create a new RAM resource initialized with `contents`, zero-filled past its end.
    pub fn with_contents(page_count: u32, contents: &[u8]) -> Self {
        let mut ram = Self::new(page_count);
        ram.set_contents(contents);
        ram
    }

    /// Overwrite the start of the RAM with `contents`. Bytes that don't fit are ignored.
    pub fn set_contents(&mut self, contents: &[u8]) {
        self.block.set_contents(contents);
    }

    /// Returns the full contents of the RAM.
    pub fn bytes(&self) -> &[u8] {
        self.block.bytes()
    }
}

impl Peripheral for Ram {
    fn page_count(&self) -> u32 {
        self.block.page_count()
    }

    fn read_byte(&mut self, address: u32) -> u8 {
        self.block.read_byte(self.translate_address(address))
    }

    fn read_halfword(&mut self, address: u32) -> u16 {
        self.block.read_halfword(self.translate_address(address))
    }

    fn read_word(&mut self, address: u32) -> u32 {
        self.block.read_word(self.translate_address(address))
    }

    fn write_byte(&mut self, address: u32, value: u8) {
        let address = self.translate_address(address);
        self.block.write(address, [value]);
    }

    fn write_halfword(&mut self, address: u32, value: u16) {
        let address = self.translate_address(address);
        self.block.write(address, value.to_le_bytes());
    }

    fn write_word(&mut self, address: u32, value: u32) {
        let address = self.translate_address(address);
        self.block.write(address, value.to_le_bytes());
    }
}
