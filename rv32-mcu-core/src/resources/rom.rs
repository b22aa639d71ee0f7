use super::MemoryBlock;
use crate::peripheral::Peripheral;

/// Byte-based ROM peripheral.
///
/// Contents are provided at construction, or through [`Rom::set_contents`] by the owner of the
/// ROM. Writes arriving over the bus are always ignored.
///
/// Address translation is the same as for [`Ram`](super::ram::Ram).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Rom {
    block: MemoryBlock,
}

impl Rom {
    /// Create a new ROM spanning `page_count` pages, of which the first bytes are initialized with
    /// `contents`. Only up to `page_count * PAGE_SIZE` bytes are read from `contents`.
    pub fn new(page_count: u32, contents: &[u8]) -> Self {
        let mut block = MemoryBlock::new(page_count);
        block.set_contents(contents);
        Self { block }
    }

    /// Create the smallest ROM that holds all of `contents`, spanning at least one page.
    pub fn fitting(contents: &[u8]) -> Self {
        let pages = contents.len().div_ceil(crate::PAGE_SIZE as usize).max(1);
        Self::new(u32::try_from(pages).unwrap_or(u32::MAX), contents)
    }

    /// Reprogram the start of the ROM with `contents`. Bytes that don't fit are ignored.
    pub fn set_contents(&mut self, contents: &[u8]) {
        self.block.set_contents(contents);
    }

    /// Returns the full contents of the ROM.
    pub fn bytes(&self) -> &[u8] {
        self.block.bytes()
    }
}

impl Peripheral for Rom {
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

    /// See [`Peripheral::write_byte`].
    ///
    /// Writes are always ignored.
    fn write_byte(&mut self, _address: u32, _value: u8) {}

    /// See [`Peripheral::write_halfword`].
    ///
    /// Writes are always ignored.
    fn write_halfword(&mut self, _address: u32, _value: u16) {}

    /// See [`Peripheral::write_word`].
    ///
    /// Writes are always ignored.
    fn write_word(&mut self, _address: u32, _value: u32) {}
}
