use core::fmt::Display;

/// Byte offset into the flash array
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ByteAddress(pub(crate) u32);

impl ByteAddress {
    pub fn new(address: u32) -> Self {
        ByteAddress(address)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Page containing this byte
    pub fn as_page_index(&self, page_size: u32) -> PageIndex {
        PageIndex(self.0 / page_size)
    }

    /// Offset of this byte within its page
    pub fn as_column_address(&self, page_size: u32) -> ColumnAddress {
        ColumnAddress((self.0 % page_size) as u16)
    }

    /// Number of bytes from this address to the next page boundary
    pub fn to_page_boundary(&self, page_size: u32) -> u32 {
        page_size - (self.0 % page_size)
    }
}

impl From<ByteAddress> for u32 {
    fn from(ba: ByteAddress) -> Self {
        ba.as_u32()
    }
}

impl Display for ByteAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

/// Index of a page in the flash array
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PageIndex(pub(crate) u32);

impl PageIndex {
    pub fn new(index: u32) -> Self {
        PageIndex(index)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn inc(&mut self) {
        self.0 += 1;
    }

    /// Block containing this page, the erase granularity
    pub fn as_block_index(&self, pages_per_block: u32) -> BlockIndex {
        BlockIndex((self.0 / pages_per_block) as u16)
    }

    /// Wire encoding of the page address, MSB first
    pub(crate) fn to_wire(self) -> [u8; 2] {
        (self.0 as u16).to_be_bytes()
    }
}

impl From<PageIndex> for u32 {
    fn from(pa: PageIndex) -> Self {
        pa.as_u32()
    }
}

impl Display for PageIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

/// Byte offset within a page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnAddress(pub(crate) u16);

impl ColumnAddress {
    pub fn new(address: u16) -> Self {
        ColumnAddress(address)
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Wire encoding of the column address, MSB first
    pub(crate) fn to_wire(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl Display for ColumnAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

/// Index of a block in the flash array
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockIndex(pub(crate) u16);

impl BlockIndex {
    pub fn new(index: u16) -> Self {
        BlockIndex(index)
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    pub fn as_page_index(&self, pages_per_block: u32) -> PageIndex {
        PageIndex(self.0 as u32 * pages_per_block)
    }
}

impl From<BlockIndex> for u16 {
    fn from(bi: BlockIndex) -> Self {
        bi.as_u16()
    }
}

impl Display for BlockIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    const PAGE_SIZE: u32 = 2048;
    const PAGES_PER_BLOCK: u32 = 64;

    /// Every byte address decomposes to a (page, column) pair that
    /// recombines to the original address.
    #[test]
    fn decompose_roundtrip() {
        for addr in [0, 1, 2047, 2048, 2049, 4095, 4096, 130_000, 134_217_727] {
            let ba = ByteAddress::new(addr);
            let page = ba.as_page_index(PAGE_SIZE);
            let column = ba.as_column_address(PAGE_SIZE);
            assert!((column.as_u16() as u32) < PAGE_SIZE);
            assert_eq!(page.as_u32() * PAGE_SIZE + column.as_u16() as u32, addr);
        }
    }

    #[test]
    fn page_to_block() {
        assert_eq!(PageIndex::new(0).as_block_index(PAGES_PER_BLOCK).as_u16(), 0);
        assert_eq!(PageIndex::new(63).as_block_index(PAGES_PER_BLOCK).as_u16(), 0);
        assert_eq!(PageIndex::new(64).as_block_index(PAGES_PER_BLOCK).as_u16(), 1);
        assert_eq!(BlockIndex::new(2).as_page_index(PAGES_PER_BLOCK).as_u32(), 128);
    }

    #[test]
    fn boundary_distance() {
        assert_eq!(ByteAddress::new(0).to_page_boundary(PAGE_SIZE), 2048);
        assert_eq!(ByteAddress::new(10).to_page_boundary(PAGE_SIZE), 2038);
        assert_eq!(ByteAddress::new(2047).to_page_boundary(PAGE_SIZE), 1);
    }

    #[test]
    fn wire_encoding_is_big_endian() {
        assert_eq!(PageIndex::new(0x1234).to_wire(), [0x12, 0x34]);
        assert_eq!(ColumnAddress::new(0x0A0B).to_wire(), [0x0A, 0x0B]);
    }
}
