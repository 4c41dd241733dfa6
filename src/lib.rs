//! Byte-addressable driver for SPI NAND flash devices.
//!
//! The driver maps arbitrary byte ranges onto the page, column and
//! block addressing of the device, sequencing the write-enable,
//! busy-wait and fail-bit choreography each operation needs. The host
//! injects the hardware capabilities: an [`embedded_hal::spi::SpiDevice`]
//! for the full-duplex exchange and an [`embedded_hal::delay::DelayNs`]
//! for inter-poll sleeps.
//!
//! Wear-leveling, bad-block remapping and filesystem concerns live
//! above this crate.
#![no_std]
// Must be first to share macros across crate
pub(crate) mod fmt;

mod address;
mod cmd;
mod device;
pub mod error;
pub mod sim;
pub mod status;
mod transfer;

pub use address::{BlockIndex, ByteAddress, ColumnAddress, PageIndex};
pub use device::ExtFlash;
pub use error::FlashError;
pub use status::{BlockProtect, EccStatus};
pub use transfer::MAX_TRANSFER_SIZE;

/// Physical layout of a flash device. Fixed once the driver is
/// constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlashGeometry {
    /// Total capacity in bytes
    pub total_size: u32,
    /// Size of a page in bytes
    pub page_size: u32,
    /// Number of pages per erase block
    pub pages_per_block: u32,
    /// Number of blocks in the device
    pub block_count: u32,
    /// Out-of-band ECC bytes per page
    pub ecc_bytes_per_page: u32,
}

impl FlashGeometry {
    /// Winbond W25N01GV: 1 Gbit, 2048-byte pages, 64 pages per block
    pub const W25N01GV: Self = FlashGeometry {
        total_size: 2048 * 64 * 1024,
        page_size: 2048,
        pages_per_block: 64,
        block_count: 1024,
        ecc_bytes_per_page: 64,
    };

    /// Size of an erase block in bytes
    pub const fn block_size(&self) -> u32 {
        self.page_size * self.pages_per_block
    }
}

/// A known flash part and its JEDEC signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlashIdentity {
    pub name: &'static str,
    pub jedec_id: [u8; 3],
}

/// Devices this driver recognises at init
pub const SUPPORTED_DEVICES: &[FlashIdentity] = &[FlashIdentity {
    name: "winbond w25n01gv",
    jedec_id: [0xEF, 0xAA, 0x21],
}];

/// Busy-wait configuration. The poll budget of an operation is its
/// timeout divided by the poll interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PollTimings {
    /// Sleep between busy polls
    pub poll_interval_ms: u32,
    /// Budget for program and register operations
    pub write_timeout_ms: u32,
    /// Budget for block erase
    pub erase_timeout_ms: u32,
}

impl Default for PollTimings {
    fn default() -> Self {
        PollTimings {
            poll_interval_ms: 1,
            write_timeout_ms: 15,
            erase_timeout_ms: 150,
        }
    }
}
