//! Byte-addressable read/write/erase on top of the page-granular
//! device commands.

use core::fmt::Debug;

use embedded_hal::{delay::DelayNs, spi::SpiDevice};

use crate::address::{ByteAddress, ColumnAddress};
use crate::error::FlashError;
use crate::status::BlockProtect;
use crate::{FlashGeometry, PollTimings, SUPPORTED_DEVICES};

/// Driver for an external SPI NAND flash device.
///
/// Owns the SPI device and the delay provider for the lifetime of the
/// driver; [`ExtFlash::release`] hands them back. The geometry is fixed
/// at construction. All operations are blocking and run to completion
/// or first hard failure; callers must serialize access to one device,
/// the driver takes no internal locks.
pub struct ExtFlash<SPI, D> {
    pub(crate) spi: SPI,
    pub(crate) delay: D,
    pub(crate) geometry: FlashGeometry,
    pub(crate) timings: PollTimings,
}

// Manual Debug to avoid bounds on SPI and the delay provider
impl<SPI, D> Debug for ExtFlash<SPI, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExtFlash")
            .field("geometry", &self.geometry)
            .field("timings", &self.timings)
            .finish()
    }
}

impl<SPI, D> ExtFlash<SPI, D> {
    /// Create a driver with default poll timings
    pub fn new(spi: SPI, delay: D, geometry: FlashGeometry) -> Self {
        Self::with_timings(spi, delay, geometry, PollTimings::default())
    }

    /// Create a driver with explicit poll timings
    pub fn with_timings(spi: SPI, delay: D, geometry: FlashGeometry, timings: PollTimings) -> Self {
        ExtFlash {
            spi,
            delay,
            geometry,
            timings,
        }
    }

    pub fn geometry(&self) -> &FlashGeometry {
        &self.geometry
    }

    pub fn timings(&self) -> &PollTimings {
        &self.timings
    }

    /// Consume the driver and return the SPI device and delay provider
    pub fn release(self) -> (SPI, D) {
        (self.spi, self.delay)
    }

    fn check_bounds(&self, addr: u32, len: u32) -> Result<(), FlashError<SPI::Error>>
    where
        SPI: SpiDevice,
    {
        match addr.checked_add(len) {
            Some(end) if end <= self.geometry.total_size => Ok(()),
            _ => {
                error!("range {} + {} exceeds device size", addr, len);
                Err(FlashError::InvalidParams)
            }
        }
    }
}

impl<SPI: SpiDevice, D: DelayNs> ExtFlash<SPI, D> {
    /// Detect and unlock the device.
    ///
    /// Reads the JEDEC ID, matches it against [`SUPPORTED_DEVICES`] and
    /// disables block protection. Must complete before any read, write
    /// or erase.
    pub fn init(&mut self) -> Result<(), FlashError<SPI::Error>> {
        let id = self.read_jedec_id()?;
        let device = SUPPORTED_DEVICES
            .iter()
            .find(|d| d.jedec_id == id)
            .ok_or_else(|| {
                error!("no registered device matches the JEDEC ID");
                FlashError::DetectFailed
            })?;
        info!("detected {}", device.name);

        self.set_block_protect(BlockProtect::None)
    }

    /// Read `buf.len()` bytes starting at byte offset `addr`.
    ///
    /// Reads whole-page chunks through the device page buffer and
    /// checks the ECC result after every chunk. The first failure
    /// aborts the call; bytes already copied for completed chunks are
    /// left in `buf`.
    pub fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError<SPI::Error>> {
        trace!("reading {} bytes at {}", buf.len(), addr);
        self.check_bounds(addr, buf.len() as u32)?;

        let ba = ByteAddress::new(addr);
        let mut page = ba.as_page_index(self.geometry.page_size);
        let mut column = ba.as_column_address(self.geometry.page_size);

        let mut done = 0;
        while done < buf.len() {
            let space = (self.geometry.page_size - column.as_u16() as u32) as usize;
            let chunk = (buf.len() - done).min(space);

            self.page_data_read(page)?;
            self.read_buffer(column, &mut buf[done..done + chunk])?;

            let ecc = self.check_ecc()?;
            if !ecc.is_acceptable() {
                error!("uncorrectable ECC result reading page {}", page.as_u32());
                return Err(FlashError::Ecc(ecc));
            }

            done += chunk;
            column = ColumnAddress::new(0);
            page.inc();
        }
        Ok(())
    }

    /// Write `buf` starting at byte offset `addr`.
    ///
    /// The target range must have been erased. Programs one page per
    /// chunk via random data load, so only the addressed bytes of each
    /// page are touched. A fail bit left over from an earlier operation
    /// is logged but does not block the write.
    pub fn write(&mut self, addr: u32, buf: &[u8]) -> Result<(), FlashError<SPI::Error>> {
        trace!("writing {} bytes at {}", buf.len(), addr);
        self.check_bounds(addr, buf.len() as u32)?;

        if self.check_fail().is_err() {
            warn!("fail bit set by a previous operation, continuing");
        }

        let ba = ByteAddress::new(addr);
        let mut page = ba.as_page_index(self.geometry.page_size);
        let mut column = ba.as_column_address(self.geometry.page_size);

        let mut done = 0;
        while done < buf.len() {
            let space = (self.geometry.page_size - column.as_u16() as u32) as usize;
            let chunk = (buf.len() - done).min(space);

            self.program_load(true, column, &buf[done..done + chunk])?;
            self.program_execute(page)?;
            self.wait_while_busy(self.timings.write_timeout_ms)?;
            self.check_fail()?;

            done += chunk;
            column = ColumnAddress::new(0);
            page.inc();
        }
        Ok(())
    }

    /// Erase the blocks covering `len` bytes starting at `addr`.
    ///
    /// Steps page by page, erasing the whole block containing each
    /// page. Blocks spanning several pages of the range are erased once
    /// per page; a trailing remainder shorter than a page ends the loop
    /// after its block has been erased.
    pub fn erase(&mut self, addr: u32, len: u32) -> Result<(), FlashError<SPI::Error>> {
        trace!("erasing {} bytes at {}", len, addr);
        self.check_bounds(addr, len)?;

        if self.check_fail().is_err() {
            warn!("fail bit set by a previous operation, continuing");
        }

        let ba = ByteAddress::new(addr);
        let mut page = ba.as_page_index(self.geometry.page_size);
        let mut step = ba.to_page_boundary(self.geometry.page_size);

        let mut remaining = len;
        while remaining > 0 {
            self.block_erase(page)?;
            self.wait_while_busy(self.timings.erase_timeout_ms)?;
            self.check_fail()?;

            if remaining < step {
                break;
            }
            remaining -= step;
            step = self.geometry.page_size;
            page.inc();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimDelay, SimFlash};
    use crate::status::{reg, EccStatus};
    use test_log::test;

    // 2048-byte pages, 4 pages per block, 4 blocks: 32 KiB total
    type Sim = SimFlash<2048, 4, 4>;

    fn flash() -> ExtFlash<Sim, SimDelay> {
        ExtFlash::new(Sim::new(), SimDelay::default(), Sim::geometry())
    }

    fn pattern(len: usize) -> [u8; 512] {
        let mut buf = [0u8; 512];
        for (i, b) in buf.iter_mut().enumerate().take(len) {
            *b = i as u8;
        }
        buf
    }

    #[test]
    fn init_detects_and_unprotects() {
        let mut flash = flash();
        flash.init().unwrap();
        // block protection cleared
        assert_eq!(flash.read_status_register(reg::PROTECTION).unwrap(), 0x00);
    }

    #[test]
    fn init_rejects_identity_mismatch() {
        for byte in 0..3 {
            let mut flash = flash();
            let mut id = [0xEF, 0xAA, 0x21];
            id[byte] ^= 0x01;
            flash.spi.set_jedec_id(id);
            assert!(matches!(flash.init(), Err(FlashError::DetectFailed)));
        }
    }

    #[test]
    fn init_reports_verify_mismatch() {
        let mut flash = flash();
        flash.spi.corrupt_protection_writes = true;
        assert!(matches!(flash.init(), Err(FlashError::VerifyFailed)));
    }

    #[test]
    fn roundtrip_within_page() {
        let mut flash = flash();
        let data = pattern(100);
        flash.write(10, &data[..100]).unwrap();
        let mut readback = [0u8; 100];
        flash.read(10, &mut readback).unwrap();
        assert_eq!(readback, data[..100]);
    }

    #[test]
    fn roundtrip_across_page_boundary() {
        let mut flash = flash();
        let data = pattern(200);
        // starts 50 bytes before the first page boundary
        flash.write(2048 - 50, &data[..200]).unwrap();
        let mut readback = [0u8; 200];
        flash.read(2048 - 50, &mut readback).unwrap();
        assert_eq!(readback, data[..200]);
        // second chunk landed at column 0 of the next page
        assert_eq!(flash.spi.page_data(1)[..150], data[50..200]);
    }

    #[test]
    fn rejects_out_of_bounds_without_transfers() {
        let mut flash = flash();
        let total = flash.geometry().total_size;
        let mut buf = [0u8; 32];

        assert!(matches!(
            flash.read(total - 16, &mut buf),
            Err(FlashError::InvalidParams)
        ));
        assert!(matches!(
            flash.write(total - 16, &buf),
            Err(FlashError::InvalidParams)
        ));
        assert!(matches!(
            flash.erase(total - 16, 32),
            Err(FlashError::InvalidParams)
        ));
        // addr + len wrapping past u32::MAX is out of bounds, not a panic
        assert!(matches!(
            flash.read(u32::MAX, &mut buf),
            Err(FlashError::InvalidParams)
        ));
        assert_eq!(flash.spi.transfers, 0);
    }

    #[test]
    fn range_ending_at_capacity_is_accepted() {
        let mut flash = flash();
        let total = flash.geometry().total_size;
        let data = pattern(32);
        flash.write(total - 32, &data[..32]).unwrap();
        let mut readback = [0u8; 32];
        flash.read(total - 32, &mut readback).unwrap();
        assert_eq!(readback, data[..32]);
    }

    #[test]
    fn corrected_ecc_is_accepted() {
        let mut flash = flash();
        flash.spi.set_ecc_result(0b01);
        let mut buf = [0u8; 16];
        flash.read(0, &mut buf).unwrap();
    }

    #[test]
    fn uncorrectable_ecc_fails_read() {
        let mut flash = flash();
        flash.spi.set_ecc_result(0b10);
        let mut buf = [0u8; 16];
        assert!(matches!(
            flash.read(0, &mut buf),
            Err(FlashError::Ecc(EccStatus::UncorrectableSingle))
        ));

        flash.spi.set_ecc_result(0b11);
        assert!(matches!(
            flash.read(0, &mut buf),
            Err(FlashError::Ecc(EccStatus::UncorrectableMulti))
        ));
    }

    #[test]
    fn program_fail_surfaces() {
        let mut flash = flash();
        flash.spi.inject_program_fail = true;
        let data = pattern(16);
        assert!(matches!(
            flash.write(0, &data[..16]),
            Err(FlashError::ProgramFailed)
        ));
    }

    #[test]
    fn erase_fail_surfaces() {
        let mut flash = flash();
        flash.spi.inject_erase_fail = true;
        assert!(matches!(flash.erase(0, 64), Err(FlashError::EraseFailed)));
    }

    /// A fail bit left over from an earlier operation is advisory only
    #[test]
    fn stale_fail_bit_does_not_block_write() {
        let mut writer = flash();
        writer.spi.set_fail_bits(true, false);
        let data = pattern(16);
        writer.write(0, &data[..16]).unwrap();

        let mut eraser = flash();
        eraser.spi.set_fail_bits(false, true);
        eraser.erase(0, 16).unwrap();
    }

    /// The erase loop steps by page, so every page of the range incurs
    /// a block erase even though one per block would cover it.
    #[test]
    fn erase_steps_by_page_not_block() {
        let cases = [
            (0, 10, 1),
            (0, 2048, 1),
            (0, 2049, 2),
            // initial step is the distance to the first page boundary
            (2047, 2, 2),
            // whole block, one erase per page
            (0, 8192, 4),
        ];
        for (addr, len, ops) in cases {
            let mut flash = flash();
            flash.erase(addr, len).unwrap();
            assert_eq!(flash.spi.erase_ops, ops, "erase({}, {})", addr, len);
        }
    }

    /// The loop breaks once the remainder is shorter than the step,
    /// but the remainder always lies in the page just erased, so the
    /// whole range still ends up erased.
    #[test]
    fn erase_covers_trailing_remainder() {
        let mut flash = flash();
        let data = [0x00u8; 16];
        // data at the start of block 1
        flash.write(8192, &data).unwrap();
        // range juts 10 bytes into block 1
        flash.erase(0, 8192 + 10).unwrap();
        let mut readback = [0u8; 16];
        flash.read(8192, &mut readback).unwrap();
        assert_eq!(readback, [0xFF; 16]);
    }

    #[test]
    fn busy_wait_boundary_polls() {
        // interval 1 ms, budget 5 polls
        let timings = PollTimings {
            poll_interval_ms: 1,
            write_timeout_ms: 5,
            erase_timeout_ms: 5,
        };

        let mut flash =
            ExtFlash::with_timings(Sim::new(), SimDelay::default(), Sim::geometry(), timings);
        flash.spi.force_busy(4);
        flash.wait_while_busy(5).unwrap();

        flash.spi.force_busy(5);
        assert!(matches!(flash.wait_while_busy(5), Err(FlashError::Timeout)));

        flash.spi.force_busy(6);
        assert!(matches!(flash.wait_while_busy(5), Err(FlashError::Timeout)));
    }

    #[test]
    fn write_times_out_when_busy_never_clears() {
        let mut flash = flash();
        flash.spi.set_busy_polls(1_000);
        let data = pattern(16);
        assert!(matches!(
            flash.write(0, &data[..16]),
            Err(FlashError::Timeout)
        ));
    }

    #[test]
    fn transport_errors_surface_unmodified() {
        let mut flash = flash();
        flash.spi.fail_transfers = true;
        let mut buf = [0u8; 8];
        assert!(matches!(flash.read(0, &mut buf), Err(FlashError::Spi(_))));
        assert!(matches!(flash.init(), Err(FlashError::Spi(_))));
    }

    #[test]
    fn write_enable_sets_latch() {
        let mut flash = flash();
        assert!(!flash.is_write_enabled().unwrap());
        flash.write_enable().unwrap();
        assert!(flash.is_write_enabled().unwrap());
        flash.write_disable().unwrap();
        assert!(!flash.is_write_enabled().unwrap());
    }

    #[test]
    fn zero_length_requests_are_no_ops() {
        let mut flash = flash();
        flash.read(0, &mut []).unwrap();
        flash.write(0, &[]).unwrap();
        flash.erase(0, 0).unwrap();
        assert_eq!(flash.spi.erase_ops, 0);
    }
}
