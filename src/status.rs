//! Status-register decoding, busy-wait polling and block protection.

use embedded_hal::{delay::DelayNs, spi::SpiDevice};

use crate::device::ExtFlash;
use crate::error::FlashError;

/// Status register addresses and named bit fields
pub mod reg {
    pub const PROTECTION: u8 = 0xA0;
    pub const CONFIGURATION: u8 = 0xB0;
    pub const STATUS: u8 = 0xC0;

    // protection register fields
    pub const SRP1_MASK: u8 = 0x01;
    pub const WPE_MASK: u8 = 0x02;
    pub const TB_MASK: u8 = 0x04;
    pub const TB_OFFSET: u8 = 2;
    pub const BP_MASK: u8 = 0x78;
    pub const BP_OFFSET: u8 = 3;
    pub const SRP0_MASK: u8 = 0x80;

    // configuration register fields
    pub const BUF_MASK: u8 = 0x08;
    pub const ECC_ENABLE_MASK: u8 = 0x10;
    pub const SR1_LOCK_MASK: u8 = 0x20;
    pub const OTP_ENABLE_MASK: u8 = 0x40;
    pub const OTP_LOCK_MASK: u8 = 0x80;

    // status register fields
    pub const BUSY_MASK: u8 = 0x01;
    pub const WEL_MASK: u8 = 0x02;
    pub const EFAIL_MASK: u8 = 0x04;
    pub const PFAIL_MASK: u8 = 0x08;
    pub const ECC_MASK: u8 = 0x30;
    pub const ECC_OFFSET: u8 = 4;
    pub const LUTF_MASK: u8 = 0x40;
}

/// ECC result reported by the device after a read operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EccStatus {
    /// No errors detected
    NoCorrection,
    /// Errors detected and corrected
    Corrected,
    /// Uncorrectable errors in a single page
    UncorrectableSingle,
    /// Uncorrectable errors in more than one page
    UncorrectableMulti,
}

impl EccStatus {
    /// Decode the 2-bit ECC field of the status register
    pub fn from_status(status: u8) -> Self {
        match (status & reg::ECC_MASK) >> reg::ECC_OFFSET {
            0b00 => EccStatus::NoCorrection,
            0b01 => EccStatus::Corrected,
            0b10 => EccStatus::UncorrectableSingle,
            _ => EccStatus::UncorrectableMulti,
        }
    }

    /// Whether a completed read may be trusted
    pub fn is_acceptable(&self) -> bool {
        matches!(self, EccStatus::NoCorrection | EccStatus::Corrected)
    }
}

/// Block protection modes. Bit 4 selects top or bottom of the array,
/// bits 0 to 3 select the protected range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum BlockProtect {
    None = 0b0_0000,
    Upper256K = 0b0_0001,
    Upper512K = 0b0_0010,
    Upper1M = 0b0_0011,
    Upper2M = 0b0_0100,
    Upper4M = 0b0_0101,
    Upper8M = 0b0_0110,
    Upper16M = 0b0_0111,
    Upper32M = 0b0_1000,
    Upper64M = 0b0_1001,
    All = 0b0_1100,
    Lower256K = 0b1_0001,
    Lower512K = 0b1_0010,
    Lower1M = 0b1_0011,
    Lower2M = 0b1_0100,
    Lower4M = 0b1_0101,
    Lower8M = 0b1_0110,
    Lower16M = 0b1_0111,
    Lower32M = 0b1_1000,
    Lower64M = 0b1_1001,
}

impl BlockProtect {
    /// Bit pattern for the BP and TB fields of the protection register
    pub fn register_bits(self) -> u8 {
        let mode = self as u8;
        ((mode & 0x0F) << reg::BP_OFFSET) | (((mode >> 4) & 0x01) << reg::TB_OFFSET)
    }
}

impl<SPI: SpiDevice, D: DelayNs> ExtFlash<SPI, D> {
    /// Check the busy bit
    pub fn is_busy(&mut self) -> Result<bool, FlashError<SPI::Error>> {
        let status = self.read_status_register(reg::STATUS)?;
        Ok(status & reg::BUSY_MASK != 0)
    }

    /// Check the write-enable latch
    pub fn is_write_enabled(&mut self) -> Result<bool, FlashError<SPI::Error>> {
        let status = self.read_status_register(reg::STATUS)?;
        Ok(status & reg::WEL_MASK != 0)
    }

    /// Read the ECC result of the last read operation
    pub fn check_ecc(&mut self) -> Result<EccStatus, FlashError<SPI::Error>> {
        let status = self.read_status_register(reg::STATUS)?;
        Ok(EccStatus::from_status(status))
    }

    /// Check the erase-fail and program-fail bits.
    ///
    /// Reading does not clear the condition; it persists until the next
    /// erase or program operation overwrites it.
    pub fn check_fail(&mut self) -> Result<(), FlashError<SPI::Error>> {
        let status = self.read_status_register(reg::STATUS)?;
        if status & reg::EFAIL_MASK != 0 {
            info!("erase fail bit set");
            return Err(FlashError::EraseFailed);
        }
        if status & reg::PFAIL_MASK != 0 {
            info!("program fail bit set");
            return Err(FlashError::ProgramFailed);
        }
        Ok(())
    }

    /// Poll the busy bit until it clears, sleeping
    /// [`crate::PollTimings::poll_interval_ms`] between polls. The poll
    /// budget is `timeout_ms / poll_interval_ms`, minimum one.
    pub(crate) fn wait_while_busy(&mut self, timeout_ms: u32) -> Result<(), FlashError<SPI::Error>> {
        let interval = self.timings.poll_interval_ms.max(1);
        let budget = (timeout_ms / interval).max(1);
        for _ in 0..budget {
            if !self.is_busy()? {
                return Ok(());
            }
            self.delay.delay_ms(interval);
        }
        error!("busy bit did not clear within {} ms", timeout_ms);
        Err(FlashError::Timeout)
    }

    /// Configure block protection.
    ///
    /// Read-modify-write of the protection register followed by a
    /// readback compare; a mismatch is a hard failure with no rewrite
    /// attempt.
    pub fn set_block_protect(&mut self, mode: BlockProtect) -> Result<(), FlashError<SPI::Error>> {
        let mut value = self.read_status_register(reg::PROTECTION)?;
        value &= !(reg::BP_MASK | reg::TB_MASK);
        value |= mode.register_bits();

        self.write_status_register(reg::PROTECTION, value)?;

        let readback = self.read_status_register(reg::PROTECTION)?;
        if readback != value {
            error!("protection register verify mismatch");
            return Err(FlashError::VerifyFailed);
        }
        Ok(())
    }
}
