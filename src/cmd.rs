//! One encoding recipe per device command, built on the transaction
//! framer. Commands that mutate the array are preceded by a busy-wait
//! so a still-running operation cannot be interrupted.

use embedded_hal::{delay::DelayNs, spi::SpiDevice};

use crate::address::{ColumnAddress, PageIndex};
use crate::device::ExtFlash;
use crate::error::FlashError;
use crate::transfer::{DummyPosition, Transfer};

pub(crate) mod opcode {
    pub const JEDEC_ID: u8 = 0x9F;
    pub const READ_STATUS_REG: u8 = 0x0F;
    pub const WRITE_STATUS_REG: u8 = 0x1F;
    pub const WRITE_ENABLE: u8 = 0x06;
    pub const WRITE_DISABLE: u8 = 0x04;
    pub const BLOCK_ERASE: u8 = 0xD8;
    pub const PROGRAM_DATA_LOAD: u8 = 0x02;
    pub const RANDOM_PROGRAM_DATA_LOAD: u8 = 0x84;
    pub const PROGRAM_EXECUTE: u8 = 0x10;
    pub const PAGE_DATA_READ: u8 = 0x13;
    pub const READ: u8 = 0x03;
}

impl<SPI: SpiDevice, D: DelayNs> ExtFlash<SPI, D> {
    /// Read the 3-byte JEDEC ID of the device
    pub fn read_jedec_id(&mut self) -> Result<[u8; 3], FlashError<SPI::Error>> {
        let mut id = [0u8; 3];
        self.exchange(
            Transfer {
                opcode: opcode::JEDEC_ID,
                dummy_cycles: 1,
                dummy_position: DummyPosition::BeforeAddress,
                addr: &[],
                tx: &[],
            },
            &mut id,
        )?;
        Ok(id)
    }

    /// Read one of the three status registers, selected by register
    /// address (see [`crate::status::reg`])
    pub fn read_status_register(&mut self, reg: u8) -> Result<u8, FlashError<SPI::Error>> {
        let mut value = [0u8; 1];
        self.exchange(
            Transfer {
                opcode: opcode::READ_STATUS_REG,
                dummy_cycles: 0,
                dummy_position: DummyPosition::BeforeAddress,
                addr: &[reg],
                tx: &[],
            },
            &mut value,
        )?;
        Ok(value[0])
    }

    /// Write one of the three status registers
    pub fn write_status_register(
        &mut self,
        reg: u8,
        value: u8,
    ) -> Result<(), FlashError<SPI::Error>> {
        self.wait_while_busy(self.timings.write_timeout_ms)?;
        self.exchange(
            Transfer {
                opcode: opcode::WRITE_STATUS_REG,
                dummy_cycles: 0,
                dummy_position: DummyPosition::BeforeAddress,
                addr: &[reg],
                tx: &[value],
            },
            &mut [],
        )
    }

    /// Set the write-enable latch. Required before erase and program
    /// commands; the device clears it when the operation completes.
    pub fn write_enable(&mut self) -> Result<(), FlashError<SPI::Error>> {
        self.wait_while_busy(self.timings.write_timeout_ms)?;
        self.exchange(Transfer::bare(opcode::WRITE_ENABLE), &mut [])
    }

    /// Clear the write-enable latch
    pub fn write_disable(&mut self) -> Result<(), FlashError<SPI::Error>> {
        self.wait_while_busy(self.timings.write_timeout_ms)?;
        self.exchange(Transfer::bare(opcode::WRITE_DISABLE), &mut [])
    }

    /// Erase the block containing `page`.
    ///
    /// Issues a write-enable first. The device goes busy; callers must
    /// busy-wait and then check the erase-fail bit.
    pub fn block_erase(&mut self, page: PageIndex) -> Result<(), FlashError<SPI::Error>> {
        self.write_enable()?;
        self.wait_while_busy(self.timings.write_timeout_ms)?;
        self.exchange(
            Transfer {
                opcode: opcode::BLOCK_ERASE,
                dummy_cycles: 1,
                dummy_position: DummyPosition::AfterAddress,
                addr: &page.to_wire(),
                tx: &[],
            },
            &mut [],
        )
    }

    /// Load `data` into the device page buffer starting at `column`.
    ///
    /// With `random_load` the rest of the buffer keeps its current
    /// contents; without it the buffer is reset to 0xFF first. Issues a
    /// write-enable before loading.
    pub fn program_load(
        &mut self,
        random_load: bool,
        column: ColumnAddress,
        data: &[u8],
    ) -> Result<(), FlashError<SPI::Error>> {
        self.write_enable()?;
        self.wait_while_busy(self.timings.write_timeout_ms)?;
        let op = if random_load {
            opcode::RANDOM_PROGRAM_DATA_LOAD
        } else {
            opcode::PROGRAM_DATA_LOAD
        };
        self.exchange(
            Transfer {
                opcode: op,
                dummy_cycles: 0,
                dummy_position: DummyPosition::BeforeAddress,
                addr: &column.to_wire(),
                tx: data,
            },
            &mut [],
        )
    }

    /// Program the device page buffer into `page`.
    ///
    /// The device goes busy; callers must busy-wait and then check the
    /// program-fail bit.
    pub fn program_execute(&mut self, page: PageIndex) -> Result<(), FlashError<SPI::Error>> {
        self.wait_while_busy(self.timings.write_timeout_ms)?;
        self.exchange(
            Transfer {
                opcode: opcode::PROGRAM_EXECUTE,
                dummy_cycles: 1,
                dummy_position: DummyPosition::AfterAddress,
                addr: &page.to_wire(),
                tx: &[],
            },
            &mut [],
        )
    }

    /// Load `page` from the array into the device page buffer
    pub fn page_data_read(&mut self, page: PageIndex) -> Result<(), FlashError<SPI::Error>> {
        self.wait_while_busy(self.timings.write_timeout_ms)?;
        self.exchange(
            Transfer {
                opcode: opcode::PAGE_DATA_READ,
                dummy_cycles: 1,
                dummy_position: DummyPosition::AfterAddress,
                addr: &page.to_wire(),
                tx: &[],
            },
            &mut [],
        )
    }

    /// Read `buf.len()` bytes from the device page buffer starting at
    /// `column`. Use [`ExtFlash::page_data_read`] first.
    pub fn read_buffer(
        &mut self,
        column: ColumnAddress,
        buf: &mut [u8],
    ) -> Result<(), FlashError<SPI::Error>> {
        self.wait_while_busy(self.timings.write_timeout_ms)?;
        self.exchange(
            Transfer {
                opcode: opcode::READ,
                dummy_cycles: 1,
                dummy_position: DummyPosition::AfterAddress,
                addr: &column.to_wire(),
                tx: &[],
            },
            buf,
        )
    }
}
