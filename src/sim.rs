//! Simulated SPI NAND device.
//!
//! Implements [`embedded_hal::spi::SpiDevice`] and answers the same
//! wire frames the driver issues, so the full command choreography can
//! be exercised without hardware. Models the page array with NAND
//! write semantics (program can only clear bits), the device page
//! buffer, the three status registers, busy polling and fault
//! injection.

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::{Error, ErrorKind, ErrorType, Operation, SpiDevice};

use crate::FlashGeometry;

/// Error returned by the simulated bus when failure injection is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimError;

impl Error for SimError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// In-memory flash device behind a SPI bus.
///
/// The array starts erased (all 0xFF) and the protection register
/// starts with the whole array protected, matching the power-on state
/// of the real part.
pub struct SimFlash<const PAGE_SIZE: usize, const PAGES_PER_BLOCK: usize, const BLOCK_COUNT: usize>
{
    storage: [[[u8; PAGE_SIZE]; PAGES_PER_BLOCK]; BLOCK_COUNT],
    buffer: [u8; PAGE_SIZE],
    jedec_id: [u8; 3],
    protection: u8,
    configuration: u8,
    wel: bool,
    efail: bool,
    pfail: bool,
    ecc_bits: u8,
    /// Status reads that still report busy
    busy_reads: u32,
    /// Value loaded into `busy_reads` by erase, program and page read
    busy_after_op: u32,
    /// Number of exchanges observed
    pub transfers: u32,
    /// Number of block-erase commands observed
    pub erase_ops: u32,
    /// Every exchange errors out while set
    pub fail_transfers: bool,
    /// Protection register writes store a corrupted value while set
    pub corrupt_protection_writes: bool,
    /// The next erase sets the erase-fail bit
    pub inject_erase_fail: bool,
    /// The next program sets the program-fail bit
    pub inject_program_fail: bool,
}

impl<const PAGE_SIZE: usize, const PAGES_PER_BLOCK: usize, const BLOCK_COUNT: usize>
    SimFlash<PAGE_SIZE, PAGES_PER_BLOCK, BLOCK_COUNT>
{
    pub fn new() -> Self {
        SimFlash {
            storage: [[[0xFF; PAGE_SIZE]; PAGES_PER_BLOCK]; BLOCK_COUNT],
            buffer: [0xFF; PAGE_SIZE],
            jedec_id: [0xEF, 0xAA, 0x21],
            protection: 0x78,
            configuration: 0x18,
            wel: false,
            efail: false,
            pfail: false,
            ecc_bits: 0b00,
            busy_reads: 0,
            busy_after_op: 1,
            transfers: 0,
            erase_ops: 0,
            fail_transfers: false,
            corrupt_protection_writes: false,
            inject_erase_fail: false,
            inject_program_fail: false,
        }
    }

    /// Geometry matching the const parameters, for driver construction
    pub fn geometry() -> FlashGeometry {
        FlashGeometry {
            total_size: (PAGE_SIZE * PAGES_PER_BLOCK * BLOCK_COUNT) as u32,
            page_size: PAGE_SIZE as u32,
            pages_per_block: PAGES_PER_BLOCK as u32,
            block_count: BLOCK_COUNT as u32,
            ecc_bytes_per_page: 0,
        }
    }

    /// Override the identity returned by the JEDEC command
    pub fn set_jedec_id(&mut self, id: [u8; 3]) {
        self.jedec_id = id;
    }

    /// Set the 2-bit ECC field reported after reads
    pub fn set_ecc_result(&mut self, bits: u8) {
        self.ecc_bits = bits & 0x03;
    }

    /// Set the fail bits directly, as left over from an earlier
    /// operation
    pub fn set_fail_bits(&mut self, efail: bool, pfail: bool) {
        self.efail = efail;
        self.pfail = pfail;
    }

    /// Report busy for the next `polls` status reads
    pub fn force_busy(&mut self, polls: u32) {
        self.busy_reads = polls;
    }

    /// Number of busy polls each erase, program or page read costs
    pub fn set_busy_polls(&mut self, polls: u32) {
        self.busy_after_op = polls;
    }

    /// Raw contents of a page, by flat page index
    pub fn page_data(&self, page: usize) -> &[u8; PAGE_SIZE] {
        &self.storage[page / PAGES_PER_BLOCK][page % PAGES_PER_BLOCK]
    }

    fn read_register(&mut self, addr: u8) -> u8 {
        match addr {
            0xA0 => self.protection,
            0xB0 => self.configuration,
            0xC0 => {
                let busy = self.busy_reads > 0;
                if busy {
                    self.busy_reads -= 1;
                }
                let mut value = (self.ecc_bits & 0x03) << 4;
                if busy {
                    value |= 0x01;
                }
                if self.wel {
                    value |= 0x02;
                }
                if self.efail {
                    value |= 0x04;
                }
                if self.pfail {
                    value |= 0x08;
                }
                value
            }
            _ => 0,
        }
    }

    fn write_register(&mut self, addr: u8, value: u8) {
        match addr {
            0xA0 => {
                self.protection = if self.corrupt_protection_writes {
                    value ^ 0x08
                } else {
                    value
                };
            }
            0xB0 => self.configuration = value,
            _ => {}
        }
    }

    fn erase_block_of(&mut self, page: usize) {
        self.erase_ops += 1;
        self.efail = false;
        self.pfail = false;
        if self.wel {
            for p in self.storage[page / PAGES_PER_BLOCK].iter_mut() {
                p.fill(0xFF);
            }
            self.efail = self.inject_erase_fail;
        } else {
            // erase without write enable fails
            self.efail = true;
        }
        self.wel = false;
        self.busy_reads = self.busy_after_op;
    }

    fn program(&mut self, page: usize) {
        self.efail = false;
        self.pfail = false;
        if self.wel {
            let target = &mut self.storage[page / PAGES_PER_BLOCK][page % PAGES_PER_BLOCK];
            for (cell, b) in target.iter_mut().zip(self.buffer.iter()) {
                *cell &= *b;
            }
            self.pfail = self.inject_program_fail;
        } else {
            self.pfail = true;
        }
        self.wel = false;
        self.busy_reads = self.busy_after_op;
    }

    fn load_page(&mut self, page: usize) {
        self.buffer
            .copy_from_slice(&self.storage[page / PAGES_PER_BLOCK][page % PAGES_PER_BLOCK]);
        self.busy_reads = self.busy_after_op;
    }

    fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) {
        rx.fill(0);
        if tx.is_empty() {
            return;
        }
        let page_arg = |tx: &[u8]| u16::from_be_bytes([tx[1], tx[2]]) as usize;
        match tx[0] {
            0x9F => {
                // opcode + one dummy byte, then 3 identity bytes
                for (i, b) in self.jedec_id.iter().enumerate() {
                    if let Some(slot) = rx.get_mut(2 + i) {
                        *slot = *b;
                    }
                }
            }
            0x0F => {
                let value = self.read_register(tx[1]);
                if let Some(slot) = rx.get_mut(2) {
                    *slot = value;
                }
            }
            0x1F => self.write_register(tx[1], tx[2]),
            0x06 => self.wel = true,
            0x04 => self.wel = false,
            0xD8 => {
                let page = page_arg(tx);
                self.erase_block_of(page);
            }
            0x02 => {
                let col = page_arg(tx);
                self.buffer.fill(0xFF);
                self.buffer[col..col + tx.len() - 3].copy_from_slice(&tx[3..]);
            }
            0x84 => {
                let col = page_arg(tx);
                self.buffer[col..col + tx.len() - 3].copy_from_slice(&tx[3..]);
            }
            0x10 => {
                let page = page_arg(tx);
                self.program(page);
            }
            0x13 => {
                let page = page_arg(tx);
                self.load_page(page);
            }
            0x03 => {
                // opcode + column + one dummy byte, then buffer data
                let col = page_arg(tx);
                for (i, slot) in rx.iter_mut().skip(4).enumerate() {
                    *slot = self.buffer[col + i];
                }
            }
            _ => {}
        }
    }
}

impl<const PAGE_SIZE: usize, const PAGES_PER_BLOCK: usize, const BLOCK_COUNT: usize> Default
    for SimFlash<PAGE_SIZE, PAGES_PER_BLOCK, BLOCK_COUNT>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const PAGE_SIZE: usize, const PAGES_PER_BLOCK: usize, const BLOCK_COUNT: usize> ErrorType
    for SimFlash<PAGE_SIZE, PAGES_PER_BLOCK, BLOCK_COUNT>
{
    type Error = SimError;
}

impl<const PAGE_SIZE: usize, const PAGES_PER_BLOCK: usize, const BLOCK_COUNT: usize> SpiDevice
    for SimFlash<PAGE_SIZE, PAGES_PER_BLOCK, BLOCK_COUNT>
{
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        for op in operations {
            match op {
                Operation::Transfer(read, write) => {
                    self.transfers += 1;
                    if self.fail_transfers {
                        return Err(SimError);
                    }
                    let tx: &[u8] = *write;
                    let rx: &mut [u8] = &mut **read;
                    self.exchange(tx, rx);
                }
                _ => return Err(SimError),
            }
        }
        Ok(())
    }
}

/// Delay provider that only accumulates the requested time
#[derive(Debug, Default, Clone, Copy)]
pub struct SimDelay {
    pub elapsed_ns: u64,
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += ns as u64;
    }
}
