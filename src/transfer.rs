use embedded_hal::spi::SpiDevice;

use crate::device::ExtFlash;
use crate::error::FlashError;

/// Upper bound on one SPI exchange: command overhead plus a full page
/// of payload in each direction. Frames larger than this are rejected
/// before touching the bus.
pub const MAX_TRANSFER_SIZE: usize = 2112;

/// Placement of the dummy bytes within the outbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum DummyPosition {
    /// Between the opcode and the address
    BeforeAddress,
    /// Between the address and the data phase
    AfterAddress,
}

/// One device command as a linear wire frame. Built fresh for every
/// exchange and never retained across calls.
#[derive(Debug)]
pub(crate) struct Transfer<'a> {
    pub opcode: u8,
    pub dummy_cycles: usize,
    pub dummy_position: DummyPosition,
    /// Address bytes, MSB first, 0 to 4 of them
    pub addr: &'a [u8],
    /// Outbound payload, written after the address phase
    pub tx: &'a [u8],
}

impl<'a> Transfer<'a> {
    /// Frame with no address and no payload
    pub fn bare(opcode: u8) -> Self {
        Transfer {
            opcode,
            dummy_cycles: 0,
            dummy_position: DummyPosition::BeforeAddress,
            addr: &[],
            tx: &[],
        }
    }
}

impl<SPI: SpiDevice, D> ExtFlash<SPI, D> {
    /// Issue one full-duplex exchange for `xfer`, reading `rx.len()`
    /// bytes back after the outbound frame.
    ///
    /// The outbound frame is opcode, dummy bytes before or after the
    /// address per [`DummyPosition`], address, payload. The device
    /// clocks out meaningful data only after the full outbound frame,
    /// so the receive scratch spans the whole exchange and only the
    /// suffix past the transmit length is copied into `rx`.
    pub(crate) fn exchange(
        &mut self,
        xfer: Transfer<'_>,
        rx: &mut [u8],
    ) -> Result<(), FlashError<SPI::Error>> {
        let tx_len = 1 + xfer.dummy_cycles + xfer.addr.len() + xfer.tx.len();
        let total = tx_len + rx.len();
        if total > MAX_TRANSFER_SIZE {
            error!("transfer of {} bytes exceeds frame buffer", total);
            return Err(FlashError::InvalidParams);
        }

        let mut frame = [0u8; MAX_TRANSFER_SIZE];
        let mut echo = [0u8; MAX_TRANSFER_SIZE];

        frame[0] = xfer.opcode;
        let mut len = 1;
        if xfer.dummy_position == DummyPosition::BeforeAddress {
            len += xfer.dummy_cycles;
        }
        frame[len..len + xfer.addr.len()].copy_from_slice(xfer.addr);
        len += xfer.addr.len();
        if xfer.dummy_position == DummyPosition::AfterAddress {
            len += xfer.dummy_cycles;
        }
        frame[len..len + xfer.tx.len()].copy_from_slice(xfer.tx);

        trace!("tx_len: {}, rx_len: {}", tx_len, total);
        self.spi
            .transfer(&mut echo[..total], &frame[..total])
            .map_err(FlashError::Spi)?;

        rx.copy_from_slice(&echo[tx_len..total]);
        Ok(())
    }
}
