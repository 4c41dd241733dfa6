use crate::status::EccStatus;

/// Error type for the flash driver.
///
/// Generic over the SPI error type (SE) so the underlying
/// [`embedded_hal::spi::SpiDevice`] error surfaces unmodified.
#[derive(Debug, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlashError<SE> {
    /// Error reported by the SPI peripheral. Never retried.
    #[error("SpiDevice error: {0}")]
    Spi(SE),
    /// The JEDEC ID read at init did not match any registered device
    #[error("device identity mismatch")]
    DetectFailed,
    /// The busy bit did not clear within the poll budget
    #[error("busy-wait timed out")]
    Timeout,
    /// Requested range out of bounds, or a frame larger than the
    /// transfer scratch buffer. Raised before any transport call.
    #[error("invalid parameters")]
    InvalidParams,
    /// Erase-fail bit set after a block erase.
    /// Can happen if the block is protected, write is disabled or the block has failed.
    #[error("erase failed")]
    EraseFailed,
    /// Program-fail bit set after a program execute.
    /// Can happen if the block is protected, write is disabled or the block has failed.
    #[error("program failed")]
    ProgramFailed,
    /// Read completed but the device reported an uncorrectable ECC result
    #[error("read failed with ECC result {0:?}")]
    Ecc(EccStatus),
    /// Protection register readback did not match the written value
    #[error("register verify mismatch")]
    VerifyFailed,
}
