// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use core::fmt;
use embedded_storage::nor_flash::{NorFlashError, NorFlashErrorKind};

/// Rejected image region description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LayoutError {
    /// `end` is not above `start`.
    Empty,
    /// The region is not a whole number of program pages.
    NotPageMultiple,
    /// Region boundaries do not fall on erase page boundaries.
    NotEraseAligned,
    /// Program page is zero, unaligned, or larger than a long packet.
    BadProgramPage,
    /// The region is smaller than the trailer plus the entry descriptor.
    TooSmall,
    /// The region does not fit inside the flash device.
    OutOfFlash,
}

/// Failure of a flash programmer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// The write would run past the end of the image region.
    OutOfBounds { offset: u32, len: u32 },
    /// Driver refused an access as unaligned.
    NotAligned,
    /// Driver refused an access as out of its bounds.
    DriverOutOfBounds,
    /// Any other driver failure (erase, write or read).
    Driver,
    /// Data read back after a write differs from what was written.
    VerifyMismatch { offset: u32 },
    /// Empty payload handed to the programmer.
    NoData,
}

impl FlashError {
    pub(crate) fn from_driver<E: NorFlashError>(err: E) -> Self {
        match err.kind() {
            NorFlashErrorKind::NotAligned => FlashError::NotAligned,
            NorFlashErrorKind::OutOfBounds => FlashError::DriverOutOfBounds,
            _ => FlashError::Driver,
        }
    }
}

/// Failure of a whole update attempt. The trailer is left invalid in every
/// case so the next boot re-enters update mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateError {
    /// Erasing the image region failed before the transfer started.
    Erase(FlashError),
    /// The freshly written image could not be read back for checksumming.
    Checksum(FlashError),
    /// Installing the trailer failed.
    Trailer(FlashError),
    /// The sender ended the transfer before any packet was accepted.
    EmptyTransfer,
    /// The image checksums to the erased trailer value and cannot be sealed.
    ReservedChecksum,
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            LayoutError::Empty => "image region is empty",
            LayoutError::NotPageMultiple => "image region is not a multiple of the program page",
            LayoutError::NotEraseAligned => "image region is not aligned to erase pages",
            LayoutError::BadProgramPage => "invalid program page size",
            LayoutError::TooSmall => "image region too small",
            LayoutError::OutOfFlash => "image region exceeds flash capacity",
        };
        f.write_str(msg)
    }
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashError::OutOfBounds { offset, len } => {
                write!(f, "write of {} bytes at {:#x} exceeds image region", len, offset)
            }
            FlashError::NotAligned => f.write_str("unaligned flash access"),
            FlashError::DriverOutOfBounds => f.write_str("flash access out of driver bounds"),
            FlashError::Driver => f.write_str("flash driver failure"),
            FlashError::VerifyMismatch { offset } => {
                write!(f, "verification failed at {:#x}", offset)
            }
            FlashError::NoData => f.write_str("no data to program"),
        }
    }
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateError::Erase(e) => write!(f, "erasing image region: {}", e),
            UpdateError::Checksum(e) => write!(f, "checksumming image: {}", e),
            UpdateError::Trailer(e) => write!(f, "writing trailer: {}", e),
            UpdateError::EmptyTransfer => f.write_str("transfer ended without data"),
            UpdateError::ReservedChecksum => {
                f.write_str("image checksum equals the erased trailer value")
            }
        }
    }
}
