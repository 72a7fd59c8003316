// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! One complete update attempt: erase, receive, checksum, install trailer.

use embedded_storage::nor_flash::NorFlash;

use crate::error::UpdateError;
use crate::flash::{FlashProgrammer, ERASED_TRAILER};
use crate::link::{Clock, SerialLink};
use crate::xmodem::{Receiver, SessionReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UpdateOutcome {
    pub report: SessionReport,
    /// Bytes programmed, including page padding.
    pub written: u32,
    /// Checksum installed in the trailer.
    pub checksum: u16,
}

/// Replaces the application image with one received over `receiver`.
///
/// The region is erased first, so the trailer stays blank until the very
/// last step: any failure leaves a device that boots back into update mode.
/// A transfer that delivered no packet is never sealed.
/// On success the caller resets the device.
pub fn run_update<F, L, C, const SECTOR: usize>(
    programmer: &mut FlashProgrammer<F, SECTOR>,
    receiver: &mut Receiver<L, C>,
) -> Result<UpdateOutcome, UpdateError>
where
    F: NorFlash,
    L: SerialLink,
    C: Clock,
{
    programmer.begin_session();
    programmer.erase_region().map_err(|e| {
        error!("Erase failed");
        UpdateError::Erase(e)
    })?;

    let report = receiver.run(|payload| programmer.program(payload));
    if report.packets_accepted == 0 {
        error!("EOT before any packet, image left unsealed");
        return Err(UpdateError::EmptyTransfer);
    }

    let checksum = programmer.image_checksum().map_err(UpdateError::Checksum)?;
    if checksum == ERASED_TRAILER {
        // Would read back as a blank trailer.
        error!("Image checksum is {:#x}, cannot be stored as trailer", checksum);
        return Err(UpdateError::ReservedChecksum);
    }
    programmer.write_trailer(checksum).map_err(|e| {
        error!("Trailer write failed, image stays invalid");
        UpdateError::Trailer(e)
    })?;

    info!("Update installed, {} bytes, checksum {:#x}", programmer.written(), checksum);
    Ok(UpdateOutcome {
        report,
        written: programmer.written(),
        checksum,
    })
}
