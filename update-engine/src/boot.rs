// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Reset-time decision between launching the application and updating it.

use embedded_storage::nor_flash::NorFlash;

use crate::flash::{FlashProgrammer, ERASED_TRAILER};

/// Where the application wants to start: the first two words of its vector
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EntryDescriptor {
    pub stack_pointer: u32,
    pub reset_vector: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Decision {
    /// A valid image is present, hand control to it.
    Launch(EntryDescriptor),
    /// No valid image, receive a new one.
    Update,
}

/// Checks the image against its trailer.
///
/// A blank trailer is rejected without reading the image. A flash read
/// failure counts as an invalid image.
pub fn is_application_valid<F: NorFlash, const SECTOR: usize>(
    programmer: &mut FlashProgrammer<F, SECTOR>,
) -> bool {
    let trailer = match programmer.read_trailer() {
        Ok(trailer) => trailer,
        Err(_) => {
            warn!("Trailer unreadable");
            return false;
        }
    };
    if trailer == ERASED_TRAILER {
        info!("No application image");
        return false;
    }
    match programmer.image_checksum() {
        Ok(crc) if crc == trailer => true,
        Ok(crc) => {
            warn!("Image checksum {:#x} does not match trailer {:#x}", crc, trailer);
            false
        }
        Err(_) => {
            warn!("Image unreadable");
            false
        }
    }
}

/// Reads the entry descriptor from the start of the image region.
pub fn read_entry<F: NorFlash, const SECTOR: usize>(
    programmer: &mut FlashProgrammer<F, SECTOR>,
) -> Option<EntryDescriptor> {
    let mut words = [0u8; 8];
    let start = programmer.layout().start();
    programmer.read(start, &mut words).ok()?;
    Some(EntryDescriptor {
        stack_pointer: u32::from_le_bytes([words[0], words[1], words[2], words[3]]),
        reset_vector: u32::from_le_bytes([words[4], words[5], words[6], words[7]]),
    })
}

pub fn decide<F: NorFlash, const SECTOR: usize>(programmer: &mut FlashProgrammer<F, SECTOR>) -> Decision {
    if !is_application_valid(programmer) {
        return Decision::Update;
    }
    match read_entry(programmer) {
        Some(entry) => {
            info!(
                "Application valid, sp = {:#x}, reset = {:#x}",
                entry.stack_pointer, entry.reset_vector
            );
            Decision::Launch(entry)
        }
        None => Decision::Update,
    }
}
