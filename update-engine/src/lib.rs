// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Field firmware updater core.
//! On reset the image region is checked against its CRC trailer; without a
//! valid image a new one is received over XMODEM-1K, programmed into flash
//! and sealed with a fresh trailer.

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible to every module.
mod fmt;

pub mod boot;
pub mod crc;
pub mod error;
pub mod flash;
pub mod link;
pub mod update;
pub mod xmodem;

#[cfg(test)]
mod testing;

pub use boot::{decide, is_application_valid, Decision, EntryDescriptor};
pub use self::crc::{checksum, Checksum};
pub use error::{FlashError, LayoutError, UpdateError};
pub use flash::{FlashProgrammer, ImageLayout};
pub use link::{Clock, Deadline, SerialLink};
pub use update::{run_update, UpdateOutcome};
pub use xmodem::{encode_packet, Event, Receiver, SessionReport, State, Timing};
