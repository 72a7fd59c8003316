// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! CRC-16 used both on the wire and for the image trailer.
//!
//! XMODEM-1K flavour of CRC-16/CCITT: polynomial 0x1021, initial value 0,
//! MSB first, no reflection and no final XOR.

use crc::{Crc, Digest, CRC_16_XMODEM};

static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// CRC of a contiguous span of bytes.
pub fn checksum(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Incremental form of [`checksum`].
///
/// Feeding consecutive spans gives the same result as a single
/// [`checksum`] over their concatenation.
pub struct Checksum {
    digest: Digest<'static, u16>,
}

impl Checksum {
    pub fn new() -> Self {
        Self { digest: CRC16.digest() }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    pub fn finalize(self) -> u16 {
        self.digest.finalize()
    }
}

impl Default for Checksum {
    fn default() -> Self {
        Self::new()
    }
}
