// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Image region programming on top of an `embedded-storage` NOR flash.
//!
//! The region's last word holds the trailer: the CRC of every byte before
//! it, stored in the low half-word. It shares an erase page with the tail of
//! the application, so it is only ever rewritten by copying the whole page
//! out, patching the word and writing the page back.

use embedded_storage::nor_flash::NorFlash;

use crate::crc::Checksum;
use crate::error::{FlashError, LayoutError};
use crate::xmodem::LONG_PAYLOAD_LEN;

/// Length of the trailer word at the end of the image region.
pub const TRAILER_LEN: u32 = 4;

/// Trailer value of a blank region.
pub const ERASED_TRAILER: u16 = 0xFFFF;

/// Value of an erased flash byte, used to pad short writes.
pub const ERASED_BYTE: u8 = 0xFF;

// Stack pointer and reset vector at the start of the image.
const ENTRY_LEN: u32 = 8;
const VERIFY_CHUNK: usize = 64;
const SCAN_CHUNK: usize = 256;

/// Location of the application image in flash, as driver offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImageLayout {
    start: u32,
    end: u32,
    program_page: u32,
}

impl ImageLayout {
    /// Describes the region `[start, end)` written in units of `program_page`.
    pub const fn new(start: u32, end: u32, program_page: u32) -> Result<Self, LayoutError> {
        if end <= start {
            return Err(LayoutError::Empty);
        }
        if program_page == 0 || program_page % 4 != 0 || program_page as usize > LONG_PAYLOAD_LEN {
            return Err(LayoutError::BadProgramPage);
        }
        if (end - start) % program_page != 0 {
            return Err(LayoutError::NotPageMultiple);
        }
        if end - start < ENTRY_LEN + TRAILER_LEN {
            return Err(LayoutError::TooSmall);
        }
        Ok(Self { start, end, program_page })
    }

    pub const fn start(&self) -> u32 {
        self.start
    }

    pub const fn end(&self) -> u32 {
        self.end
    }

    /// Offset of the trailer word.
    pub const fn trailer_offset(&self) -> u32 {
        self.end - TRAILER_LEN
    }

    /// Number of bytes covered by the trailer checksum.
    pub const fn image_len(&self) -> u32 {
        self.trailer_offset() - self.start
    }
}

/// Sequences erase, write and verify over the image region.
///
/// `SECTOR` is the driver's erase page size; it sizes the scratch buffer of
/// the trailer read-modify-write and must equal `F::ERASE_SIZE`.
pub struct FlashProgrammer<F, const SECTOR: usize> {
    flash: F,
    layout: ImageLayout,
    cursor: u32,
    erased: bool,
}

impl<F: NorFlash, const SECTOR: usize> FlashProgrammer<F, SECTOR> {
    pub fn new(flash: F, layout: ImageLayout) -> Result<Self, LayoutError> {
        let sector = SECTOR as u32;
        if SECTOR != F::ERASE_SIZE || layout.start % sector != 0 || layout.end % sector != 0 {
            return Err(LayoutError::NotEraseAligned);
        }
        if layout.program_page as usize % F::WRITE_SIZE != 0 {
            return Err(LayoutError::BadProgramPage);
        }
        if layout.end as usize > flash.capacity() {
            return Err(LayoutError::OutOfFlash);
        }
        Ok(Self {
            flash,
            layout,
            cursor: layout.start,
            erased: false,
        })
    }

    pub fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    /// Next offset a packet will be written to.
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Bytes programmed since the session started.
    pub fn written(&self) -> u32 {
        self.cursor - self.layout.start
    }

    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Rewinds the write cursor to the region start and forgets any erase
    /// done by a previous session.
    pub fn begin_session(&mut self) {
        self.cursor = self.layout.start;
        self.erased = false;
    }

    /// Erases the whole image region, at most once per session.
    pub fn erase_region(&mut self) -> Result<(), FlashError> {
        if self.erased {
            return Ok(());
        }
        info!("Erasing image region {:#x}..{:#x}", self.layout.start, self.layout.end);
        self.flash
            .erase(self.layout.start, self.layout.end)
            .map_err(FlashError::from_driver)?;
        self.erased = true;
        Ok(())
    }

    /// Writes `data` at the cursor and verifies it.
    ///
    /// Data shorter than a program page is padded with erased bytes up to a
    /// full page. The cursor advances by the written length only once the
    /// read-back matches; on any error it stays put so the same packet can
    /// be written again.
    pub fn program(&mut self, data: &[u8]) -> Result<(), FlashError> {
        if data.is_empty() {
            return Err(FlashError::NoData);
        }
        self.erase_region()?;

        let page = self.layout.program_page as usize;
        let mut staging = [ERASED_BYTE; LONG_PAYLOAD_LEN];
        let chunk = if data.len() < page {
            staging[..data.len()].copy_from_slice(data);
            &staging[..page]
        } else {
            data
        };

        let offset = self.cursor;
        let len = chunk.len() as u32;
        match offset.checked_add(len) {
            Some(end) if end <= self.layout.end => {}
            _ => return Err(FlashError::OutOfBounds { offset, len }),
        }

        self.flash.write(offset, chunk).map_err(FlashError::from_driver)?;
        self.verify(offset, chunk)?;
        self.cursor = offset + len;
        debug!("Programmed {} bytes at {:#x}", len, offset);
        Ok(())
    }

    pub fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), FlashError> {
        self.flash.read(offset, bytes).map_err(FlashError::from_driver)
    }

    /// Current trailer value; [`ERASED_TRAILER`] on a blank region.
    pub fn read_trailer(&mut self) -> Result<u16, FlashError> {
        let mut word = [0u8; TRAILER_LEN as usize];
        self.read(self.layout.trailer_offset(), &mut word)?;
        Ok(u16::from_le_bytes([word[0], word[1]]))
    }

    /// Replaces the trailer word, preserving every other byte of its page.
    pub fn write_trailer(&mut self, value: u16) -> Result<(), FlashError> {
        let page_start = self.layout.end - SECTOR as u32;
        let mut scratch = [0u8; SECTOR];
        self.read(page_start, &mut scratch)?;

        let at = (self.layout.trailer_offset() - page_start) as usize;
        scratch[at..at + TRAILER_LEN as usize].copy_from_slice(&u32::from(value).to_le_bytes());

        self.flash
            .erase(page_start, self.layout.end)
            .map_err(FlashError::from_driver)?;
        self.flash.write(page_start, &scratch).map_err(FlashError::from_driver)?;
        self.verify(page_start, &scratch)?;
        info!("Trailer set to {:#x}", value);
        Ok(())
    }

    /// Forces the next boot into update mode.
    pub fn invalidate(&mut self) -> Result<(), FlashError> {
        self.write_trailer(0)
    }

    /// CRC of the region up to, not including, the trailer.
    pub fn image_checksum(&mut self) -> Result<u16, FlashError> {
        let mut crc = Checksum::new();
        let mut buf = [0u8; SCAN_CHUNK];
        let end = self.layout.trailer_offset();
        let mut offset = self.layout.start;
        while offset < end {
            let n = core::cmp::min(SCAN_CHUNK as u32, end - offset) as usize;
            self.read(offset, &mut buf[..n])?;
            crc.update(&buf[..n]);
            offset += n as u32;
        }
        Ok(crc.finalize())
    }

    fn verify(&mut self, offset: u32, expected: &[u8]) -> Result<(), FlashError> {
        let mut buf = [0u8; VERIFY_CHUNK];
        let mut at = offset;
        for part in expected.chunks(VERIFY_CHUNK) {
            let actual = &mut buf[..part.len()];
            self.read(at, actual)?;
            if actual != part {
                warn!("Verify mismatch near {:#x}", at);
                return Err(FlashError::VerifyMismatch { offset: at });
            }
            at += part.len() as u32;
        }
        Ok(())
    }
}
