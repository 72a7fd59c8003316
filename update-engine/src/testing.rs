// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Test doubles for the flash driver, serial link and clock.

use std::cell::Cell;
use std::collections::VecDeque;

use embedded_storage::nor_flash::{ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash};

use crate::link::{Clock, SerialLink};
use crate::xmodem::{encode_packet, MAX_PACKET_LEN};

pub const TEST_SECTOR: usize = 256;

/// RAM-backed NOR flash: erase sets bytes to 0xFF, writes can only clear bits.
pub struct RamFlash<const N: usize> {
    mem: Vec<u8>,
    pub reads: usize,
    pub bytes_read: usize,
    pub writes: usize,
    pub erases: usize,
    /// Number of upcoming writes that fail without touching memory.
    pub fail_writes: usize,
    /// Number of upcoming writes that land with one bit flipped.
    pub corrupt_writes: usize,
    /// Number of upcoming erases that fail.
    pub fail_erases: usize,
    /// Erases allowed to succeed before every further one fails.
    pub erase_budget: Option<usize>,
}

impl<const N: usize> RamFlash<N> {
    pub fn new() -> Self {
        Self {
            mem: vec![0xFF; N],
            reads: 0,
            bytes_read: 0,
            writes: 0,
            erases: 0,
            fail_writes: 0,
            corrupt_writes: 0,
            fail_erases: 0,
            erase_budget: None,
        }
    }

    pub fn bytes(&self, offset: u32, len: usize) -> &[u8] {
        &self.mem[offset as usize..offset as usize + len]
    }

    /// Writes raw contents bypassing NOR rules and counters.
    pub fn load(&mut self, offset: u32, data: &[u8]) {
        self.mem[offset as usize..offset as usize + data.len()].copy_from_slice(data);
    }

    pub fn reset_counters(&mut self) {
        self.reads = 0;
        self.bytes_read = 0;
        self.writes = 0;
        self.erases = 0;
    }
}

impl<const N: usize> ErrorType for RamFlash<N> {
    type Error = NorFlashErrorKind;
}

impl<const N: usize> ReadNorFlash for RamFlash<N> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let end = start.checked_add(bytes.len()).ok_or(NorFlashErrorKind::OutOfBounds)?;
        if end > N {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        bytes.copy_from_slice(&self.mem[start..end]);
        self.reads += 1;
        self.bytes_read += bytes.len();
        Ok(())
    }

    fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> NorFlash for RamFlash<N> {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = TEST_SECTOR;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        let (from, to) = (from as usize, to as usize);
        if from > to || to > N {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        if from % Self::ERASE_SIZE != 0 || to % Self::ERASE_SIZE != 0 {
            return Err(NorFlashErrorKind::NotAligned);
        }
        if self.fail_erases > 0 {
            self.fail_erases -= 1;
            return Err(NorFlashErrorKind::Other);
        }
        match self.erase_budget {
            Some(0) => return Err(NorFlashErrorKind::Other),
            Some(ref mut left) => *left -= 1,
            None => {}
        }
        self.mem[from..to].fill(0xFF);
        self.erases += 1;
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let end = start.checked_add(bytes.len()).ok_or(NorFlashErrorKind::OutOfBounds)?;
        if end > N {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        if start % Self::WRITE_SIZE != 0 || bytes.len() % Self::WRITE_SIZE != 0 {
            return Err(NorFlashErrorKind::NotAligned);
        }
        if self.fail_writes > 0 {
            self.fail_writes -= 1;
            return Err(NorFlashErrorKind::Other);
        }
        for (dst, src) in self.mem[start..end].iter_mut().zip(bytes) {
            *dst &= *src;
        }
        if self.corrupt_writes > 0 && !bytes.is_empty() {
            self.corrupt_writes -= 1;
            self.mem[start] ^= 0x01;
        }
        self.writes += 1;
        Ok(())
    }
}

/// Clock that only moves when told to, or by `tick` on every reading.
pub struct ManualClock {
    now: Cell<u64>,
    tick: u64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { now: Cell::new(0), tick: 0 }
    }

    /// Clock that advances `tick` ms each time it is read, so timers expire
    /// while [`crate::Receiver::run`] spins on an idle link.
    pub fn ticking(tick: u64) -> Self {
        Self { now: Cell::new(0), tick }
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get().saturating_add(ms));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        let now = self.now.get();
        self.now.set(now.saturating_add(self.tick));
        now
    }
}

/// Serial link fed from a queue; everything written is captured.
#[derive(Default)]
pub struct ScriptedLink {
    pub input: VecDeque<u8>,
    pub output: Vec<u8>,
    /// Sender turns, each released by the next write from the receiver.
    turns: VecDeque<Vec<u8>>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.input.extend(bytes.iter().copied());
    }

    /// Queues `bytes` to arrive only after the receiver's next reply, the
    /// way a sender waits for ACK/NAK before transmitting again.
    pub fn respond(&mut self, bytes: &[u8]) {
        self.turns.push_back(bytes.to_vec());
    }

    /// Everything sent since the last call.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }
}

impl SerialLink for ScriptedLink {
    fn try_read_byte(&mut self) -> Option<u8> {
        self.input.pop_front()
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.output.extend_from_slice(bytes);
        if let Some(turn) = self.turns.pop_front() {
            self.input.extend(turn);
        }
    }
}

/// Wire frame for `payload` with packet number `index`.
pub fn frame(index: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = [0u8; MAX_PACKET_LEN];
    encode_packet(index, payload, &mut buf).unwrap().to_vec()
}

/// Frame whose payload has one byte flipped after the CRC was computed.
pub fn corrupted_frame(index: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = frame(index, payload);
    bytes[3] ^= 0xFF;
    bytes
}

