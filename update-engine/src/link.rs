// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Capabilities the receiver is driven by: a byte channel and a clock.

/// Non-blocking, byte-oriented duplex channel.
pub trait SerialLink {
    /// Returns the next received byte, if one is waiting.
    fn try_read_byte(&mut self) -> Option<u8>;

    /// Sends `bytes`, returning once they are queued for transmission.
    fn write_bytes(&mut self, bytes: &[u8]);
}

/// Monotonic millisecond clock.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

impl<T: SerialLink + ?Sized> SerialLink for &mut T {
    fn try_read_byte(&mut self) -> Option<u8> {
        (**self).try_read_byte()
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        (**self).write_bytes(bytes)
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// One-shot timer on top of a [`Clock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Deadline {
    expires_at: u64,
}

impl Deadline {
    pub fn start<C: Clock>(clock: &C, period_ms: u64) -> Self {
        Self { expires_at: clock.now_ms().saturating_add(period_ms) }
    }

    pub fn has_expired<C: Clock>(&self, clock: &C) -> bool {
        clock.now_ms() >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualClock;

    #[test]
    fn deadline_expires_after_period() {
        let clock = ManualClock::new();
        let deadline = Deadline::start(&clock, 3000);
        assert!(!deadline.has_expired(&clock));
        clock.advance(2999);
        assert!(!deadline.has_expired(&clock));
        clock.advance(1);
        assert!(deadline.has_expired(&clock));
    }

    #[test]
    fn deadline_saturates() {
        let clock = ManualClock::new();
        clock.advance(u64::MAX - 10);
        let deadline = Deadline::start(&clock, 100);
        assert!(!deadline.has_expired(&clock));
    }
}
