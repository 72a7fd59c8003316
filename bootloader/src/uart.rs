// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Polled byte link over the legacy UART0 peripheral.
//!
//! The receiver needs a non-blocking "is there a byte" check, which the
//! EasyDMA UARTE driver does not offer, so the registers are driven directly.

use consts::{BAUD_RATE, UART_RX_PIN, UART_TX_PIN};
use embassy_nrf::gpio::{Input, Level, Output, OutputDrive, Pin, Pull};
use embassy_nrf::Peripheral;
use nrf52805_pac::{uart0, UART0};
use update_engine::SerialLink;

// The BAUDRATE register is set for this rate below.
const _: () = assert!(BAUD_RATE == 9600);

pub struct Uart<'d> {
    regs: &'static uart0::RegisterBlock,
    // Pin configuration must outlive the peripheral.
    _rx: Input<'d>,
    _tx: Output<'d>,
}

impl<'d> Uart<'d> {
    /// `rx` and `tx` must be the pins numbered [`UART_RX_PIN`] and [`UART_TX_PIN`].
    pub fn new(
        rx: impl Peripheral<P = impl Pin> + 'd,
        tx: impl Peripheral<P = impl Pin> + 'd,
    ) -> Self {
        let rx = Input::new(rx, Pull::None);
        // Idle line is high.
        let tx = Output::new(tx, Level::High, OutputDrive::Standard);

        // SAFETY: UART0 is not handed to any embassy driver.
        let regs = unsafe { &*UART0::ptr() };
        regs.psel.rxd.write(|w| unsafe { w.pin().bits(UART_RX_PIN).connect().connected() });
        regs.psel.txd.write(|w| unsafe { w.pin().bits(UART_TX_PIN).connect().connected() });
        regs.psel.rts.write(|w| w.connect().disconnected());
        regs.psel.cts.write(|w| w.connect().disconnected());
        regs.baudrate.write(|w| w.baudrate().baud9600());
        regs.config.write(|w| w.parity().excluded().hwfc().disabled());
        regs.enable.write(|w| w.enable().enabled());

        regs.events_rxdrdy.reset();
        regs.events_txdrdy.reset();
        regs.tasks_startrx.write(|w| unsafe { w.bits(1) });
        regs.tasks_starttx.write(|w| unsafe { w.bits(1) });

        Self { regs, _rx: rx, _tx: tx }
    }
}

impl SerialLink for Uart<'_> {
    fn try_read_byte(&mut self) -> Option<u8> {
        if self.regs.events_rxdrdy.read().bits() == 0 {
            return None;
        }
        self.regs.events_rxdrdy.reset();
        Some(self.regs.rxd.read().rxd().bits())
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.regs.txd.write(|w| unsafe { w.txd().bits(byte) });
            while self.regs.events_txdrdy.read().bits() == 0 {}
            self.regs.events_txdrdy.reset();
        }
    }
}

impl Drop for Uart<'_> {
    fn drop(&mut self) {
        self.regs.tasks_stoprx.write(|w| unsafe { w.bits(1) });
        self.regs.tasks_stoptx.write(|w| unsafe { w.bits(1) });
        self.regs.enable.write(|w| w.enable().disabled());
    }
}
