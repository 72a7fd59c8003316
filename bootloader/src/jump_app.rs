// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later
use consts::APP_START_ADDR;
use cortex_m::peripheral::{NVIC, SCB};
use defmt::info;
use embassy_nrf::interrupt::Interrupt;
use update_engine::EntryDescriptor;

/// Boots the application whose vector table sits at [`APP_START_ADDR`].
///
/// # Safety
///
/// This modifies the stack pointer and reset vector and will run code placed in the image region.
/// `entry` must come from an image that passed the checksum.
pub unsafe fn jump_to_app(entry: EntryDescriptor) -> ! {
    info!("msp = {=u32:x}, rv = {=u32:x}", entry.stack_pointer, entry.reset_vector);

    // Nothing the bootloader enabled may fire once the application runs.
    cortex_m::interrupt::disable();
    NVIC::mask(Interrupt::RTC1);
    NVIC::mask(Interrupt::UARTE0_UART0);

    let scb = &*SCB::PTR;
    scb.vtor.write(APP_START_ADDR);
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
    cortex_m::interrupt::enable();

    // These instructions perform the following operations:
    //
    // * Modify control register to use MSP as stack pointer (clear spsel bit)
    // * Synchronize instruction barrier
    // * Initialize stack pointer from the image
    // * Set link register to not return (0xFF)
    // * Jump to the image reset vector
    core::arch::asm!(
        "mrs {tmp}, CONTROL",
        "bics {tmp}, {spsel}",
        "msr CONTROL, {tmp}",
        "isb",
        "msr MSP, {msp}",
        "mov lr, {new_lr}",
        "bx {rv}",
        // `out(reg) _` is not permitted in a `noreturn` asm! call,
        // so instead use `in(reg) 0` and don't restore it afterwards.
        tmp = in(reg) 0,
        spsel = in(reg) 2,
        new_lr = in(reg) 0xFFFFFFFFu32,
        msp = in(reg) entry.stack_pointer,
        rv = in(reg) entry.reset_vector,
        options(noreturn),
    );
}
