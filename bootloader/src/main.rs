// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]
#![no_main]
mod jump_app;
mod uart;

use defmt_rtt as _;
// global logger
use embassy_nrf as _;
// time driver
use panic_probe as _;

use consts::{APP_END_ADDR, APP_START_ADDR, FLASH_PAGE, PROGRAM_PAGE};
use cortex_m::peripheral::SCB;
use defmt::{error, info, unwrap};
use embassy_executor::Spawner;
use embassy_nrf::nvmc::Nvmc;
use embassy_time::Instant;
use jump_app::jump_to_app;
use uart::Uart;
use update_engine::{decide, run_update, Clock, Decision, FlashProgrammer, ImageLayout, Receiver, Timing};

const LAYOUT: ImageLayout = match ImageLayout::new(APP_START_ADDR, APP_END_ADDR, PROGRAM_PAGE) {
    Ok(layout) => layout,
    Err(_) => panic!("invalid application region"),
};

/// Milliseconds since boot from the embassy time driver.
struct UptimeClock;

impl Clock for UptimeClock {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_nrf::init(Default::default());

    let flash = Nvmc::new(p.NVMC);
    let mut programmer = unwrap!(FlashProgrammer::<_, FLASH_PAGE>::new(flash, LAYOUT));

    match decide(&mut programmer) {
        Decision::Launch(entry) => {
            info!("Starting application");
            drop(programmer);
            unsafe { jump_to_app(entry) }
        }
        Decision::Update => {
            info!("Waiting for image on UART0");
            let link = Uart::new(p.P0_16, p.P0_18);
            let mut receiver = Receiver::new(link, UptimeClock, Timing::default());

            match run_update(&mut programmer, &mut receiver) {
                Ok(outcome) => info!(
                    "Update done: {} bytes, checksum {:#x}, {} NAKs",
                    outcome.written, outcome.checksum, outcome.report.naks_sent
                ),
                // Trailer is still blank, the next boot lands here again.
                Err(e) => error!("Update failed: {}", e),
            }

            // Give the final ACK time to leave the shift register.
            embassy_time::Timer::after_millis(10).await;
            drop(receiver);
            SCB::sys_reset();
        }
    }
}
