#![no_std]

/// Size of the bootloader partition at the bottom of flash (32KB).
/// The MCU resets into address 0, so the bootloader owns the vector table
/// at 0x0 and the application image follows directly after it.
pub const BOOTLOADER_SIZE: u32 = 0x8000;

/// First address of the application image region.
/// The application's own vector table starts here: word 0 is the initial
/// stack pointer and word 1 the reset vector.
pub const APP_START_ADDR: u32 = BOOTLOADER_SIZE;

/// One past the last address of the application image region.
/// nRF52805 has 192KB of flash, the application owns everything above the
/// bootloader.
pub const APP_END_ADDR: u32 = 0x30000;

/// Size of a flash erase page in bytes (4KB).
/// The NVMC erases whole pages, so the trailer update rewrites this much.
pub const FLASH_PAGE: usize = 4096;

/// Minimum program unit used by the updater (128 bytes).
/// Received payloads shorter than this are padded with erased bytes before
/// being written. Matches the XMODEM short packet so that mixed 128/1024
/// transfers keep the image contiguous.
pub const PROGRAM_PAGE: u32 = 128;

/// Baud rate of the update link. 8 data bits, no parity, 1 stop bit.
pub const BAUD_RATE: u32 = 9600;

/// Interval between poll bytes while waiting for a sender to start (3s).
pub const POLL_PERIOD_MS: u64 = 3000;

/// Time allowed for a packet to arrive before it is NAKed (7s).
pub const PACKET_TIMEOUT_MS: u64 = 7000;

/// Silence that ends a purge after a damaged frame (1s).
/// At 9600 baud a byte takes about 1ms, so a sender in the middle of a frame
/// never pauses this long. Must stay below [`PACKET_TIMEOUT_MS`], and the
/// sender's reply timeout must exceed both.
pub const PURGE_QUIET_MS: u64 = 1000;

const _: () = assert!(PURGE_QUIET_MS < PACKET_TIMEOUT_MS);

/// UART0 receive pin (P0.16).
pub const UART_RX_PIN: u8 = 16;

/// UART0 transmit pin (P0.18).
pub const UART_TX_PIN: u8 = 18;
