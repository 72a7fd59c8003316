// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Generates `memory.x` from the shared memory map so the linker script and
//! the updater agree on where the bootloader ends and the application starts.

use consts::{APP_END_ADDR, BOOTLOADER_SIZE};
use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

fn main() {
    let memory_x_content = format!(
        r##"
        BOOTLOADER_SIZE = {:#X};
        APP_END_ADDR = {:#X};

        MEMORY
        {{
            /* NOTE 1 K = 1 KiBi = 1024 bytes */
            /* The bootloader owns the bottom of flash, the application image follows it */
            FLASH (rx) : ORIGIN = 0x00000000, LENGTH = BOOTLOADER_SIZE
            RAM : ORIGIN = 0x20000000, LENGTH = 24K
        }}

        ASSERT(APP_END_ADDR <= 192K, "application region runs past the end of flash");
        "##,
        BOOTLOADER_SIZE, APP_END_ADDR
    );
    let out = &PathBuf::from(env::var_os("OUT_DIR").unwrap());
    File::create(out.join("memory.x"))
        .unwrap()
        .write_all(memory_x_content.as_bytes())
        .unwrap();
    println!("cargo:rustc-link-search={}", out.display());

    println!("cargo:rerun-if-changed=../consts/src/lib.rs");

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}
