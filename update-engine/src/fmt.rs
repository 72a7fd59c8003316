// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Logging shims.
//!
//! On target the engine logs through `defmt`, on the host through the `log`
//! facade. With neither feature enabled the arguments are still type-checked
//! but nothing is emitted.
#![macro_use]
#![allow(unused_macros)]

macro_rules! trace {
    ($($arg:tt)+) => {{
        #[cfg(feature = "defmt")]
        ::defmt::trace!($($arg)+);
        #[cfg(all(feature = "log", not(feature = "defmt")))]
        ::log::trace!($($arg)+);
        #[cfg(not(any(feature = "log", feature = "defmt")))]
        let _ = ($($arg)+);
    }};
}

macro_rules! debug {
    ($($arg:tt)+) => {{
        #[cfg(feature = "defmt")]
        ::defmt::debug!($($arg)+);
        #[cfg(all(feature = "log", not(feature = "defmt")))]
        ::log::debug!($($arg)+);
        #[cfg(not(any(feature = "log", feature = "defmt")))]
        let _ = ($($arg)+);
    }};
}

macro_rules! info {
    ($($arg:tt)+) => {{
        #[cfg(feature = "defmt")]
        ::defmt::info!($($arg)+);
        #[cfg(all(feature = "log", not(feature = "defmt")))]
        ::log::info!($($arg)+);
        #[cfg(not(any(feature = "log", feature = "defmt")))]
        let _ = ($($arg)+);
    }};
}

macro_rules! warn {
    ($($arg:tt)+) => {{
        #[cfg(feature = "defmt")]
        ::defmt::warn!($($arg)+);
        #[cfg(all(feature = "log", not(feature = "defmt")))]
        ::log::warn!($($arg)+);
        #[cfg(not(any(feature = "log", feature = "defmt")))]
        let _ = ($($arg)+);
    }};
}

macro_rules! error {
    ($($arg:tt)+) => {{
        #[cfg(feature = "defmt")]
        ::defmt::error!($($arg)+);
        #[cfg(all(feature = "log", not(feature = "defmt")))]
        ::log::error!($($arg)+);
        #[cfg(not(any(feature = "log", feature = "defmt")))]
        let _ = ($($arg)+);
    }};
}
