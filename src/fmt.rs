//! Logging shims.
//!
//! The crate logs through whichever backend the firmware enabled: `log`, `defmt`
//! or raw `esp-println`. With none of the features set every macro compiles to
//! nothing, but still borrows its arguments so call sites don't warn.
//!
//! Arguments must be printable by every backend, so stick to `&str`, integers
//! and the crate's own error enums (which derive `defmt::Format`).
#![allow(unused_macros)]

macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::trace!($s $(, $x)*);
            #[cfg(feature = "defmt")]
            ::defmt::trace!($s $(, $x)*);
            #[cfg(not(any(feature = "log", feature = "defmt")))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::debug!($s $(, $x)*);
            #[cfg(feature = "defmt")]
            ::defmt::debug!($s $(, $x)*);
            #[cfg(not(any(feature = "log", feature = "defmt")))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::info!($s $(, $x)*);
            #[cfg(feature = "defmt")]
            ::defmt::info!($s $(, $x)*);
            #[cfg(feature = "esp32-log")]
            ::esp_println::println!(concat!("INFO  ", $s) $(, $x)*);
            #[cfg(not(any(feature = "log", feature = "defmt", feature = "esp32-log")))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::warn!($s $(, $x)*);
            #[cfg(feature = "defmt")]
            ::defmt::warn!($s $(, $x)*);
            #[cfg(feature = "esp32-log")]
            ::esp_println::println!(concat!("WARN  ", $s) $(, $x)*);
            #[cfg(not(any(feature = "log", feature = "defmt", feature = "esp32-log")))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! error {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::error!($s $(, $x)*);
            #[cfg(feature = "defmt")]
            ::defmt::error!($s $(, $x)*);
            #[cfg(feature = "esp32-log")]
            ::esp_println::println!(concat!("ERROR ", $s) $(, $x)*);
            #[cfg(not(any(feature = "log", feature = "defmt", feature = "esp32-log")))]
            let _ = ($( & $x ),*);
        }
    };
}
