//! Logging macros.
//!
//! - `defmt` feature: forwards to the `defmt` macros (firmware builds).
//! - Host unit tests: prints to stdout.
//! - Otherwise: no-op that still borrows every argument.
#![allow(unused_macros)]

macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::trace!($s $(, $x)*);
        #[cfg(all(not(feature = "defmt"), test))]
        println!("[TRACE] {}", format_args!($s $(, $x)*));
        #[cfg(all(not(feature = "defmt"), not(test)))]
        let _ = ($( & $x ),*);
    }};
}

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::debug!($s $(, $x)*);
        #[cfg(all(not(feature = "defmt"), test))]
        println!("[DEBUG] {}", format_args!($s $(, $x)*));
        #[cfg(all(not(feature = "defmt"), not(test)))]
        let _ = ($( & $x ),*);
    }};
}

macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::info!($s $(, $x)*);
        #[cfg(all(not(feature = "defmt"), test))]
        println!("[INFO] {}", format_args!($s $(, $x)*));
        #[cfg(all(not(feature = "defmt"), not(test)))]
        let _ = ($( & $x ),*);
    }};
}

macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::warn!($s $(, $x)*);
        #[cfg(all(not(feature = "defmt"), test))]
        println!("[WARN] {}", format_args!($s $(, $x)*));
        #[cfg(all(not(feature = "defmt"), not(test)))]
        let _ = ($( & $x ),*);
    }};
}

macro_rules! error {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::error!($s $(, $x)*);
        #[cfg(all(not(feature = "defmt"), test))]
        eprintln!("[ERROR] {}", format_args!($s $(, $x)*));
        #[cfg(all(not(feature = "defmt"), not(test)))]
        let _ = ($( & $x ),*);
    }};
}
