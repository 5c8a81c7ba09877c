#![cfg_attr(not(test), no_std)]
#![allow(clippy::upper_case_acronyms, clippy::needless_return)]

use fixed::{types::extra::U32, FixedI64};

pub type Fxd = FixedI64<U32>;

// Diagnostic lines share the response channel. Hosts ignore the DBG: prefix.
#[cfg(feature = "debug_print")]
#[macro_export]
macro_rules! dbg_uwriteln {
    ($out:expr, $($tt:tt)*) => {{
        ufmt::uwrite!($out, "DBG:").ok();
        ufmt::uwriteln!($out, $($tt)*).ok();
    }};
}

#[cfg(not(feature = "debug_print"))]
#[macro_export]
macro_rules! dbg_uwriteln {
    ($out:expr, $($tt:tt)*) => {{
        if false {
            ufmt::uwriteln!($out, $($tt)*).ok();
        }
    }};
}

pub mod pcb_common; // pcb_mapping re-exports these values, so no need to interact with this file.
pub mod pcb_ts_mapping;
pub mod pcb_trs_mapping;
pub mod pcb_xlr_mapping;

// This lets every other file do 'use pcb_mapping', the variant is picked once by cargo feature.
#[cfg(feature = "ts")]
pub use pcb_ts_mapping as pcb_mapping;
#[cfg(all(feature = "trs", not(feature = "ts")))]
pub use pcb_trs_mapping as pcb_mapping;
#[cfg(all(feature = "xlr", not(any(feature = "ts", feature = "trs"))))]
pub use pcb_xlr_mapping as pcb_mapping;

pub mod adc;
pub mod calibration;
pub mod capacitance;
pub mod continuity;
pub mod controller;
pub mod dispatcher;
pub mod encoder;
pub mod profile;
pub mod resistance;
pub mod rig;
pub mod serial;
pub mod shell;
pub mod signal;
#[cfg(any(test, feature = "host"))]
pub mod sim;
pub mod switch_matrix;
pub mod timing;
