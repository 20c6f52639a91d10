//! gmon-profile global module: process-wide switches set from the command line.

use lazy_static::lazy_static;
use std::sync::atomic::{AtomicBool, Ordering};

lazy_static! {
    static ref VERBOSE: AtomicBool = AtomicBool::default();
}

/// Turns reporting of decoding and loading progress on or off.
pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::Relaxed);
}

/// Checks if progress of decoding and loading is reported.
pub fn verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}
