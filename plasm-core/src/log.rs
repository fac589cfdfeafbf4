//! Process-wide verbose flag.
//!
//! Set once by the driver from `CompileOptions.verbose`; phase code
//! consults it before emitting debug dumps to stderr.

use core::sync::atomic::{AtomicBool, Ordering};

static VERBOSE: AtomicBool = AtomicBool::new(false);

pub fn set_verbose(on: bool) {
    VERBOSE.store(on, Ordering::Relaxed);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}
