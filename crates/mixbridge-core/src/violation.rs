//! Internal-consistency violation reporting
//!
//! Programming errors detected at the control/engine boundary (loading a
//! missing preset, registering a channel twice, tearing down a chain with
//! effects still loaded) are logged and counted. Execution continues with
//! the operation aborted or defensively corrected.

use std::sync::atomic::{AtomicUsize, Ordering};

static VIOLATION_COUNT: AtomicUsize = AtomicUsize::new(0);

#[doc(hidden)]
pub fn record() {
    VIOLATION_COUNT.fetch_add(1, Ordering::Relaxed);
}

/// Number of violations reported since process start
pub fn violation_count() -> usize {
    VIOLATION_COUNT.load(Ordering::Relaxed)
}

/// Log an internal-consistency violation with its source location
#[macro_export]
macro_rules! report_violation {
    ($($arg:tt)+) => {{
        $crate::violation::record();
        ::log::error!(
            "internal consistency violation at {}:{}: {}",
            file!(),
            line!(),
            format_args!($($arg)+)
        );
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_counter_increments() {
        let before = violation_count();
        crate::report_violation!("test violation {}", 1);
        assert!(violation_count() > before);
    }
}
