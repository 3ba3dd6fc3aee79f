//! Runtime invariant checks with contract-test bookkeeping
//!
//! Session invariants are asserted where the bridge changes state, which is
//! partly on the caller's thread and partly on the session's background
//! context. The log of checked invariants is therefore process-wide, so a
//! test can confirm that an invariant was exercised no matter which thread
//! checked it.
//!
//! # Usage
//!
//! ```rust,ignore
//! use uvcbridge::invariant_ppt::*;
//!
//! assert_invariant!(
//!     state.phase() == SessionPhase::Idle,
//!     "Previous session is torn down before a new preview starts",
//!     "start_preview"
//! );
//!
//! #[test]
//! fn contract_session_lifecycle() {
//!     contract_test("session lifecycle", &[
//!         "Previous session is torn down before a new preview starts",
//!     ]);
//! }
//! ```

use std::collections::HashSet;
use std::sync::Mutex;

lazy_static::lazy_static! {
    static ref INVARIANT_LOG: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
}

/// Assert an invariant and record it for contract testing.
///
/// # Panics
/// Panics if the condition is false.
#[macro_export]
macro_rules! assert_invariant {
    ($condition:expr, $message:expr) => {
        $crate::invariant_ppt::__assert_invariant_impl($condition, $message, None)
    };
    ($condition:expr, $message:expr, $context:expr) => {
        $crate::invariant_ppt::__assert_invariant_impl($condition, $message, Some($context))
    };
}

#[doc(hidden)]
pub fn __assert_invariant_impl(condition: bool, message: &str, context: Option<&str>) {
    if let Ok(mut log) = INVARIANT_LOG.lock() {
        log.insert(message.to_string());
    }

    if !condition {
        let ctx = context.unwrap_or("unknown");
        panic!("INVARIANT VIOLATION [{}]: {}", ctx, message);
    }
}

/// Whether an invariant has been checked at least once in this process
pub fn invariant_checked(message: &str) -> bool {
    INVARIANT_LOG
        .lock()
        .map(|log| log.contains(message))
        .unwrap_or(false)
}

/// Check that specific invariants were verified during test execution.
///
/// # Panics
/// Panics if any required invariant was not checked.
pub fn contract_test(test_name: &str, required_invariants: &[&str]) {
    let missing: Vec<&str> = required_invariants
        .iter()
        .copied()
        .filter(|invariant| !invariant_checked(invariant))
        .collect();

    if !missing.is_empty() {
        panic!(
            "CONTRACT FAILURE [{}]: The following invariants were not checked:\n  - {}",
            test_name,
            missing.join("\n  - ")
        );
    }
}
