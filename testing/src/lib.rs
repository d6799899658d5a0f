//! # Farm MFA Testing
//!
//! Testing utilities for the farm MFA crates:
//! - deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - a Given-When-Then helper for reducers ([`ReducerTest`])
//! - effect assertions ([`assertions`])
//!
//! ## Example
//!
//! ```ignore
//! use farm_mfa_testing::{ManualClock, test_clock};
//!
//! let clock = ManualClock::new(test_clock().now());
//! clock.advance(chrono::Duration::seconds(301));
//! ```

use chrono::{DateTime, Utc};
use farm_mfa_core::environment::Clock;

/// Reducer testing utilities
pub mod reducer_test;

/// Mock clock implementations.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use farm_mfa_testing::mocks::FixedClock;
    /// use farm_mfa_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Clones share the same instant, so a test can keep one handle and move
    /// time under a component that owns another.
    ///
    /// ```
    /// use farm_mfa_testing::mocks::ManualClock;
    /// use farm_mfa_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = ManualClock::new(Utc::now());
    /// let start = clock.now();
    /// clock.advance(Duration::seconds(90));
    /// assert_eq!(clock.now() - start, Duration::seconds(90));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock frozen at `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward (or backward for negative durations).
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute instant.
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};
