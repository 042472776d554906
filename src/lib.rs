//! A thread-safe, re-armable "run once" gate.
//!
//! [`Once`] guarantees that an action runs at most once under concurrent access,
//! like [`std::sync::Once`], with two extensions:
//!
//! - [`Once::call_force`] runs its action even if the gate is already done, and
//!   leaves it done so later ordinary calls are still skipped.
//! - [`Once::reset`] re-arms the gate so the next [`Once::call`] runs again.
//!
//! All three operations are serialized by one futex-backed lock built on
//! `parking_lot`'s parking lot. Actions run while the lock is held, so no caller
//! ever observes a half-run action.
//!
//! # Features
//!
//! - **Zero configuration**: `Once::new()` is `const`, so gates can live in statics.
//! - **Efficient blocking**: waiting callers park instead of spinning.
//! - **Async support**: with the `async-tokio` feature (default), every blocking
//!   operation has an `_async` counterpart that suspends the task while waiting.
//! - **Fallible actions**: a failed action leaves the gate as it was, so a failed
//!   first run is retried and a failed forced refresh keeps the gate done.
//!
//! # Examples
//!
//! ```rust
//! use rearm_once::Once;
//!
//! let gate = Once::new();
//! let mut runs = 0;
//!
//! gate.call_force(|| runs += 1);
//! gate.call(|| runs += 1); // skipped: the forced run left the gate done
//! assert_eq!(runs, 1);
//!
//! gate.call_force(|| runs += 1);
//! assert_eq!(runs, 2);
//!
//! gate.reset();
//! gate.call(|| runs += 1);
//! assert_eq!(runs, 3);
//! ```

/// Error types.
mod error;

/// Re-armable once gate.
mod once;

/// Internal synchronization state management.
mod state;

pub use error::TryCallError;
pub use once::Once;
