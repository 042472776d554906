//! Re-armable run-once gate.
//!
//! This module provides [`Once`], a thread-safe gate that lets an action run at
//! most once until it is explicitly [reset](Once::reset), and that can be told to
//! run an action anyway with [`Once::call_force`].
//!
//! Every operation goes through the same lock, so actions never overlap: callers
//! that lose the race wait for the winner's action to finish before returning.
//! The only lock-free path is `call` on a gate that is done and not locked.

use core::fmt;
#[cfg(feature = "async-tokio")]
use core::future::Future;
use core::sync::atomic::Ordering;

use super::error::TryCallError;
use super::state::{Entry, GateLock, Refused};

/// A thread-safe gate which runs an action at most once until reset.
///
/// - [`call`](Once::call) runs its action only if no action has completed since
///   construction or the last [`reset`](Once::reset).
/// - [`call_force`](Once::call_force) always runs its action and leaves the gate done.
/// - [`reset`](Once::reset) re-arms the gate without running anything.
///
/// Actions run while the gate's lock is held. A slow action therefore stalls
/// every other operation on the same gate, and calling back into the gate from
/// inside an action deadlocks (except for [`try_call`](Once::try_call), which
/// reports [`TryCallError::Busy`]).
///
/// If an action panics, returns an error from one of the fallible variants, or
/// (for async variants) has its future dropped before completion, the gate keeps
/// the state it had before the call: a pending gate stays pending, so the next
/// `call` retries, and a done gate stays done.
///
/// # Examples
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use rearm_once::Once;
///
/// static INIT: Once = Once::new();
/// static RUNS: AtomicUsize = AtomicUsize::new(0);
///
/// INIT.call(|| { RUNS.fetch_add(1, Ordering::Relaxed); });
/// INIT.call(|| { RUNS.fetch_add(1, Ordering::Relaxed); });
/// assert_eq!(RUNS.load(Ordering::Relaxed), 1);
///
/// INIT.reset();
/// INIT.call(|| { RUNS.fetch_add(1, Ordering::Relaxed); });
/// assert_eq!(RUNS.load(Ordering::Relaxed), 2);
/// ```
pub struct Once {
   lock: GateLock,
}

impl Once {
   /// Creates a new, pending gate.
   #[inline]
   #[must_use]
   pub const fn new() -> Self {
      Self {
         lock: GateLock::new(),
      }
   }

   /// Creates a gate that is already done; the first [`call`](Once::call) is skipped.
   #[inline]
   #[must_use]
   pub const fn done() -> Self {
      Self {
         lock: GateLock::done(),
      }
   }

   /// Checks whether an action has completed since construction or the last reset.
   ///
   /// This method never blocks. The answer may be stale by the time it is used;
   /// if it is `true`, the side effects of the completing action are visible.
   #[inline]
   pub fn is_done(&self) -> bool {
      self.lock.is_done(Ordering::Acquire)
   }

   /// Runs `f` unless the gate is done. Blocks while another caller is inside the gate.
   ///
   /// If several threads call this concurrently on a pending gate, exactly one
   /// of them runs its closure and the others return once it has finished.
   #[inline]
   pub fn call<F>(&self, f: F)
   where
      F: FnOnce(),
   {
      if let Some(guard) = self.lock.lock_pending() {
         f();
         guard.commit();
      }
   }

   /// Runs `f` regardless of the gate's state and leaves it done.
   ///
   /// A subsequent [`call`](Once::call) without an intervening [`reset`](Once::reset)
   /// is skipped.
   #[inline]
   pub fn call_force<F>(&self, f: F)
   where
      F: FnOnce(),
   {
      let guard = self.lock.lock_always();
      f();
      guard.commit();
   }

   /// Re-arms the gate so the next [`call`](Once::call) runs its action.
   ///
   /// Waits for an in-flight action to finish; never runs one itself.
   #[inline]
   pub fn reset(&self) {
      if self.lock.lock_always().rearm() {
         log::trace!("once gate re-armed");
      }
   }

   /// Runs `f` if the gate is pending and nobody else is inside it, without blocking.
   ///
   /// - `Ok(())` if `f` ran and the gate is now done.
   /// - `Err(TryCallError::Done)` if the gate is already done.
   /// - `Err(TryCallError::Busy)` if another caller holds the gate.
   ///
   /// `f` is dropped without running on error.
   #[inline]
   pub fn try_call<F>(&self, f: F) -> Result<(), TryCallError>
   where
      F: FnOnce(),
   {
      let guard = self.lock.try_lock(Entry::Pending).map_err(|refused| match refused {
         Refused::Done => TryCallError::Done,
         Refused::Busy => TryCallError::Busy,
      })?;
      f();
      guard.commit();
      Ok(())
   }

   /// Runs fallible `f` unless the gate is done. Blocks like [`call`](Once::call).
   ///
   /// - `Ok(())` if the gate was already done, or `f` succeeded and the gate is now done.
   /// - `Err(e)` if `f` failed; the gate stays pending and the next call retries.
   pub fn call_fallible<F, E>(&self, f: F) -> Result<(), E>
   where
      F: FnOnce() -> Result<(), E>,
   {
      let Some(guard) = self.lock.lock_pending() else {
         return Ok(());
      };
      f()?; // On failure the guard is dropped and the gate stays pending.
      guard.commit();
      Ok(())
   }

   /// Runs fallible `f` regardless of the gate's state.
   ///
   /// On success the gate is done. On failure it keeps the state it had before
   /// the call.
   pub fn call_force_fallible<F, E>(&self, f: F) -> Result<(), E>
   where
      F: FnOnce() -> Result<(), E>,
   {
      let guard = self.lock.lock_always();
      f()?;
      guard.commit();
      Ok(())
   }

   /// Async version of [`call`](Once::call). The lock is held across `f().await`.
   ///
   /// Waiting for the lock suspends the task, never the worker thread, so gate
   /// futures can be joined within one task and used on a current-thread runtime.
   #[cfg(feature = "async-tokio")]
   pub async fn call_async<F, Fut>(&self, f: F)
   where
      F: FnOnce() -> Fut,
      Fut: Future<Output = ()>,
   {
      if let Some(guard) = self.lock.lock_pending_async().await {
         f().await;
         guard.commit();
      }
   }

   /// Async version of [`call_force`](Once::call_force).
   #[cfg(feature = "async-tokio")]
   pub async fn call_force_async<F, Fut>(&self, f: F)
   where
      F: FnOnce() -> Fut,
      Fut: Future<Output = ()>,
   {
      let guard = self.lock.lock_always_async().await;
      f().await;
      guard.commit();
   }

   /// Async version of [`call_fallible`](Once::call_fallible).
   #[cfg(feature = "async-tokio")]
   pub async fn call_fallible_async<F, Fut, E>(&self, f: F) -> Result<(), E>
   where
      F: FnOnce() -> Fut,
      Fut: Future<Output = Result<(), E>>,
   {
      let Some(guard) = self.lock.lock_pending_async().await else {
         return Ok(());
      };
      f().await?;
      guard.commit();
      Ok(())
   }

   /// Async version of [`reset`](Once::reset), for use while actions may be awaiting.
   #[cfg(feature = "async-tokio")]
   pub async fn reset_async(&self) {
      if self.lock.lock_always_async().await.rearm() {
         log::trace!("once gate re-armed");
      }
   }

   /// Re-arms the gate through exclusive access. Returns `true` if it was done.
   #[inline]
   pub fn reset_mut(&mut self) -> bool {
      self.lock.set_pending()
   }

   /// Marks the gate done through exclusive access without running anything.
   /// Returns `true` if it was pending.
   #[inline]
   pub fn set_done_mut(&mut self) -> bool {
      self.lock.set_done()
   }
}

impl Default for Once {
   /// Creates a new, pending gate.
   #[inline]
   fn default() -> Self {
      Self::new()
   }
}

impl From<bool> for Once {
   /// Creates a done gate from `true` and a pending one from `false`.
   #[inline]
   fn from(done: bool) -> Self {
      if done {
         Self::done()
      } else {
         Self::new()
      }
   }
}

impl fmt::Debug for Once {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let state = if self.is_done() { "done" } else { "pending" };
      f.debug_tuple("Once").field(&format_args!("{state}")).finish()
   }
}
