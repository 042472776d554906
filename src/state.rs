//! Internal synchronization state for the gate.
//!
//! The whole gate is a single `AtomicU8` with the following layout:
//! - Bit 0: DONE - An action ran to completion since the last reset
//! - Bit 1: LOCKED - Some caller is inside the gate (running an action or resetting)
//! - Bit 2: WAITING - At least one thread or task is waiting on the state
//! - Bits 3-7: EPOCH - Generation counter, bumped on every release
//!
//! Unlike a classic once cell, `LOCKED` can be taken while `DONE` is set: forced
//! runs and resets need the lock regardless of completion. Threads park via
//! `parking_lot_core` on the address of the state byte; async tasks wait on a
//! `tokio::sync::Notify` that every release with WAITING set also wakes.

use core::mem;
use core::sync::atomic::{AtomicU8, Ordering};

use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};

/// Whether a lock attempt should yield to an already completed gate.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Entry {
   /// Take the lock only if the gate is not done.
   Pending,
   /// Take the lock no matter what `DONE` says.
   Always,
}

/// Why a non-blocking lock attempt did not return a guard.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Refused {
   /// The gate is done and `Entry::Pending` was requested.
   Done,
   /// Someone else holds the lock.
   Busy,
}

/// Atomic state of a `Once` gate.
pub(crate) struct GateLock {
   state: AtomicU8,
   #[cfg(feature = "async-tokio")]
   notify: tokio::sync::Notify,
}

impl GateLock {
   const DONE: u8 = 1;
   const LOCKED: u8 = 2;
   const WAITING: u8 = 4;
   const EPOCH_1: u8 = 8;
   const EPOCH_MASK: u8 = !(Self::DONE | Self::LOCKED | Self::WAITING);

   #[inline(always)]
   const fn next_epoch(current_state: u8) -> u8 {
      (current_state & Self::EPOCH_MASK).wrapping_add(Self::EPOCH_1) & Self::EPOCH_MASK
   }

   #[inline(always)]
   const fn with_state(state: u8) -> Self {
      Self {
         state: AtomicU8::new(state),
         #[cfg(feature = "async-tokio")]
         notify: tokio::sync::Notify::const_new(),
      }
   }

   #[inline]
   pub(crate) const fn new() -> Self {
      Self::with_state(0)
   }

   #[inline]
   pub(crate) const fn done() -> Self {
      Self::with_state(Self::DONE)
   }

   #[inline]
   fn notify_all(&self) {
      // SAFETY: The key only has to match the one used in `wait`; both use the
      // address of the state byte.
      unsafe {
         parking_lot_core::unpark_all(self.state.as_ptr() as usize, DEFAULT_UNPARK_TOKEN);
      }
      // Wakes every `Notified` created before this call, polled or not.
      #[cfg(feature = "async-tokio")]
      self.notify.notify_waiters();
   }

   /// Parks the current thread as long as the state still equals `expected_state`.
   #[inline]
   fn wait(&self, expected_state: u8) {
      // SAFETY: See `notify_all`.
      unsafe {
         // The validate closure runs under the bucket lock, so a release that
         // happens after the check is guaranteed to unpark us.
         let _ = parking_lot_core::park(
            self.state.as_ptr() as usize,
            || self.state.load(Ordering::Acquire) == expected_state,
            || {},
            |_, _| {},
            DEFAULT_PARK_TOKEN,
            None,
         );
      }
   }

   /// Suspends the current task as long as the state still equals `expected_state`.
   #[cfg(feature = "async-tokio")]
   async fn wait_async(&self, expected_state: u8) {
      let mut notified = core::pin::pin!(self.notify.notified());
      notified.as_mut().enable();
      // WAITING is already set in `expected_state`, so any release from here on
      // calls `notify_waiters` and completes `notified`.
      if self.state.load(Ordering::Acquire) == expected_state {
         notified.await;
      }
   }

   /// Replaces the whole state with `flags | next epoch`, waking waiters if any.
   /// Returns the previous state.
   #[inline]
   fn release_with(&self, flags: u8) -> u8 {
      // Only WAITING can change under us here (we hold LOCKED or `&mut self`),
      // and it does not feed into the epoch.
      let current_state = self.state.load(Ordering::Relaxed);
      let new_state = flags | Self::next_epoch(current_state);

      // Release pairs with the Acquire loads in `lock_step` and `is_done`, so the
      // action's effects happen-before anyone observes the new state.
      let prev_state = self.state.swap(new_state, Ordering::Release);
      if prev_state & Self::WAITING != 0 {
         self.notify_all();
      }
      prev_state
   }

   /// Sets DONE and clears the lock. Returns `true` if the state was not previously DONE.
   ///
   /// Only valid while holding the lock (`GateGuard`) or `&mut self`.
   #[inline]
   pub(crate) fn set_done(&self) -> bool {
      self.release_with(Self::DONE) & Self::DONE == 0
   }

   /// Clears DONE and the lock. Returns `true` if the state was previously DONE.
   ///
   /// Only valid while holding the lock (`GateGuard`) or `&mut self`.
   #[inline]
   pub(crate) fn set_pending(&self) -> bool {
      self.release_with(0) & Self::DONE != 0
   }

   #[inline]
   pub(crate) fn is_done(&self, ordering: Ordering) -> bool {
      self.state.load(ordering) & Self::DONE != 0
   }

   /// Single acquisition attempt.
   ///
   /// - `Ok(None)`: the gate is done, unlocked, and `entry` is `Entry::Pending`.
   /// - `Ok(Some(guard))`: lock acquired.
   /// - `Err(state)`: lock held elsewhere. Unless `nowait`, WAITING is set in `state`.
   #[inline]
   fn lock_step(&self, entry: Entry, nowait: bool) -> Result<Option<GateGuard<'_>>, u8> {
      loop {
         // Acquire so that a DONE observed here carries the winner's side effects.
         let current_state = self.state.load(Ordering::Acquire);
         let was_done = current_state & Self::DONE != 0;

         if current_state & Self::LOCKED == 0 {
            // Seeing "unlocked and done" is the same as locking, reading DONE and
            // unlocking again, so there is no need to touch the state.
            if entry == Entry::Pending && was_done {
               return Ok(None);
            }
            match self.state.compare_exchange_weak(
               current_state,
               current_state | Self::LOCKED,
               Ordering::Acquire,
               Ordering::Relaxed,
            ) {
               Ok(_) => return Ok(Some(GateGuard::new(self, was_done))),
               Err(_) => {
                  std::hint::spin_loop();
                  continue;
               }
            }
         }

         if !nowait && current_state & Self::WAITING == 0 {
            let new_state = current_state | Self::WAITING;
            match self.state.compare_exchange_weak(
               current_state,
               new_state,
               Ordering::Relaxed,
               Ordering::Relaxed,
            ) {
               Ok(_) => return Err(new_state),
               Err(_) => {
                  std::hint::spin_loop();
                  continue;
               }
            }
         }
         return Err(current_state);
      }
   }

   /// Acquires the lock, parking while another caller holds it.
   #[inline]
   fn lock(&self, entry: Entry) -> Option<GateGuard<'_>> {
      let mut state_when_failed = match self.lock_step(entry, false) {
         Ok(guard_opt) => return guard_opt,
         Err(state) => state,
      };
      loop {
         self.wait(state_when_failed);
         match self.lock_step(entry, false) {
            Ok(guard_opt) => return guard_opt,
            Err(new_state) => state_when_failed = new_state,
         }
      }
   }

   /// Acquires the lock unless the gate is done. Returns `None` for a done gate.
   #[inline]
   pub(crate) fn lock_pending(&self) -> Option<GateGuard<'_>> {
      self.lock(Entry::Pending)
   }

   /// Acquires the lock regardless of `DONE`.
   #[inline]
   pub(crate) fn lock_always(&self) -> GateGuard<'_> {
      match self.lock(Entry::Always) {
         Some(guard) => guard,
         None => unreachable!("forced entry never short-circuits on a done gate"),
      }
   }

   /// Acquires the lock from async code, suspending the task instead of the thread.
   #[cfg(feature = "async-tokio")]
   async fn lock_async(&self, entry: Entry) -> Option<GateGuard<'_>> {
      loop {
         match self.lock_step(entry, false) {
            Ok(guard_opt) => return guard_opt,
            Err(state) => self.wait_async(state).await,
         }
      }
   }

   /// Async version of [`GateLock::lock_pending`].
   #[cfg(feature = "async-tokio")]
   pub(crate) async fn lock_pending_async(&self) -> Option<GateGuard<'_>> {
      self.lock_async(Entry::Pending).await
   }

   /// Async version of [`GateLock::lock_always`].
   #[cfg(feature = "async-tokio")]
   pub(crate) async fn lock_always_async(&self) -> GateGuard<'_> {
      match self.lock_async(Entry::Always).await {
         Some(guard) => guard,
         None => unreachable!("forced entry never short-circuits on a done gate"),
      }
   }

   /// Acquires the lock without blocking.
   #[inline]
   pub(crate) fn try_lock(&self, entry: Entry) -> Result<GateGuard<'_>, Refused> {
      match self.lock_step(entry, true) {
         Ok(Some(guard)) => Ok(guard),
         Ok(None) => Err(Refused::Done),
         Err(_) => Err(Refused::Busy),
      }
   }
}

/// Proof that the `LOCKED` bit is held.
///
/// Must be consumed with [`GateGuard::commit`] or [`GateGuard::rearm`]. Dropping it
/// any other way (unwinding, `?`, a cancelled future) releases the lock and
/// restores DONE to what it was when the lock was taken.
pub(crate) struct GateGuard<'a> {
   state: &'a GateLock,
   was_done: bool,
}

impl<'a> GateGuard<'a> {
   #[inline(always)]
   const fn new(state: &'a GateLock, was_done: bool) -> Self {
      Self { state, was_done }
   }

   /// Marks the gate done and releases the lock. Returns `true` if it was pending before.
   #[inline(always)]
   pub(crate) fn commit(self) -> bool {
      let was_pending = self.state.set_done();
      mem::forget(self);
      was_pending
   }

   /// Marks the gate pending and releases the lock. Returns `true` if it was done before.
   #[inline(always)]
   pub(crate) fn rearm(self) -> bool {
      let was_done = self.state.set_pending();
      mem::forget(self);
      was_done
   }
}

impl Drop for GateGuard<'_> {
   /// The action did not finish: release the lock and leave DONE untouched.
   #[inline]
   fn drop(&mut self) {
      let flags = if self.was_done { GateLock::DONE } else { 0 };
      self.state.release_with(flags);
      log::debug!(
         "once action did not complete, gate left {}",
         if self.was_done { "done" } else { "pending" }
      );
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_fresh_state_locks_for_pending_entry() {
      let lock = GateLock::new();
      assert!(!lock.is_done(Ordering::Relaxed));
      let guard = lock.try_lock(Entry::Pending).expect("fresh gate must lock");
      assert!(guard.commit());
      assert!(lock.is_done(Ordering::Relaxed));
   }

   #[test]
   fn test_done_state_refuses_pending_entry() {
      let lock = GateLock::done();
      assert!(matches!(lock.try_lock(Entry::Pending), Err(Refused::Done)));
      assert!(lock.lock_pending().is_none());
   }

   #[test]
   fn test_always_entry_locks_done_state() {
      let lock = GateLock::done();
      let guard = lock.lock_always();
      assert!(lock.is_done(Ordering::Relaxed));
      // A second entry of any kind is refused while the lock is held.
      assert!(matches!(lock.try_lock(Entry::Always), Err(Refused::Busy)));
      assert!(matches!(lock.try_lock(Entry::Pending), Err(Refused::Busy)));
      assert!(!guard.commit());
   }

   #[test]
   fn test_rearm_clears_done() {
      let lock = GateLock::done();
      assert!(lock.lock_always().rearm());
      assert!(!lock.is_done(Ordering::Relaxed));
      assert!(lock.try_lock(Entry::Pending).is_ok_and(|g| g.commit()));
   }

   #[test]
   fn test_dropped_guard_keeps_done() {
      let lock = GateLock::done();
      drop(lock.lock_always());
      assert!(lock.is_done(Ordering::Relaxed));
      // Lock is free again.
      assert!(lock.try_lock(Entry::Always).is_ok());
   }

   #[test]
   fn test_dropped_guard_keeps_pending() {
      let lock = GateLock::new();
      drop(lock.lock_always());
      assert!(!lock.is_done(Ordering::Relaxed));
      drop(lock.lock_pending());
      assert!(!lock.is_done(Ordering::Relaxed));
      assert!(lock.try_lock(Entry::Pending).is_ok());
   }

   #[test]
   fn test_epoch_advances_on_release() {
      let lock = GateLock::new();
      for _ in 0..64 {
         let before = lock.state.load(Ordering::Relaxed);
         lock.lock_always().commit();
         let after = lock.state.load(Ordering::Relaxed);
         assert_ne!(before & GateLock::EPOCH_MASK, after & GateLock::EPOCH_MASK);
         assert_eq!(after & (GateLock::LOCKED | GateLock::WAITING), 0);
      }
   }
}
