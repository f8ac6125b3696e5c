// SPDX-License-Identifier: GPL-2.0

//! Synchronization primitives

// Re-export common synchronization types
pub use alloc::sync::Arc;
use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

pub use spin::Mutex;
pub use spin::Once;
pub use spin::RwLock;

/// Test-and-set spinlock
///
/// Acquisition is a single `swap`; on contention the lock waits for the
/// holder with a relaxed read loop before retrying, driving the wait through
/// a caller-chosen strategy. Two acquisition paths are exposed:
/// [`Spinlock::lock`] busy-waits and is the one interrupt handlers use (they
/// cannot yield), while [`Spinlock::lock_yielding`] hands the CPU back to the
/// scheduler between attempts and is the one thread context uses when the
/// lock may be contended across a schedule quantum.
pub struct Spinlock<T> {
	state: AtomicBool,
	data: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for Spinlock<T> {}
unsafe impl<T: Send> Send for Spinlock<T> {}

impl<T> Spinlock<T> {
	pub const fn new(data: T) -> Self {
		Self {
			state: AtomicBool::new(false),
			data: UnsafeCell::new(data),
		}
	}

	/// One test-and-set attempt
	fn try_acquire(&self) -> bool {
		!self.state.swap(true, Ordering::Acquire)
	}

	fn release(&self) {
		self.state.store(false, Ordering::Release);
	}

	/// Shared acquisition loop; `wait` runs once per observation of a held
	/// lock, so the swap is only retried after the holder is seen releasing
	fn acquire_with<W: Fn()>(&self, wait: W) -> SpinlockGuard<'_, T> {
		loop {
			if self.try_acquire() {
				return SpinlockGuard { lock: self };
			}
			while self.state.load(Ordering::Relaxed) {
				wait();
			}
		}
	}

	/// Acquire the lock, busy-waiting on contention.
	///
	/// The only acquisition path usable from interrupt context.
	pub fn lock(&self) -> SpinlockGuard<'_, T> {
		self.acquire_with(core::hint::spin_loop)
	}

	/// Acquire the lock, yielding to the scheduler on contention.
	///
	/// Must not be called from interrupt context.
	pub fn lock_yielding(&self) -> SpinlockGuard<'_, T> {
		self.acquire_with(|| crate::scheduler::yield_ms(10))
	}

	pub fn try_lock(&self) -> Option<SpinlockGuard<'_, T>> {
		if self.try_acquire() {
			Some(SpinlockGuard { lock: self })
		} else {
			None
		}
	}
}

pub struct SpinlockGuard<'a, T> {
	lock: &'a Spinlock<T>,
}

impl<T> Deref for SpinlockGuard<'_, T> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		unsafe { &*self.lock.data.get() }
	}
}

impl<T> DerefMut for SpinlockGuard<'_, T> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		unsafe { &mut *self.lock.data.get() }
	}
}

impl<T> Drop for SpinlockGuard<'_, T> {
	fn drop(&mut self) {
		self.lock.release();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_lock_unlock() {
		let lock = Spinlock::new(5u32);
		{
			let mut guard = lock.lock();
			*guard += 1;
		}
		assert_eq!(*lock.lock(), 6);
	}

	#[test]
	fn test_try_lock_contended() {
		let lock = Spinlock::new(());
		let guard = lock.lock();
		assert!(lock.try_lock().is_none());
		drop(guard);
		assert!(lock.try_lock().is_some());
	}

	#[test]
	fn test_guard_drop_releases() {
		let lock = Spinlock::new(0u8);
		drop(lock.try_lock().unwrap());
		assert!(lock.try_lock().is_some());
	}

	#[test]
	fn test_lock_yielding_uncontended() {
		let lock = Spinlock::new(7u32);
		assert_eq!(*lock.lock_yielding(), 7);
	}
}
