// SPDX-License-Identifier: GPL-2.0

//! Time management: the jiffies clock driving the scheduler

use core::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::types::Jiffies;

/// System clock frequency (Hz) - 1000 for 1ms ticks
pub const HZ: u64 = 1000;

/// Global tick counter
static JIFFIES_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Get current jiffies count
pub fn get_jiffies() -> Jiffies {
	Jiffies(JIFFIES_COUNTER.load(Ordering::Relaxed))
}

/// Increment jiffies counter (called from timer interrupt)
pub fn update_jiffies() {
	JIFFIES_COUNTER.fetch_add(1, Ordering::Relaxed);
}

/// Convert milliseconds to jiffies, rounding up so that a sleep never
/// undershoots its deadline
pub fn msecs_to_jiffies(ms: u64) -> Jiffies {
	Jiffies((ms * HZ).div_ceil(1000))
}

/// Convert jiffies to milliseconds
pub fn jiffies_to_msecs(jiffies: Jiffies) -> u64 {
	jiffies.0 * 1000 / HZ
}

/// Initialize time management
pub fn init() -> Result<()> {
	JIFFIES_COUNTER.store(0, Ordering::Relaxed);
	crate::info!("time: clock running at {} Hz", HZ);
	Ok(())
}

/// Timer interrupt handler
///
/// The architecture glue invokes this once per tick, then hands the
/// interrupted context to [`crate::scheduler::task_resched`].
pub fn timer_interrupt() {
	update_jiffies();
	crate::scheduler::scheduler_tick();
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_msecs_to_jiffies() {
		assert_eq!(msecs_to_jiffies(0), Jiffies(0));
		assert_eq!(msecs_to_jiffies(10), Jiffies(10));
		assert_eq!(msecs_to_jiffies(2000), Jiffies(2000));
	}

	#[test]
	fn test_jiffies_roundtrip() {
		assert_eq!(jiffies_to_msecs(msecs_to_jiffies(50)), 50);
	}

	#[test]
	fn test_timer_interrupt_advances_clock() {
		let before = get_jiffies();
		timer_interrupt();
		assert!(get_jiffies() > before);
	}
}
