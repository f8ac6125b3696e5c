// SPDX-License-Identifier: GPL-2.0

//! The Osprey kernel core
//!
//! This crate carries the substrate of a small preemptively multitasked
//! kernel: the process/thread tables and scheduler, the VFS dispatch layer
//! with its pluggable filesystem drivers, and the keyboard line discipline.
//! Architecture trampolines, paging, the heap allocator and device rendering
//! are external collaborators reached through narrow seams.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

use core::sync::atomic::{AtomicBool, Ordering};

pub mod arch;
pub mod console;
pub mod error;
pub mod fd;
pub mod fs;
pub mod kbd;
pub mod memory;
pub mod prelude;
pub mod process;
pub mod scheduler;
pub mod sync;
pub mod time;
pub mod tty;
pub mod types;

/// Kernel version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = "Osprey";

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Bring the kernel substrate up in boot order: console, clock, scheduler,
/// VFS, keyboard. Idempotent; the singletons live for the kernel's uptime
/// and are never torn down.
pub fn init() -> error::Result<()> {
	if INITIALIZED.swap(true, Ordering::AcqRel) {
		return Ok(());
	}

	console::init()?;
	crate::info!("{} {} booting", NAME, VERSION);

	time::init()?;
	scheduler::init_sched()?;
	fs::init()?;
	kbd::init()?;

	crate::info!("{}: core subsystems up", NAME);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::Pid;

	#[test]
	fn test_boot_brings_up_kernel_process() {
		init().unwrap();
		// Re-running must not create a second kernel process
		init().unwrap();

		let table = process::PROCESS_TABLE.lock();
		let kernel = table.process(Pid(0)).expect("kernel process");
		// The sync worker lives in the kernel process
		assert!(kernel.thread_count() >= 1);
	}

	#[test]
	fn test_boot_logs_progress() {
		init().unwrap();
		let log = console::log_snapshot();
		assert!(log.contains("sched: ready") || log.contains("core subsystems up"));
	}
}
