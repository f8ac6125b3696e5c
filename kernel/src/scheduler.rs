// SPDX-License-Identifier: GPL-2.0

//! Task scheduler: priority-ordered round-robin with timed suspension
//!
//! The scheduler is driven by the periodic timer interrupt. On each tick the
//! architecture glue calls [`crate::time::timer_interrupt`] and then hands the
//! interrupted context to [`task_resched`], which saves it into the current
//! thread, picks the next eligible ready thread and returns the context the
//! low-level trampoline must restore. [`yield_ms`] is the sole suspension
//! primitive: it parks the calling thread until a deadline, measured in
//! scheduler ticks, has passed.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::arch::Context;
use crate::error::Result;
use crate::memory::kernel_pagemap;
use crate::process::{ProcessState, ProcessTable, ThreadState, PROCESS_TABLE};
use crate::time::{get_jiffies, msecs_to_jiffies};
use crate::types::{Jiffies, Pid, Tid};

/// Priority of the kernel process created at boot
pub const KERNEL_PRIORITY: u8 = 0;

static SCHEDULER_READY: AtomicBool = AtomicBool::new(false);
static NEED_RESCHED: AtomicBool = AtomicBool::new(false);

/// Whether the scheduler has been brought up
pub fn scheduler_ready() -> bool {
	SCHEDULER_READY.load(Ordering::Acquire)
}

/// Ask the glue to reschedule at the next opportunity
fn set_need_resched() {
	NEED_RESCHED.store(true, Ordering::Release);
}

/// Consume the reschedule request flag
pub fn take_need_resched() -> bool {
	NEED_RESCHED.swap(false, Ordering::AcqRel)
}

/// Initialize the scheduler: create the kernel process (pid 0) and open for
/// business
pub fn init_sched() -> Result<()> {
	let pid = {
		let mut table = PROCESS_TABLE.lock();
		table.create_process(kernel_pagemap(), KERNEL_PRIORITY)?
	};
	SCHEDULER_READY.store(true, Ordering::Release);
	crate::info!("sched: ready, kernel process is pid {}", pid);
	Ok(())
}

/// The thread currently on the CPU
pub fn current_thread() -> Option<(Pid, Tid)> {
	let table = PROCESS_TABLE.lock();
	table.current
}

/// Move every blocked thread whose deadline has passed back to ready
pub(crate) fn wake_expired(table: &mut ProcessTable, now: Jiffies) {
	let pids: alloc::vec::Vec<Pid> = table.processes().map(|p| p.pid).collect();
	for pid in pids {
		let Some(process) = table.process_mut(pid) else {
			continue;
		};
		let tids: alloc::vec::Vec<Tid> = process.threads().map(|t| t.tid).collect();
		for tid in tids {
			if let Some(thread) = process.thread_mut(tid) {
				if let ThreadState::Blocked(wake_at) = thread.state {
					if now >= wake_at {
						thread.state = ThreadState::Ready;
					}
				}
			}
		}
	}
}

/// Select the next thread to run
///
/// Policy: among the processes of highest priority that hold at least one
/// ready thread, advance the rotation cursor to the next ready thread in
/// `(process slot, thread slot)` order, wrapping at the end.
pub(crate) fn pick_next(table: &mut ProcessTable) -> Option<(Pid, Tid)> {
	let top = table
		.processes()
		.filter(|p| {
			p.state == ProcessState::Active
				&& p.threads().any(|t| t.state == ThreadState::Ready)
		})
		.map(|p| p.priority)
		.max()?;

	let mut candidates: alloc::vec::Vec<(usize, usize)> = alloc::vec::Vec::new();
	for process in table.processes() {
		if process.state != ProcessState::Active || process.priority != top {
			continue;
		}
		for thread in process.threads() {
			if thread.state == ThreadState::Ready {
				candidates.push((process.pid.0 as usize, thread.tid.0 as usize));
			}
		}
	}

	let cursor = table.cursor;
	let chosen = candidates
		.iter()
		.copied()
		.find(|&c| c > cursor)
		.unwrap_or(candidates[0]);
	table.cursor = chosen;
	Some((Pid(chosen.0 as u32), Tid(chosen.1 as u32)))
}

/// Park the current thread until `wake_at`
pub(crate) fn block_current(table: &mut ProcessTable, wake_at: Jiffies) {
	if let Some((pid, tid)) = table.current {
		if let Some(thread) = table.thread_mut(pid, tid) {
			thread.state = ThreadState::Blocked(wake_at);
		}
	}
}

/// Flag the current thread for teardown at the next reschedule
pub(crate) fn mark_current_exiting(table: &mut ProcessTable) {
	if let Some((pid, tid)) = table.current {
		if let Some(thread) = table.thread_mut(pid, tid) {
			thread.exiting = true;
		}
	}
}

/// One reschedule step over `table`
///
/// Saves `saved` into the current thread (or reaps it if it is exiting),
/// wakes expired sleepers and picks the next ready thread. Returns a pointer
/// to the chosen thread's context, which stays valid until that thread is
/// torn down (thread slots are boxed).
pub(crate) fn resched(
	table: &mut ProcessTable,
	saved: &Context,
	now: Jiffies,
) -> Option<*mut Context> {
	if let Some((pid, tid)) = table.current {
		let exiting = table.thread(pid, tid).map(|t| t.exiting).unwrap_or(false);
		if exiting {
			table.teardown_thread(pid, tid);
		} else if let Some(thread) = table.thread_mut(pid, tid) {
			thread.context = *saved;
			if thread.state == ThreadState::Running {
				thread.state = ThreadState::Ready;
			}
		}
		table.current = None;
	}

	wake_expired(table, now);

	let (pid, tid) = pick_next(table)?;
	let thread = table.thread_mut(pid, tid)?;
	thread.state = ThreadState::Running;
	let context = &mut thread.context as *mut Context;
	table.current = Some((pid, tid));
	Some(context)
}

/// Timer tick: wake sleepers whose deadline has passed
pub fn scheduler_tick() {
	if !scheduler_ready() {
		return;
	}
	let mut table = PROCESS_TABLE.lock();
	let now = get_jiffies();
	wake_expired(&mut table, now);
}

/// Reschedule entry point, called by the interrupt glue with the interrupted
/// context
///
/// Returns the context the trampoline must restore, or `None` when no thread
/// is ready (the glue idles until the next tick).
pub fn task_resched(saved: &Context) -> Option<NonNull<Context>> {
	if !scheduler_ready() {
		return None;
	}
	take_need_resched();
	let mut table = PROCESS_TABLE.lock();
	let now = get_jiffies();
	resched(&mut table, saved, now).and_then(NonNull::new)
}

/// Cooperative sleep: park the calling thread for at least `ms` milliseconds
/// of scheduler time
///
/// `ms == 0` requests an immediate reschedule. The deadline is a lower bound
/// only. Callers must not hold any spinlock across this call.
pub fn yield_ms(ms: u64) {
	if !scheduler_ready() {
		return;
	}

	{
		let mut table = PROCESS_TABLE.lock();
		if table.current.is_none() {
			return;
		}
		let wake_at = get_jiffies() + msecs_to_jiffies(ms);
		block_current(&mut table, wake_at);
	}

	// The resched interrupt takes over from here; this thread resumes no
	// earlier than the deadline.
	set_need_resched();
}

/// Exit the calling thread
///
/// Marks the thread for teardown and waits for the scheduler to reap it. The
/// slot (and its tid) is released at the next reschedule.
pub fn thread_exit() -> ! {
	{
		let mut table = PROCESS_TABLE.lock();
		mark_current_exiting(&mut table);
	}
	set_need_resched();
	loop {
		core::hint::spin_loop();
	}
}

/// Trampoline installed as every thread entry's return address
pub extern "C" fn thread_return() -> ! {
	thread_exit()
}
