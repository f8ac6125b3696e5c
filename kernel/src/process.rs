// SPDX-License-Identifier: GPL-2.0

//! Process and thread tables
//!
//! Both tables are index-addressed arenas with bounded capacity and a free
//! list: a `Pid` or `Tid` is its slot index, and an id is handed out again
//! only after the previous owner has been fully torn down. Threads reference
//! their process by `Pid` rather than by pointer, so the tables own all
//! lifecycle state.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use crate::arch::Context;
use crate::error::{Error, Result};
use crate::memory::Pagemap;
use crate::sync::{Arc, Spinlock};
use crate::types::{Jiffies, Pid, Tid};

/// Process table capacity
pub const MAX_PROCESSES: usize = 65536;

/// Threads per process
pub const MAX_THREADS: usize = 1024;

/// Kernel stack size, in word-sized slots
pub const KRNL_STACK_SIZE: usize = 2048;

/// Thread entry point. Returning from it exits the thread.
pub type ThreadEntry = fn(usize);

/// Thread run state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
	/// Currently on the CPU
	Running,
	/// Eligible for selection at the next reschedule
	Ready,
	/// Parked until the contained deadline has passed
	Blocked(Jiffies),
}

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
	Active,
	Zombie,
}

/// A kernel-visible thread: saved context, run state and its kernel stack
#[derive(Debug)]
pub struct Thread {
	pub tid: Tid,
	/// Owning process, by id
	pub process: Pid,
	pub state: ThreadState,
	pub context: Context,
	/// Set by `thread_exit`; the scheduler reaps the slot instead of saving
	/// the context
	pub(crate) exiting: bool,
	/// Owned by this slot; freed only at teardown
	stack: Box<[usize]>,
}

impl Thread {
	fn new(tid: Tid, process: Pid, entry: ThreadEntry, arg: usize, pagemap: &Pagemap) -> Self {
		let mut stack = vec![0usize; KRNL_STACK_SIZE].into_boxed_slice();

		// Plant the exit trampoline as the entry function's return address
		stack[KRNL_STACK_SIZE - 1] = crate::scheduler::thread_return as usize;
		let stack_ptr = &stack[KRNL_STACK_SIZE - 1] as *const usize as u64;

		let context = Context::new_kernel(
			entry as usize as u64,
			arg as u64,
			stack_ptr,
			pagemap.root().as_u64(),
		);

		Self {
			tid,
			process,
			state: ThreadState::Ready,
			context,
			exiting: false,
			stack,
		}
	}

	/// Size of this thread's kernel stack, in slots
	pub fn stack_size(&self) -> usize {
		self.stack.len()
	}
}

/// Process structure: an address space plus an ordered sparse vector of
/// thread slots
#[derive(Debug)]
pub struct Process {
	pub pid: Pid,
	pub pagemap: Arc<Pagemap>,
	pub state: ProcessState,
	pub priority: u8,
	threads: Vec<Option<Box<Thread>>>,
	free_tids: Vec<usize>,
}

impl Process {
	fn new(pid: Pid, pagemap: Arc<Pagemap>, priority: u8) -> Self {
		Self {
			pid,
			pagemap,
			state: ProcessState::Active,
			priority,
			threads: Vec::new(),
			free_tids: Vec::new(),
		}
	}

	pub fn thread(&self, tid: Tid) -> Option<&Thread> {
		self.threads
			.get(tid.0 as usize)
			.and_then(|slot| slot.as_deref())
	}

	pub fn thread_mut(&mut self, tid: Tid) -> Option<&mut Thread> {
		self.threads
			.get_mut(tid.0 as usize)
			.and_then(|slot| slot.as_deref_mut())
	}

	/// Iterate over live threads in slot order
	pub fn threads(&self) -> impl Iterator<Item = &Thread> {
		self.threads.iter().filter_map(|slot| slot.as_deref())
	}

	pub fn thread_count(&self) -> usize {
		self.threads.iter().filter(|slot| slot.is_some()).count()
	}

	fn alloc_tid(&mut self) -> Result<usize> {
		if let Some(slot) = self.free_tids.pop() {
			return Ok(slot);
		}
		if self.threads.len() >= MAX_THREADS {
			return Err(Error::EAGAIN);
		}
		self.threads.push(None);
		Ok(self.threads.len() - 1)
	}
}

/// Process table implementation
#[derive(Debug)]
pub struct ProcessTable {
	slots: Vec<Option<Process>>,
	free_pids: Vec<usize>,
	/// The thread currently on the CPU
	pub(crate) current: Option<(Pid, Tid)>,
	/// Round-robin rotation cursor, `(process slot, thread slot)`
	pub(crate) cursor: (usize, usize),
}

impl ProcessTable {
	pub const fn new() -> Self {
		Self {
			slots: Vec::new(),
			free_pids: Vec::new(),
			current: None,
			cursor: (0, 0),
		}
	}

	pub fn process(&self, pid: Pid) -> Option<&Process> {
		self.slots.get(pid.0 as usize).and_then(|slot| slot.as_ref())
	}

	pub fn process_mut(&mut self, pid: Pid) -> Option<&mut Process> {
		self.slots
			.get_mut(pid.0 as usize)
			.and_then(|slot| slot.as_mut())
	}

	/// Iterate over live processes in slot order
	pub fn processes(&self) -> impl Iterator<Item = &Process> {
		self.slots.iter().filter_map(|slot| slot.as_ref())
	}

	pub fn thread(&self, pid: Pid, tid: Tid) -> Option<&Thread> {
		self.process(pid).and_then(|p| p.thread(tid))
	}

	pub fn thread_mut(&mut self, pid: Pid, tid: Tid) -> Option<&mut Thread> {
		self.process_mut(pid).and_then(|p| p.thread_mut(tid))
	}

	/// Allocate a process slot and install a new process in it
	pub fn create_process(&mut self, pagemap: Arc<Pagemap>, priority: u8) -> Result<Pid> {
		let slot = if let Some(slot) = self.free_pids.pop() {
			slot
		} else {
			if self.slots.len() >= MAX_PROCESSES {
				return Err(Error::EAGAIN);
			}
			self.slots.push(None);
			self.slots.len() - 1
		};

		let pid = Pid(slot as u32);
		self.slots[slot] = Some(Process::new(pid, pagemap, priority));
		Ok(pid)
	}

	/// Tear down a process and every thread it still owns. The pid becomes
	/// reusable once this returns.
	pub fn destroy_process(&mut self, pid: Pid) -> Result<()> {
		let slot = pid.0 as usize;
		let process = self
			.slots
			.get_mut(slot)
			.and_then(|s| s.as_mut())
			.ok_or(Error::ESRCH)?;
		process.state = ProcessState::Zombie;

		if let Some((cur_pid, _)) = self.current {
			if cur_pid == pid {
				self.current = None;
			}
		}

		// Dropping the process drops every thread slot and stack with it
		self.slots[slot] = None;
		self.free_pids.push(slot);
		Ok(())
	}

	/// Create a thread inside `pid`, ready to run `entry(arg)` on a fresh
	/// kernel stack
	pub fn create_thread(&mut self, pid: Pid, entry: ThreadEntry, arg: usize) -> Result<Tid> {
		let process = self.process_mut(pid).ok_or(Error::ESRCH)?;
		let pagemap = process.pagemap.clone();
		let slot = process.alloc_tid()?;

		let tid = Tid(slot as u32);
		process.threads[slot] = Some(Box::new(Thread::new(tid, pid, entry, arg, &pagemap)));
		Ok(tid)
	}

	/// Free a thread slot. The tid becomes reusable once this returns.
	pub(crate) fn teardown_thread(&mut self, pid: Pid, tid: Tid) {
		if let Some((cur_pid, cur_tid)) = self.current {
			if cur_pid == pid && cur_tid == tid {
				self.current = None;
			}
		}
		if let Some(process) = self.process_mut(pid) {
			let slot = tid.0 as usize;
			if slot < process.threads.len() && process.threads[slot].is_some() {
				process.threads[slot] = None;
				process.free_tids.push(slot);
			}
		}
	}
}

/// Global process table
pub static PROCESS_TABLE: Spinlock<ProcessTable> = Spinlock::new(ProcessTable::new());

/// Create a new process
pub fn process_create(pagemap: Arc<Pagemap>, priority: u8) -> Result<Pid> {
	let mut table = PROCESS_TABLE.lock();
	table.create_process(pagemap, priority)
}

/// Create a new thread in an existing process and mark it ready
pub fn thread_create(pid: Pid, entry: ThreadEntry, arg: usize) -> Result<Tid> {
	let mut table = PROCESS_TABLE.lock();
	table.create_thread(pid, entry, arg)
}

/// Tear down a process and all of its threads
pub fn process_destroy(pid: Pid) -> Result<()> {
	let mut table = PROCESS_TABLE.lock();
	table.destroy_process(pid)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::memory::kernel_pagemap;
	use crate::types::PhysAddr;

	fn noop_entry(_arg: usize) {}

	fn table_with_process() -> (ProcessTable, Pid) {
		let mut table = ProcessTable::new();
		let pid = table.create_process(kernel_pagemap(), 0).unwrap();
		(table, pid)
	}

	#[test]
	fn test_create_process_and_thread() {
		let (mut table, pid) = table_with_process();
		assert_eq!(pid, Pid(0));

		let tid = table.create_thread(pid, noop_entry, 7).unwrap();
		assert_eq!(tid, Tid(0));

		let thread = table.thread(pid, tid).unwrap();
		assert_eq!(thread.state, ThreadState::Ready);
		assert_eq!(thread.process, pid);
		assert_eq!(thread.context.rdi, 7);
		assert_eq!(thread.context.rip, noop_entry as usize as u64);
		assert_eq!(thread.stack_size(), KRNL_STACK_SIZE);
	}

	#[test]
	fn test_initial_stack_has_exit_trampoline() {
		let (mut table, pid) = table_with_process();
		let tid = table.create_thread(pid, noop_entry, 0).unwrap();
		let thread = table.thread(pid, tid).unwrap();
		// rsp points at the planted return address
		let top = thread.context.rsp as *const usize;
		assert_eq!(
			unsafe { *top },
			crate::scheduler::thread_return as usize
		);
	}

	#[test]
	fn test_tid_reused_only_after_teardown() {
		let (mut table, pid) = table_with_process();
		let t0 = table.create_thread(pid, noop_entry, 0).unwrap();
		let t1 = table.create_thread(pid, noop_entry, 0).unwrap();
		assert_ne!(t0, t1);

		table.teardown_thread(pid, t0);
		assert!(table.thread(pid, t0).is_none());

		// The freed slot is handed out again
		let t2 = table.create_thread(pid, noop_entry, 0).unwrap();
		assert_eq!(t2, t0);
	}

	#[test]
	fn test_pid_reuse_after_destroy() {
		let mut table = ProcessTable::new();
		let pagemap = Arc::new(Pagemap::new(PhysAddr::new(0x1000)));
		let p0 = table.create_process(pagemap.clone(), 0).unwrap();
		let p1 = table.create_process(pagemap.clone(), 0).unwrap();
		assert_ne!(p0, p1);

		table.destroy_process(p0).unwrap();
		assert!(table.process(p0).is_none());

		let p2 = table.create_process(pagemap, 0).unwrap();
		assert_eq!(p2, p0);
	}

	#[test]
	fn test_thread_in_unknown_process_fails() {
		let mut table = ProcessTable::new();
		assert_eq!(
			table.create_thread(Pid(3), noop_entry, 0),
			Err(Error::ESRCH)
		);
	}

	#[test]
	fn test_destroy_drops_threads() {
		let (mut table, pid) = table_with_process();
		table.create_thread(pid, noop_entry, 0).unwrap();
		table.create_thread(pid, noop_entry, 0).unwrap();
		assert_eq!(table.process(pid).unwrap().thread_count(), 2);

		table.destroy_process(pid).unwrap();
		assert!(table.process(pid).is_none());
	}
}
