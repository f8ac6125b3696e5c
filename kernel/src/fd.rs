// SPDX-License-Identifier: GPL-2.0

//! Generic file descriptor layer
//!
//! Descriptors pair an internal index with an operation vector and dispatch
//! every POSIX-like call through it. The VFS installs its own vector at
//! `open`; other kernel facilities (pipes, sockets) would install theirs.

use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::fs::{Dirent, Stat};
use crate::sync::Spinlock;

/// Descriptor table capacity
const MAX_FDS: usize = 65536;

/// Dispatch set for one descriptor class
#[derive(Debug)]
pub struct FdOps {
	pub close: fn(i32) -> Result<()>,
	pub fstat: fn(i32, &mut Stat) -> Result<()>,
	pub read: fn(i32, &mut [u8]) -> Result<usize>,
	pub write: fn(i32, &[u8]) -> Result<usize>,
	pub lseek: fn(i32, i64, i32) -> Result<i64>,
	pub dup: fn(i32) -> Result<i32>,
	pub readdir: fn(i32, &mut Dirent) -> Result<()>,
}

/// A file descriptor table entry
#[derive(Debug, Clone, Copy)]
pub struct FileDescriptor {
	/// Index meaningful to the owning layer (for VFS descriptors, the VFS
	/// handle index)
	pub intern_fd: i32,
	pub ops: &'static FdOps,
}

struct FdTable {
	slots: Vec<Option<FileDescriptor>>,
	free: Vec<usize>,
}

impl FdTable {
	const fn new() -> Self {
		Self {
			slots: Vec::new(),
			free: Vec::new(),
		}
	}

	fn insert(&mut self, desc: FileDescriptor) -> Result<i32> {
		let slot = if let Some(slot) = self.free.pop() {
			slot
		} else {
			if self.slots.len() >= MAX_FDS {
				return Err(Error::ENOMEM);
			}
			self.slots.push(None);
			self.slots.len() - 1
		};
		self.slots[slot] = Some(desc);
		Ok(slot as i32)
	}

	fn get(&self, fd: i32) -> Result<FileDescriptor> {
		usize::try_from(fd)
			.ok()
			.and_then(|slot| self.slots.get(slot))
			.and_then(|slot| *slot)
			.ok_or(Error::EBADF)
	}

	fn remove(&mut self, fd: i32) {
		if let Ok(slot) = usize::try_from(fd) {
			if slot < self.slots.len() && self.slots[slot].is_some() {
				self.slots[slot] = None;
				self.free.push(slot);
			}
		}
	}
}

static FD_TABLE: Spinlock<FdTable> = Spinlock::new(FdTable::new());

/// Install a descriptor and return its index
pub fn fd_create(desc: FileDescriptor) -> Result<i32> {
	let mut table = FD_TABLE.lock();
	table.insert(desc)
}

fn fd_get(fd: i32) -> Result<FileDescriptor> {
	let table = FD_TABLE.lock();
	table.get(fd)
}

/// Read from a descriptor
pub fn read(fd: i32, buf: &mut [u8]) -> Result<usize> {
	let desc = fd_get(fd)?;
	(desc.ops.read)(desc.intern_fd, buf)
}

/// Write to a descriptor
pub fn write(fd: i32, buf: &[u8]) -> Result<usize> {
	let desc = fd_get(fd)?;
	(desc.ops.write)(desc.intern_fd, buf)
}

/// Reposition a descriptor
pub fn lseek(fd: i32, offset: i64, whence: i32) -> Result<i64> {
	let desc = fd_get(fd)?;
	(desc.ops.lseek)(desc.intern_fd, offset, whence)
}

/// Get file attributes
pub fn fstat(fd: i32, st: &mut Stat) -> Result<()> {
	let desc = fd_get(fd)?;
	(desc.ops.fstat)(desc.intern_fd, st)
}

/// Read one directory entry
pub fn readdir(fd: i32, entry: &mut Dirent) -> Result<()> {
	let desc = fd_get(fd)?;
	(desc.ops.readdir)(desc.intern_fd, entry)
}

/// Close a descriptor
///
/// The slot is released only after the owning layer reports success.
pub fn close(fd: i32) -> Result<()> {
	let desc = fd_get(fd)?;
	(desc.ops.close)(desc.intern_fd)?;
	let mut table = FD_TABLE.lock();
	table.remove(fd);
	Ok(())
}

/// Duplicate a descriptor
pub fn dup(fd: i32) -> Result<i32> {
	let desc = fd_get(fd)?;
	let new_intern = (desc.ops.dup)(desc.intern_fd)?;
	fd_create(FileDescriptor {
		intern_fd: new_intern,
		ops: desc.ops,
	})
}
