// SPDX-License-Identifier: GPL-2.0

//! Filesystem driver records and the driver registry
//!
//! A driver registers a [`Filesystem`] whose operation table has one optional
//! slot per operation. An unset slot means the operation is unimplemented:
//! dispatch takes the `ENOSYS` path explicitly and logs a warning on every
//! such call. `mount` is the only operation invoked without an internal fd;
//! it returns the magic cookie identifying the mounted instance, which is
//! threaded back into every later call through the mount record.

use alloc::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::fs::{Dirent, Stat};
use crate::sync::{Arc, Spinlock};

pub type MountFn = fn(source: &str, flags: u64, data: Option<&str>) -> Result<i32>;
pub type UnmountFn = fn(magic: i32) -> Result<()>;
pub type OpenFn = fn(path: &str, mode: u32, magic: i32) -> Result<i32>;
pub type CloseFn = fn(intern_fd: i32) -> Result<()>;
pub type DupFn = fn(intern_fd: i32) -> Result<i32>;
pub type ReadFn = fn(intern_fd: i32, buf: &mut [u8]) -> Result<usize>;
pub type WriteFn = fn(intern_fd: i32, buf: &[u8]) -> Result<usize>;
pub type LseekFn = fn(intern_fd: i32, offset: i64, whence: i32) -> Result<i64>;
pub type FstatFn = fn(intern_fd: i32, st: &mut Stat) -> Result<()>;
pub type ReaddirFn = fn(intern_fd: i32, entry: &mut Dirent) -> Result<()>;
pub type SyncFn = fn() -> Result<()>;

/// A filesystem driver: a name and its operation table
///
/// Construct with [`Filesystem::new`] and fill in the implemented slots:
///
/// ```ignore
/// let fs = Filesystem {
/// 	mount: Some(myfs_mount),
/// 	open: Some(myfs_open),
/// 	..Filesystem::new("myfs")
/// };
/// ```
#[derive(Debug, Clone)]
pub struct Filesystem {
	pub name: &'static str,
	pub mount: Option<MountFn>,
	pub unmount: Option<UnmountFn>,
	pub open: Option<OpenFn>,
	pub close: Option<CloseFn>,
	pub dup: Option<DupFn>,
	pub read: Option<ReadFn>,
	pub write: Option<WriteFn>,
	pub lseek: Option<LseekFn>,
	pub fstat: Option<FstatFn>,
	pub readdir: Option<ReaddirFn>,
	pub sync: Option<SyncFn>,
}

impl Filesystem {
	/// A driver record with every operation unset
	pub const fn new(name: &'static str) -> Self {
		Self {
			name,
			mount: None,
			unmount: None,
			open: None,
			close: None,
			dup: None,
			read: None,
			write: None,
			lseek: None,
			fstat: None,
			readdir: None,
			sync: None,
		}
	}

	fn not_implemented(&self, op: &str) -> Error {
		crate::warn!(
			"vfs: filesystem `{}` has no `{}` operation, returning ENOSYS",
			self.name,
			op
		);
		Error::ENOSYS
	}

	pub fn do_mount(&self, source: &str, flags: u64, data: Option<&str>) -> Result<i32> {
		match self.mount {
			Some(f) => f(source, flags, data),
			None => Err(self.not_implemented("mount")),
		}
	}

	pub fn do_unmount(&self, magic: i32) -> Result<()> {
		match self.unmount {
			Some(f) => f(magic),
			None => Err(self.not_implemented("unmount")),
		}
	}

	pub fn do_open(&self, path: &str, mode: u32, magic: i32) -> Result<i32> {
		match self.open {
			Some(f) => f(path, mode, magic),
			None => Err(self.not_implemented("open")),
		}
	}

	pub fn do_close(&self, intern_fd: i32) -> Result<()> {
		match self.close {
			Some(f) => f(intern_fd),
			None => Err(self.not_implemented("close")),
		}
	}

	pub fn do_dup(&self, intern_fd: i32) -> Result<i32> {
		match self.dup {
			Some(f) => f(intern_fd),
			None => Err(self.not_implemented("dup")),
		}
	}

	pub fn do_read(&self, intern_fd: i32, buf: &mut [u8]) -> Result<usize> {
		match self.read {
			Some(f) => f(intern_fd, buf),
			None => Err(self.not_implemented("read")),
		}
	}

	pub fn do_write(&self, intern_fd: i32, buf: &[u8]) -> Result<usize> {
		match self.write {
			Some(f) => f(intern_fd, buf),
			None => Err(self.not_implemented("write")),
		}
	}

	pub fn do_lseek(&self, intern_fd: i32, offset: i64, whence: i32) -> Result<i64> {
		match self.lseek {
			Some(f) => f(intern_fd, offset, whence),
			None => Err(self.not_implemented("lseek")),
		}
	}

	pub fn do_fstat(&self, intern_fd: i32, st: &mut Stat) -> Result<()> {
		match self.fstat {
			Some(f) => f(intern_fd, st),
			None => Err(self.not_implemented("fstat")),
		}
	}

	pub fn do_readdir(&self, intern_fd: i32, entry: &mut Dirent) -> Result<()> {
		match self.readdir {
			Some(f) => f(intern_fd, entry),
			None => Err(self.not_implemented("readdir")),
		}
	}

	pub fn do_sync(&self) -> Result<()> {
		match self.sync {
			Some(f) => f(),
			None => Err(self.not_implemented("sync")),
		}
	}
}

/// Global filesystem registry, indexed by driver name
static FILESYSTEMS: Spinlock<BTreeMap<&'static str, Arc<Filesystem>>> =
	Spinlock::new(BTreeMap::new());

/// Register a filesystem driver
pub fn install_fs(filesystem: Filesystem) -> Result<()> {
	let name = filesystem.name;
	let mut registry = FILESYSTEMS.lock();
	if registry.contains_key(name) {
		return Err(Error::EEXIST);
	}
	registry.insert(name, Arc::new(filesystem));
	drop(registry);

	crate::info!("vfs: installed filesystem `{}`", name);
	Ok(())
}

/// Look up a driver by type name
pub fn find_fs(name: &str) -> Result<Arc<Filesystem>> {
	let registry = FILESYSTEMS.lock();
	registry.get(name).cloned().ok_or(Error::ENOENT)
}

/// Invoke every registered driver's `sync` once, under the registry lock
pub fn sync_all() -> Result<()> {
	let registry = FILESYSTEMS.lock();
	for filesystem in registry.values() {
		if let Err(err) = filesystem.do_sync() {
			crate::warn!("vfs: sync of `{}` failed: {}", filesystem.name, err);
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn stub_open(_path: &str, _mode: u32, _magic: i32) -> Result<i32> {
		Ok(3)
	}

	fn stub_close(_intern_fd: i32) -> Result<()> {
		Ok(())
	}

	#[test]
	fn test_unset_operations_return_enosys() {
		let fs = Filesystem {
			open: Some(stub_open),
			close: Some(stub_close),
			..Filesystem::new("stubfs")
		};

		assert_eq!(fs.do_open("/x", 0, 0), Ok(3));
		assert_eq!(fs.do_close(3), Ok(()));

		let mut buf = [0u8; 4];
		assert_eq!(fs.do_read(3, &mut buf), Err(Error::ENOSYS));
		assert_eq!(fs.do_write(3, &buf), Err(Error::ENOSYS));
		assert_eq!(fs.do_lseek(3, 0, 0), Err(Error::ENOSYS));
		assert_eq!(fs.do_dup(3), Err(Error::ENOSYS));
		let mut st = Stat::zeroed();
		assert_eq!(fs.do_fstat(3, &mut st), Err(Error::ENOSYS));
		let mut entry = Dirent::empty();
		assert_eq!(fs.do_readdir(3, &mut entry), Err(Error::ENOSYS));
		assert_eq!(fs.do_sync(), Err(Error::ENOSYS));
	}

	#[test]
	fn test_enosys_dispatch_logs_a_warning() {
		let fs = Filesystem::new("warnfs");
		let _ = fs.do_sync();
		assert!(crate::console::log_snapshot().contains("warnfs"));
	}

	#[test]
	fn test_duplicate_install_rejected() {
		install_fs(Filesystem::new("dupfs")).unwrap();
		assert_eq!(install_fs(Filesystem::new("dupfs")), Err(Error::EEXIST));
	}

	#[test]
	fn test_find_missing_driver() {
		assert_eq!(find_fs("no-such-fs").unwrap_err(), Error::ENOENT);
	}
}
