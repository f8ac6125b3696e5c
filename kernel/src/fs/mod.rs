// SPDX-License-Identifier: GPL-2.0

//! Virtual File System dispatch layer
//!
//! The VFS binds absolute paths to mounted filesystem driver instances and
//! hides driver file descriptors behind handle indirection: every open file
//! is a `(driver, internal fd)` pair stored in the handle table, and the
//! public descriptor installed in the fd table dispatches through it. Drivers
//! plug in through [`filesystem::install_fs`]; their internals live outside
//! this crate.

pub mod filesystem;
pub mod mount;
pub mod path;

use alloc::string::String;
use alloc::vec::Vec;

pub use filesystem::{find_fs, install_fs, Filesystem};
pub use mount::{resolve_mount, MountTable, Mountpoint};
pub use path::absolute_path;

use crate::error::{Error, Result};
use crate::fd::{self, FdOps, FileDescriptor};
use crate::scheduler::yield_ms;
use crate::sync::{Arc, Spinlock};
use crate::types::Pid;

/// File access modes
pub mod flags {
	pub const O_ACCMODE: u32 = 0o00000003;
	pub const O_RDONLY: u32 = 0o00000000;
	pub const O_WRONLY: u32 = 0o00000001;
	pub const O_RDWR: u32 = 0o00000002;
	pub const O_CREAT: u32 = 0o00000100;
	pub const O_TRUNC: u32 = 0o00001000;
	pub const O_APPEND: u32 = 0o00002000;
}

/// Seek constants
pub const SEEK_SET: i32 = 0;
pub const SEEK_CUR: i32 = 1;
pub const SEEK_END: i32 = 2;

/// Maximum filename length
pub const NAME_MAX: usize = 255;

/// Directory entry types
pub const DT_UNKNOWN: u8 = 0;
pub const DT_DIR: u8 = 4;
pub const DT_REG: u8 = 8;

/// Handle table capacity
const MAX_VFS_HANDLES: usize = 65536;

/// File attributes, filled in by a driver's `fstat`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
	pub st_dev: u64,
	pub st_ino: u64,
	pub st_mode: u32,
	pub st_nlink: u64,
	pub st_size: i64,
	pub st_blksize: u64,
	pub st_blocks: u64,
	pub st_atime: i64,
	pub st_mtime: i64,
	pub st_ctime: i64,
}

impl Stat {
	pub const fn zeroed() -> Self {
		Self {
			st_dev: 0,
			st_ino: 0,
			st_mode: 0,
			st_nlink: 0,
			st_size: 0,
			st_blksize: 0,
			st_blocks: 0,
			st_atime: 0,
			st_mtime: 0,
			st_ctime: 0,
		}
	}
}

/// Directory entry, filled in by a driver's `readdir`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirent {
	pub d_ino: u64,
	pub d_type: u8,
	pub d_name: String,
}

impl Dirent {
	pub const fn empty() -> Self {
		Self {
			d_ino: 0,
			d_type: DT_UNKNOWN,
			d_name: String::new(),
		}
	}
}

/// One open file: the driver and the fd internal to it
#[derive(Debug)]
struct VfsHandle {
	fs: Arc<Filesystem>,
	intern_fd: i32,
}

/// Sparse handle table with a free list. `Arc` keeps a handle alive across
/// dispatch even if the entry is removed concurrently.
struct HandleTable {
	slots: Vec<Option<Arc<VfsHandle>>>,
	free: Vec<usize>,
}

impl HandleTable {
	const fn new() -> Self {
		Self {
			slots: Vec::new(),
			free: Vec::new(),
		}
	}

	fn insert(&mut self, handle: VfsHandle) -> Result<i32> {
		let slot = if let Some(slot) = self.free.pop() {
			slot
		} else {
			if self.slots.len() >= MAX_VFS_HANDLES {
				return Err(Error::ENOMEM);
			}
			self.slots.push(None);
			self.slots.len() - 1
		};
		self.slots[slot] = Some(Arc::new(handle));
		Ok(slot as i32)
	}

	fn get(&self, fd: i32) -> Result<Arc<VfsHandle>> {
		usize::try_from(fd)
			.ok()
			.and_then(|slot| self.slots.get(slot))
			.and_then(|slot| slot.clone())
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

static VFS_HANDLES: Spinlock<HandleTable> = Spinlock::new(HandleTable::new());

/// Take a reference on the handle behind `fd`
fn handle_get(fd: i32) -> Result<Arc<VfsHandle>> {
	let table = VFS_HANDLES.lock();
	table.get(fd)
}

fn vfs_read(fd: i32, buf: &mut [u8]) -> Result<usize> {
	let handle = handle_get(fd)?;
	handle.fs.do_read(handle.intern_fd, buf)
}

fn vfs_write(fd: i32, buf: &[u8]) -> Result<usize> {
	let handle = handle_get(fd)?;
	handle.fs.do_write(handle.intern_fd, buf)
}

fn vfs_lseek(fd: i32, offset: i64, whence: i32) -> Result<i64> {
	let handle = handle_get(fd)?;
	handle.fs.do_lseek(handle.intern_fd, offset, whence)
}

fn vfs_fstat(fd: i32, st: &mut Stat) -> Result<()> {
	let handle = handle_get(fd)?;
	handle.fs.do_fstat(handle.intern_fd, st)
}

fn vfs_readdir(fd: i32, entry: &mut Dirent) -> Result<()> {
	let handle = handle_get(fd)?;
	handle.fs.do_readdir(handle.intern_fd, entry)
}

/// Close the handle behind `fd`
///
/// The entry is removed only after the driver reports success; on driver
/// failure the handle stays valid and the error is propagated.
fn vfs_close(fd: i32) -> Result<()> {
	let handle = handle_get(fd)?;
	handle.fs.do_close(handle.intern_fd)?;
	let mut table = VFS_HANDLES.lock();
	table.remove(fd);
	Ok(())
}

/// Duplicate the handle behind `fd`
///
/// The driver duplicates its internal fd; a fresh handle record pointing at
/// the new internal fd is installed. No record is created if the driver
/// fails.
fn vfs_dup(fd: i32) -> Result<i32> {
	let handle = handle_get(fd)?;
	let new_intern = handle.fs.do_dup(handle.intern_fd)?;

	let mut table = VFS_HANDLES.lock();
	match table.insert(VfsHandle {
		fs: handle.fs.clone(),
		intern_fd: new_intern,
	}) {
		Ok(new_fd) => Ok(new_fd),
		Err(err) => {
			drop(table);
			let _ = handle.fs.do_close(new_intern);
			Err(err)
		}
	}
}

/// Operation vector installed into descriptors created by [`open`]
static VFS_FD_OPS: FdOps = FdOps {
	close: vfs_close,
	fstat: vfs_fstat,
	read: vfs_read,
	write: vfs_write,
	lseek: vfs_lseek,
	dup: vfs_dup,
	readdir: vfs_readdir,
};

/// Open `path` and return a file descriptor
///
/// The path is canonicalized, resolved to its mountpoint and opened through
/// the owning driver; the resulting internal fd is wrapped in a VFS handle
/// and installed in the descriptor table.
pub fn open(path: &str, mode: u32) -> Result<i32> {
	let abs = absolute_path(path, "/");
	let (fs, magic, local) = resolve_mount(&abs)?;

	let intern_fd = fs.do_open(&local, mode, magic)?;

	let vfs_fd = {
		let mut table = VFS_HANDLES.lock();
		table.insert(VfsHandle {
			fs: fs.clone(),
			intern_fd,
		})
	};
	let vfs_fd = match vfs_fd {
		Ok(fd) => fd,
		Err(err) => {
			// Do not leak the driver's side of the open
			let _ = fs.do_close(intern_fd);
			return Err(err);
		}
	};

	match fd::fd_create(FileDescriptor {
		intern_fd: vfs_fd,
		ops: &VFS_FD_OPS,
	}) {
		Ok(fd) => Ok(fd),
		Err(err) => {
			let _ = vfs_close(vfs_fd);
			Err(err)
		}
	}
}

/// Mount a filesystem of type `fs_type` at `target`
pub fn mount(
	source: &str,
	target: &str,
	fs_type: &str,
	flags: u64,
	data: Option<&str>,
) -> Result<()> {
	let fs = find_fs(fs_type)?;

	let magic = fs.do_mount(source, flags, data)?;

	if let Err(err) = mount::record_mount(target, fs.clone(), magic) {
		// Roll the driver's side back rather than leaking the instance
		if let Err(uerr) = fs.do_unmount(magic) {
			crate::warn!(
				"vfs: could not undo mount of `{}` after failing to record it: {}",
				source,
				uerr
			);
		}
		return Err(err);
	}

	crate::info!(
		"vfs: mounted `{}` on `{}`, type `{}`",
		source,
		target,
		fs_type
	);
	Ok(())
}

/// Flush every mounted filesystem
pub fn sync() -> Result<()> {
	filesystem::sync_all()
}

/// Body of the background flush thread: flush all filesystems every two
/// seconds, forever
pub fn sync_worker(_arg: usize) {
	loop {
		yield_ms(2000);
		let _ = sync();
	}
}

/// Initialize the VFS and start the background flush thread in the kernel
/// process
pub fn init() -> Result<()> {
	crate::process::thread_create(Pid(0), sync_worker, 0)?;
	crate::info!("vfs: sync worker started");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use core::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

	// The mock driver records which internal fd each operation saw so the
	// dispatch path can be checked end to end.
	static MOCK_LAST_FD: AtomicI32 = AtomicI32::new(-1);
	static MOCK_NEXT_INTERN: AtomicI32 = AtomicI32::new(100);
	static MOCK_CLOSES: AtomicUsize = AtomicUsize::new(0);
	static MOCK_SYNCS: AtomicUsize = AtomicUsize::new(0);

	fn mock_mount(_source: &str, _flags: u64, _data: Option<&str>) -> Result<i32> {
		Ok(42)
	}

	fn mock_unmount(_magic: i32) -> Result<()> {
		Ok(())
	}

	fn mock_open(path: &str, _mode: u32, magic: i32) -> Result<i32> {
		if magic != 42 {
			return Err(Error::EINVAL);
		}
		if path == "/missing" {
			return Err(Error::ENOENT);
		}
		Ok(MOCK_NEXT_INTERN.fetch_add(1, Ordering::SeqCst))
	}

	fn mock_close(intern_fd: i32) -> Result<()> {
		if intern_fd == 900 {
			return Err(Error::EIO);
		}
		MOCK_LAST_FD.store(intern_fd, Ordering::SeqCst);
		MOCK_CLOSES.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	fn mock_dup(intern_fd: i32) -> Result<i32> {
		MOCK_LAST_FD.store(intern_fd, Ordering::SeqCst);
		Ok(intern_fd + 1000)
	}

	fn mock_read(intern_fd: i32, buf: &mut [u8]) -> Result<usize> {
		MOCK_LAST_FD.store(intern_fd, Ordering::SeqCst);
		buf.fill(b'r');
		Ok(buf.len())
	}

	fn mock_write(intern_fd: i32, buf: &[u8]) -> Result<usize> {
		MOCK_LAST_FD.store(intern_fd, Ordering::SeqCst);
		Ok(buf.len())
	}

	fn mock_lseek(intern_fd: i32, offset: i64, _whence: i32) -> Result<i64> {
		MOCK_LAST_FD.store(intern_fd, Ordering::SeqCst);
		Ok(offset)
	}

	fn mock_fstat(intern_fd: i32, st: &mut Stat) -> Result<()> {
		MOCK_LAST_FD.store(intern_fd, Ordering::SeqCst);
		st.st_ino = intern_fd as u64;
		Ok(())
	}

	fn mock_readdir(intern_fd: i32, entry: &mut Dirent) -> Result<()> {
		MOCK_LAST_FD.store(intern_fd, Ordering::SeqCst);
		entry.d_name = String::from("entry");
		entry.d_type = DT_REG;
		Ok(())
	}

	fn mock_sync() -> Result<()> {
		MOCK_SYNCS.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	fn mock_filesystem(name: &'static str) -> Filesystem {
		Filesystem {
			mount: Some(mock_mount),
			unmount: Some(mock_unmount),
			open: Some(mock_open),
			close: Some(mock_close),
			dup: Some(mock_dup),
			read: Some(mock_read),
			write: Some(mock_write),
			lseek: Some(mock_lseek),
			fstat: Some(mock_fstat),
			readdir: Some(mock_readdir),
			sync: Some(mock_sync),
			..Filesystem::new(name)
		}
	}

	fn install_and_mount(name: &'static str, target: &str) {
		let _ = install_fs(mock_filesystem(name));
		mount("mockdev", target, name, 0, None).unwrap();
	}

	// MOCK_LAST_FD is shared by every test driving the mock driver; tests
	// asserting on it serialize here.
	fn dispatch_lock() -> std::sync::MutexGuard<'static, ()> {
		static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
		LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	#[test]
	fn test_open_dispatches_with_internal_fd() {
		let _guard = dispatch_lock();
		install_and_mount("mockfs-a", "/mock-a");

		let fd = open("/mock-a/file", 0).unwrap();

		// Every operation must reach the driver with the internal fd the
		// driver handed out at open, not the public one.
		let mut buf = [0u8; 4];
		assert_eq!(fd::read(fd, &mut buf), Ok(4));
		let intern = MOCK_LAST_FD.load(Ordering::SeqCst);
		assert!(intern >= 100);
		assert_eq!(buf, [b'r'; 4]);

		assert_eq!(fd::write(fd, b"xy"), Ok(2));
		assert_eq!(MOCK_LAST_FD.load(Ordering::SeqCst), intern);

		assert_eq!(fd::lseek(fd, 5, SEEK_SET), Ok(5));
		assert_eq!(MOCK_LAST_FD.load(Ordering::SeqCst), intern);

		let mut st = Stat::zeroed();
		fd::fstat(fd, &mut st).unwrap();
		assert_eq!(st.st_ino, intern as u64);

		let mut entry = Dirent::empty();
		fd::readdir(fd, &mut entry).unwrap();
		assert_eq!(entry.d_name, "entry");

		fd::close(fd).unwrap();
		assert_eq!(MOCK_LAST_FD.load(Ordering::SeqCst), intern);
	}

	#[test]
	fn test_open_unknown_mount_fails() {
		assert!(open("/no-such-mount-anywhere/x", 0).is_err());
	}

	#[test]
	fn test_open_propagates_driver_failure() {
		install_and_mount("mockfs-b", "/mock-b");
		assert_eq!(open("/mock-b/missing", 0), Err(Error::ENOENT));
	}

	#[test]
	fn test_open_normalizes_path_before_resolution() {
		install_and_mount("mockfs-c", "/mock-c");
		// Redundant separators and dot segments collapse before the mount
		// table sees the path
		assert!(open("/mock-c//sub/./file", 0).is_ok());
	}

	#[test]
	fn test_dup_creates_independent_handle() {
		let _guard = dispatch_lock();
		install_and_mount("mockfs-d", "/mock-d");

		let fd = open("/mock-d/file", 0).unwrap();
		let mut buf = [0u8; 1];
		fd::read(fd, &mut buf).unwrap();
		let intern = MOCK_LAST_FD.load(Ordering::SeqCst);

		let dup_fd = fd::dup(fd).unwrap();
		assert_ne!(dup_fd, fd);

		// The duplicate dispatches with the driver-duplicated internal fd
		fd::read(dup_fd, &mut buf).unwrap();
		assert_eq!(MOCK_LAST_FD.load(Ordering::SeqCst), intern + 1000);

		// The original is unaffected
		fd::read(fd, &mut buf).unwrap();
		assert_eq!(MOCK_LAST_FD.load(Ordering::SeqCst), intern);
	}

	#[test]
	fn test_close_failure_retains_handle() {
		let _guard = dispatch_lock();
		// Internal fd 900 makes the mock driver's close fail
		let name = "mockfs-e";
		let _ = install_fs(Filesystem {
			close: Some(mock_close),
			read: Some(mock_read),
			..Filesystem::new(name)
		});

		let vfs_fd = {
			let mut table = VFS_HANDLES.lock();
			table.insert(VfsHandle {
				fs: find_fs(name).unwrap(),
				intern_fd: 900,
			})
			.unwrap()
		};

		assert_eq!(vfs_close(vfs_fd), Err(Error::EIO));

		// The handle must still dispatch
		let mut buf = [0u8; 1];
		assert_eq!(vfs_read(vfs_fd, &mut buf), Ok(1));
	}

	#[test]
	fn test_mount_unknown_type_fails() {
		assert_eq!(
			mount("dev", "/nowhere", "definitely-not-a-fs", 0, None),
			Err(Error::ENOENT)
		);
	}

	#[test]
	fn test_mount_duplicate_target_rolls_back_driver() {
		let _ = install_fs(mock_filesystem("mockfs-f"));
		mount("dev0", "/mock-f", "mockfs-f", 0, None).unwrap();
		assert_eq!(
			mount("dev1", "/mock-f", "mockfs-f", 0, None),
			Err(Error::EEXIST)
		);
	}

	#[test]
	fn test_mount_logs_info_line() {
		let _ = install_fs(mock_filesystem("mockfs-g"));
		mount("devg", "/mock-g", "mockfs-g", 0, None).unwrap();
		assert!(crate::console::log_snapshot().contains("mounted `devg` on `/mock-g`"));
	}

	#[test]
	fn test_sync_reaches_drivers() {
		let _ = install_fs(mock_filesystem("mockfs-h"));
		let before = MOCK_SYNCS.load(Ordering::SeqCst);
		sync().unwrap();
		assert!(MOCK_SYNCS.load(Ordering::SeqCst) > before);
	}

	#[test]
	fn test_stale_fd_is_rejected() {
		assert_eq!(vfs_read(999_999, &mut [0u8; 1]), Err(Error::EBADF));
	}
}
