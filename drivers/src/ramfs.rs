// SPDX-License-Identifier: GPL-2.0

//! In-memory file system
//!
//! A flat-namespace RAM-backed filesystem. Each `mount` creates an
//! independent instance; the instance index is the magic cookie the VFS
//! threads back into every call. Files are plain byte vectors, so `sync` has
//! nothing to flush and succeeds trivially.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use kernel::error::{Error, Result};
use kernel::fs::flags::{O_CREAT, O_TRUNC};
use kernel::fs::{install_fs, Dirent, Filesystem, Stat, DT_REG, SEEK_CUR, SEEK_END, SEEK_SET};
use kernel::sync::Spinlock;

/// Regular file mode reported by `fstat`
const RAMFS_FILE_MODE: u32 = 0o100644;

/// Directory mode reported by `fstat`
const RAMFS_DIR_MODE: u32 = 0o040755;

/// One mounted instance
struct RamfsInstance {
	source: String,
	files: BTreeMap<String, Vec<u8>>,
}

/// One open file or directory
#[derive(Debug, Clone)]
struct RamfsHandle {
	instance: usize,
	path: String,
	pos: i64,
	dir: bool,
}

static INSTANCES: Spinlock<Vec<Option<RamfsInstance>>> = Spinlock::new(Vec::new());
static HANDLES: Spinlock<Vec<Option<RamfsHandle>>> = Spinlock::new(Vec::new());

fn alloc_handle(handle: RamfsHandle) -> i32 {
	let mut handles = HANDLES.lock();
	if let Some(slot) = handles.iter().position(|h| h.is_none()) {
		handles[slot] = Some(handle);
		slot as i32
	} else {
		handles.push(Some(handle));
		(handles.len() - 1) as i32
	}
}

fn get_handle(fd: i32) -> Result<RamfsHandle> {
	let handles = HANDLES.lock();
	usize::try_from(fd)
		.ok()
		.and_then(|slot| handles.get(slot))
		.and_then(|slot| slot.clone())
		.ok_or(Error::EBADF)
}

fn update_handle_pos(fd: i32, pos: i64) {
	let mut handles = HANDLES.lock();
	if let Some(Some(handle)) = handles.get_mut(fd as usize) {
		handle.pos = pos;
	}
}

fn ramfs_mount(source: &str, _flags: u64, _data: Option<&str>) -> Result<i32> {
	let mut instances = INSTANCES.lock();
	let instance = RamfsInstance {
		source: String::from(source),
		files: BTreeMap::new(),
	};
	if let Some(slot) = instances.iter().position(|i| i.is_none()) {
		instances[slot] = Some(instance);
		Ok(slot as i32)
	} else {
		instances.push(Some(instance));
		Ok((instances.len() - 1) as i32)
	}
}

fn ramfs_unmount(magic: i32) -> Result<()> {
	let slot = usize::try_from(magic).map_err(|_| Error::EINVAL)?;

	{
		let handles = HANDLES.lock();
		if handles
			.iter()
			.flatten()
			.any(|handle| handle.instance == slot)
		{
			return Err(Error::EBUSY);
		}
	}

	let mut instances = INSTANCES.lock();
	match instances.get_mut(slot) {
		Some(entry) if entry.is_some() => {
			*entry = None;
			Ok(())
		}
		_ => Err(Error::ENOENT),
	}
}

fn ramfs_open(path: &str, mode: u32, magic: i32) -> Result<i32> {
	let slot = usize::try_from(magic).map_err(|_| Error::EINVAL)?;
	let mut instances = INSTANCES.lock();
	let instance = instances
		.get_mut(slot)
		.and_then(|i| i.as_mut())
		.ok_or(Error::ENOENT)?;

	if path == "/" {
		return Ok(alloc_handle(RamfsHandle {
			instance: slot,
			path: String::from(path),
			pos: 0,
			dir: true,
		}));
	}

	match instance.files.get_mut(path) {
		Some(data) => {
			if mode & O_TRUNC != 0 {
				data.clear();
			}
		}
		None => {
			if mode & O_CREAT == 0 {
				return Err(Error::ENOENT);
			}
			instance.files.insert(String::from(path), Vec::new());
		}
	}

	Ok(alloc_handle(RamfsHandle {
		instance: slot,
		path: String::from(path),
		pos: 0,
		dir: false,
	}))
}

fn ramfs_close(fd: i32) -> Result<()> {
	let mut handles = HANDLES.lock();
	match usize::try_from(fd).ok().and_then(|slot| handles.get_mut(slot)) {
		Some(entry) if entry.is_some() => {
			*entry = None;
			Ok(())
		}
		_ => Err(Error::EBADF),
	}
}

fn ramfs_dup(fd: i32) -> Result<i32> {
	let handle = get_handle(fd)?;
	Ok(alloc_handle(handle))
}

fn ramfs_read(fd: i32, buf: &mut [u8]) -> Result<usize> {
	let handle = get_handle(fd)?;
	if handle.dir {
		return Err(Error::EISDIR);
	}

	let instances = INSTANCES.lock();
	let instance = instances
		.get(handle.instance)
		.and_then(|i| i.as_ref())
		.ok_or(Error::ENOENT)?;
	let data = instance.files.get(&handle.path).ok_or(Error::ENOENT)?;

	let pos = handle.pos as usize;
	if pos >= data.len() {
		return Ok(0);
	}
	let n = core::cmp::min(buf.len(), data.len() - pos);
	buf[..n].copy_from_slice(&data[pos..pos + n]);
	drop(instances);

	update_handle_pos(fd, (pos + n) as i64);
	Ok(n)
}

fn ramfs_write(fd: i32, buf: &[u8]) -> Result<usize> {
	let handle = get_handle(fd)?;
	if handle.dir {
		return Err(Error::EISDIR);
	}

	let mut instances = INSTANCES.lock();
	let instance = instances
		.get_mut(handle.instance)
		.and_then(|i| i.as_mut())
		.ok_or(Error::ENOENT)?;
	let data = instance.files.get_mut(&handle.path).ok_or(Error::ENOENT)?;

	let pos = handle.pos as usize;
	if data.len() < pos + buf.len() {
		data.resize(pos + buf.len(), 0);
	}
	data[pos..pos + buf.len()].copy_from_slice(buf);
	drop(instances);

	update_handle_pos(fd, (pos + buf.len()) as i64);
	Ok(buf.len())
}

fn ramfs_lseek(fd: i32, offset: i64, whence: i32) -> Result<i64> {
	let handle = get_handle(fd)?;
	if handle.dir {
		return Err(Error::ESPIPE);
	}

	let size = {
		let instances = INSTANCES.lock();
		let instance = instances
			.get(handle.instance)
			.and_then(|i| i.as_ref())
			.ok_or(Error::ENOENT)?;
		instance.files.get(&handle.path).ok_or(Error::ENOENT)?.len() as i64
	};

	let new_pos = match whence {
		SEEK_SET => offset,
		SEEK_CUR => handle.pos + offset,
		SEEK_END => size + offset,
		_ => return Err(Error::EINVAL),
	};
	if new_pos < 0 {
		return Err(Error::EINVAL);
	}

	update_handle_pos(fd, new_pos);
	Ok(new_pos)
}

fn ramfs_fstat(fd: i32, st: &mut Stat) -> Result<()> {
	let handle = get_handle(fd)?;

	let instances = INSTANCES.lock();
	let instance = instances
		.get(handle.instance)
		.and_then(|i| i.as_ref())
		.ok_or(Error::ENOENT)?;

	*st = Stat::zeroed();
	st.st_dev = handle.instance as u64;
	st.st_nlink = 1;
	st.st_blksize = 4096;

	if handle.dir {
		st.st_mode = RAMFS_DIR_MODE;
		st.st_size = instance.files.len() as i64;
		return Ok(());
	}

	let data = instance.files.get(&handle.path).ok_or(Error::ENOENT)?;
	st.st_ino = instance
		.files
		.keys()
		.position(|k| *k == handle.path)
		.map(|i| i as u64 + 1)
		.unwrap_or(0);
	st.st_mode = RAMFS_FILE_MODE;
	st.st_size = data.len() as i64;
	Ok(())
}

fn ramfs_readdir(fd: i32, entry: &mut Dirent) -> Result<()> {
	let handle = get_handle(fd)?;
	if !handle.dir {
		return Err(Error::ENOTDIR);
	}

	let instances = INSTANCES.lock();
	let instance = instances
		.get(handle.instance)
		.and_then(|i| i.as_ref())
		.ok_or(Error::ENOENT)?;

	let idx = handle.pos as usize;
	let Some((name, _)) = instance.files.iter().nth(idx) else {
		return Err(Error::ENOENT);
	};

	entry.d_ino = idx as u64 + 1;
	entry.d_type = DT_REG;
	entry.d_name = String::from(name.trim_start_matches('/'));
	drop(instances);

	update_handle_pos(fd, idx as i64 + 1);
	Ok(())
}

fn ramfs_sync() -> Result<()> {
	// Nothing is backed by storage
	Ok(())
}

/// Register the ramfs driver with the VFS
pub fn init() -> Result<()> {
	install_fs(Filesystem {
		mount: Some(ramfs_mount),
		unmount: Some(ramfs_unmount),
		open: Some(ramfs_open),
		close: Some(ramfs_close),
		dup: Some(ramfs_dup),
		read: Some(ramfs_read),
		write: Some(ramfs_write),
		lseek: Some(ramfs_lseek),
		fstat: Some(ramfs_fstat),
		readdir: Some(ramfs_readdir),
		sync: Some(ramfs_sync),
		..Filesystem::new("ramfs")
	})
}

/// Report the device a mounted instance was created from
pub fn instance_source(magic: i32) -> Result<String> {
	let instances = INSTANCES.lock();
	instances
		.get(magic as usize)
		.and_then(|i| i.as_ref())
		.map(|i| i.source.clone())
		.ok_or(Error::ENOENT)
}
