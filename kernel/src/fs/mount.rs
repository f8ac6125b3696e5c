// SPDX-License-Identifier: GPL-2.0

//! Mount table and mountpoint resolution

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::fs::filesystem::Filesystem;
use crate::sync::{Arc, Spinlock};

/// Upper bound on a mount target path, in bytes
pub const MOUNT_PATH_MAX: usize = 2048;

/// A mount record binding an absolute path prefix to a mounted driver
/// instance
#[derive(Debug, Clone)]
pub struct Mountpoint {
	/// Absolute target path
	pub target: String,
	pub fs: Arc<Filesystem>,
	/// Driver-chosen cookie identifying this mounted instance
	pub magic: i32,
}

/// Mount table implementation
#[derive(Debug)]
pub struct MountTable {
	mounts: Vec<Mountpoint>,
}

impl MountTable {
	pub const fn new() -> Self {
		Self { mounts: Vec::new() }
	}

	/// Record a new mount. Fails if a record with the same target already
	/// exists.
	pub fn insert(&mut self, target: &str, fs: Arc<Filesystem>, magic: i32) -> Result<()> {
		if target.len() > MOUNT_PATH_MAX {
			return Err(Error::EINVAL);
		}
		if self.mounts.iter().any(|m| m.target == target) {
			return Err(Error::EEXIST);
		}
		self.mounts.push(Mountpoint {
			target: String::from(target),
			fs,
			magic,
		});
		Ok(())
	}

	/// Drop the record for `target`
	pub fn remove(&mut self, target: &str) -> Option<Mountpoint> {
		let idx = self.mounts.iter().position(|m| m.target == target)?;
		Some(self.mounts.remove(idx))
	}

	/// Find the mountpoint containing `path`
	///
	/// Selects the record whose target is the longest prefix of `path`
	/// followed by `/` or end of string; a target of exactly `/` matches
	/// unconditionally. The returned local path points into `path` at the
	/// byte after the matched prefix, or is `/` when the remainder is empty.
	pub fn resolve<'p>(&self, path: &'p str) -> Option<(&Mountpoint, &'p str)> {
		let mut best: Option<&Mountpoint> = None;

		for mount in &self.mounts {
			let target = mount.target.as_str();
			if !path.starts_with(target) {
				continue;
			}

			let boundary = target == "/"
				|| matches!(path.as_bytes().get(target.len()), None | Some(&b'/'));
			if !boundary {
				continue;
			}

			match best {
				Some(b) if b.target.len() >= target.len() => {}
				_ => best = Some(mount),
			}
		}

		let mount = best?;
		let local = if mount.target.len() > 1 {
			&path[mount.target.len()..]
		} else {
			path
		};
		let local = if local.is_empty() { "/" } else { local };
		Some((mount, local))
	}

	pub fn len(&self) -> usize {
		self.mounts.len()
	}

	pub fn is_empty(&self) -> bool {
		self.mounts.is_empty()
	}
}

/// Global mount table
static MOUNTPOINTS: Spinlock<MountTable> = Spinlock::new(MountTable::new());

/// Resolve `path` against the global mount table
///
/// Returns the driver, the magic cookie of the mounted instance and the path
/// local to it. The table lock is held only for the scan itself and is
/// released on every exit path.
pub fn resolve_mount(path: &str) -> Result<(Arc<Filesystem>, i32, String)> {
	let table = MOUNTPOINTS.lock();
	match table.resolve(path) {
		Some((mount, local)) => Ok((mount.fs.clone(), mount.magic, String::from(local))),
		None => Err(Error::ENOENT),
	}
}

/// Record a mount in the global table
pub(crate) fn record_mount(target: &str, fs: Arc<Filesystem>, magic: i32) -> Result<()> {
	let mut table = MOUNTPOINTS.lock();
	table.insert(target, fs, magic)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn named(name: &'static str) -> Arc<Filesystem> {
		Arc::new(Filesystem::new(name))
	}

	fn three_mount_table() -> MountTable {
		let mut table = MountTable::new();
		table.insert("/", named("fs-a"), 1).unwrap();
		table.insert("/usr", named("fs-b"), 2).unwrap();
		table.insert("/usr/local", named("fs-c"), 3).unwrap();
		table
	}

	#[test]
	fn test_root_mount_catches_everything() {
		let table = three_mount_table();
		let (mount, local) = table.resolve("/etc/passwd").unwrap();
		assert_eq!(mount.fs.name, "fs-a");
		assert_eq!(local, "/etc/passwd");
	}

	#[test]
	fn test_longest_prefix_wins() {
		let table = three_mount_table();

		let (mount, local) = table.resolve("/usr/bin/ls").unwrap();
		assert_eq!(mount.fs.name, "fs-b");
		assert_eq!(local, "/bin/ls");

		let (mount, local) = table.resolve("/usr/local/bin/x").unwrap();
		assert_eq!(mount.fs.name, "fs-c");
		assert_eq!(local, "/bin/x");
	}

	#[test]
	fn test_exact_mountpoint_resolves_to_its_root() {
		let table = three_mount_table();
		let (mount, local) = table.resolve("/usr").unwrap();
		assert_eq!(mount.fs.name, "fs-b");
		assert_eq!(local, "/");
	}

	#[test]
	fn test_prefix_must_end_on_segment_boundary() {
		let table = three_mount_table();
		// "/usrx" shares bytes with "/usr" but is not inside it
		let (mount, local) = table.resolve("/usrx").unwrap();
		assert_eq!(mount.fs.name, "fs-a");
		assert_eq!(local, "/usrx");
	}

	#[test]
	fn test_no_mounts_resolves_nothing() {
		let table = MountTable::new();
		assert!(table.resolve("/etc/passwd").is_none());
	}

	#[test]
	fn test_duplicate_target_rejected() {
		let mut table = MountTable::new();
		table.insert("/mnt", named("fs-a"), 1).unwrap();
		assert_eq!(
			table.insert("/mnt", named("fs-b"), 2),
			Err(Error::EEXIST)
		);
		assert_eq!(table.len(), 1);
	}

	#[test]
	fn test_remove_mount() {
		let mut table = three_mount_table();
		assert!(table.remove("/usr").is_some());
		let (mount, _) = table.resolve("/usr/bin/ls").unwrap();
		assert_eq!(mount.fs.name, "fs-a");
	}
}
