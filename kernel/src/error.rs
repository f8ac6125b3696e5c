// SPDX-License-Identifier: GPL-2.0

//! Error handling types and utilities

use core::fmt;

/// Kernel error type, Linux-compatible errno values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
	/// Operation not permitted (EPERM)
	EPERM,
	/// No such file or directory (ENOENT)
	ENOENT,
	/// No such process (ESRCH)
	ESRCH,
	/// I/O error (EIO)
	EIO,
	/// Bad file descriptor (EBADF)
	EBADF,
	/// Resource temporarily unavailable (EAGAIN)
	EAGAIN,
	/// Out of memory (ENOMEM)
	ENOMEM,
	/// Resource busy (EBUSY)
	EBUSY,
	/// File exists (EEXIST)
	EEXIST,
	/// No such device (ENODEV)
	ENODEV,
	/// Not a directory (ENOTDIR)
	ENOTDIR,
	/// Is a directory (EISDIR)
	EISDIR,
	/// Invalid argument (EINVAL)
	EINVAL,
	/// Illegal seek (ESPIPE)
	ESPIPE,
	/// Function not implemented (ENOSYS)
	ENOSYS,
}

impl Error {
	/// Convert error to errno value
	pub fn to_errno(self) -> i32 {
		match self {
			Error::EPERM => -1,
			Error::ENOENT => -2,
			Error::ESRCH => -3,
			Error::EIO => -5,
			Error::EBADF => -9,
			Error::EAGAIN => -11,
			Error::ENOMEM => -12,
			Error::EBUSY => -16,
			Error::EEXIST => -17,
			Error::ENODEV => -19,
			Error::ENOTDIR => -20,
			Error::EISDIR => -21,
			Error::EINVAL => -22,
			Error::ESPIPE => -29,
			Error::ENOSYS => -38,
		}
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::EPERM => write!(f, "Operation not permitted"),
			Error::ENOENT => write!(f, "No such file or directory"),
			Error::ESRCH => write!(f, "No such process"),
			Error::EIO => write!(f, "Input/output error"),
			Error::EBADF => write!(f, "Bad file descriptor"),
			Error::EAGAIN => write!(f, "Resource temporarily unavailable"),
			Error::ENOMEM => write!(f, "Out of memory"),
			Error::EBUSY => write!(f, "Resource busy"),
			Error::EEXIST => write!(f, "File exists"),
			Error::ENODEV => write!(f, "No such device"),
			Error::ENOTDIR => write!(f, "Not a directory"),
			Error::EISDIR => write!(f, "Is a directory"),
			Error::EINVAL => write!(f, "Invalid argument"),
			Error::ESPIPE => write!(f, "Illegal seek"),
			Error::ENOSYS => write!(f, "Function not implemented"),
		}
	}
}

/// Kernel result type
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_errno_values() {
		assert_eq!(Error::ENOENT.to_errno(), -2);
		assert_eq!(Error::EBADF.to_errno(), -9);
		assert_eq!(Error::ENOSYS.to_errno(), -38);
	}
}
