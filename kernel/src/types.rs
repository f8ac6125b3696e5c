// SPDX-License-Identifier: GPL-2.0

//! Common kernel types

use core::fmt;

/// Process ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Thread ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tid(pub u32);

impl fmt::Display for Tid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Physical address type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysAddr(pub usize);

impl PhysAddr {
	pub const fn new(addr: usize) -> Self {
		Self(addr)
	}

	pub const fn as_u64(self) -> u64 {
		self.0 as u64
	}

	pub const fn as_usize(self) -> usize {
		self.0
	}
}

/// Scheduler time, in timer ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Jiffies(pub u64);

impl Jiffies {
	pub fn as_u64(self) -> u64 {
		self.0
	}
}

impl core::ops::Add<u64> for Jiffies {
	type Output = Jiffies;

	fn add(self, rhs: u64) -> Self::Output {
		Jiffies(self.0 + rhs)
	}
}

impl core::ops::Add<Jiffies> for Jiffies {
	type Output = Jiffies;

	fn add(self, rhs: Jiffies) -> Self::Output {
		Jiffies(self.0 + rhs.0)
	}
}

impl core::ops::Sub<Jiffies> for Jiffies {
	type Output = Jiffies;

	fn sub(self, rhs: Jiffies) -> Self::Output {
		Jiffies(self.0.saturating_sub(rhs.0))
	}
}

impl fmt::Display for Jiffies {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}
