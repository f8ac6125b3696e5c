// SPDX-License-Identifier: GPL-2.0

//! Address-space handles
//!
//! Paging is owned by the memory subsystem outside this crate. The core only
//! needs an opaque handle that a process can hold a strong reference to, and
//! that the context-switch glue can thread into CR3.

use crate::sync::{Arc, Once};
use crate::types::PhysAddr;

/// An address space, identified by the physical address of its top-level
/// page table
#[derive(Debug)]
pub struct Pagemap {
	root: PhysAddr,
}

impl Pagemap {
	pub const fn new(root: PhysAddr) -> Self {
		Self { root }
	}

	/// Physical address of the top-level page table
	pub fn root(&self) -> PhysAddr {
		self.root
	}
}

/// The kernel's own address space, shared by all kernel threads
static KERNEL_PAGEMAP: Once<Arc<Pagemap>> = Once::new();

/// Get the kernel address space handle
pub fn kernel_pagemap() -> Arc<Pagemap> {
	KERNEL_PAGEMAP
		.call_once(|| Arc::new(Pagemap::new(PhysAddr::new(0))))
		.clone()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_kernel_pagemap_is_shared() {
		let a = kernel_pagemap();
		let b = kernel_pagemap();
		assert!(Arc::ptr_eq(&a, &b));
	}
}
