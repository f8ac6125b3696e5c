// SPDX-License-Identifier: GPL-2.0

//! Osprey filesystem drivers
//!
//! Drivers register themselves into the kernel's filesystem registry and are
//! reached exclusively through their operation tables.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod ramfs;
