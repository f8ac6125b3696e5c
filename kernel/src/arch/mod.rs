// SPDX-License-Identifier: GPL-2.0

//! Architecture-specific definitions

pub mod x86_64;

pub use x86_64::context::Context;
