// SPDX-License-Identifier: GPL-2.0

//! x86_64 architecture support

pub mod context;
