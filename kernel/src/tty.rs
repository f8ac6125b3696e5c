// SPDX-License-Identifier: GPL-2.0

//! Terminal attributes and the TTY output seam
//!
//! Only the local-mode flags the keyboard line discipline honors are carried
//! here. Rendering belongs to the TTY layer proper, which is outside the
//! core; [`tty_putchar`] forwards echoed bytes to the console sink.
//!
//! Lock order: when both are needed, the termios lock is always taken after
//! the keyboard lock, and it is never held across a yield.

use bitflags::bitflags;

use crate::sync::Spinlock;

bitflags! {
	/// Local modes, Linux-compatible bit values
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct LocalFlags: u32 {
		/// Canonical input mode: buffer a line until newline
		const ICANON = 0o000002;
		/// Echo input back to the TTY
		const ECHO = 0o000010;
	}
}

/// Terminal attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Termios {
	pub c_lflag: LocalFlags,
}

impl Termios {
	/// Boot-time attributes: canonical mode with echo
	pub const fn new() -> Self {
		Self {
			c_lflag: LocalFlags::ICANON.union(LocalFlags::ECHO),
		}
	}
}

impl Default for Termios {
	fn default() -> Self {
		Self::new()
	}
}

/// Current terminal attributes
static TERMIOS: Spinlock<Termios> = Spinlock::new(Termios::new());

/// Snapshot the current terminal attributes
pub fn get_termios() -> Termios {
	*TERMIOS.lock()
}

/// Replace the current terminal attributes
pub fn set_termios(termios: Termios) {
	*TERMIOS.lock() = termios;
}

/// Emit one byte to the terminal
pub fn tty_putchar(byte: u8) {
	crate::console::putchar(byte);
}
