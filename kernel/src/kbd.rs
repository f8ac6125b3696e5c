// SPDX-License-Identifier: GPL-2.0

//! Keyboard line discipline
//!
//! The interrupt dispatcher feeds one scancode byte per call into
//! [`kbd_handler`]. Decoded characters flow through a two-buffer pipeline:
//! the raw buffer holds the line currently under edit, and in canonical mode
//! a newline commits it to the line buffer, where [`kbd_read`] picks it up.
//! In non-canonical mode readers drain the raw buffer directly.
//!
//! The keyboard lock guards both buffers and the modifier latches. The
//! handler runs with interrupts masked and takes the lock unconditionally;
//! readers acquire it with the yielding path and always release it before
//! sleeping.

use crate::error::Result;
use crate::scheduler::yield_ms;
use crate::sync::Spinlock;
use crate::tty::{get_termios, tty_putchar, LocalFlags, Termios};

/// Raw (line under edit) buffer size
pub const KBD_BUF_SIZE: usize = 2048;

/// Committed line buffer size
pub const BIG_BUF_SIZE: usize = 65536;

/// Scancodes at or above this value carry no character
const MAX_CODE: u8 = 0x57;

const CAPSLOCK: u8 = 0x3a;
const LEFT_SHIFT: u8 = 0x2a;
const RIGHT_SHIFT: u8 = 0x36;
const LEFT_SHIFT_REL: u8 = 0xaa;
const RIGHT_SHIFT_REL: u8 = 0xb6;
const LEFT_CTRL: u8 = 0x1d;
const LEFT_CTRL_REL: u8 = 0x9d;

/// Scancode of `C`, swallowed while ctrl is held
const CTRL_C: u8 = 0x2e;

const BACKSPACE: u8 = 0x08;

const ASCII_CAPSLOCK: [u8; MAX_CODE as usize] = [
	0, b'?', b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 0x08, b'\t',
	b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I', b'O', b'P', b'[', b']', b'\n', 0, b'A', b'S',
	b'D', b'F', b'G', b'H', b'J', b'K', b'L', b';', b'\'', b'`', 0, b'\\', b'Z', b'X', b'C', b'V',
	b'B', b'N', b'M', b',', b'.', b'/', 0, 0, 0, b' ', 0, 0, 0, 0, 0, 0,
	0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
	0, 0, 0, 0, 0, 0, 0,
];

const ASCII_SHIFT: [u8; MAX_CODE as usize] = [
	0, b'?', b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')', b'_', b'+', 0x08, b'\t',
	b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', b'\n', 0, b'A', b'S',
	b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':', b'"', b'~', 0, b'|', b'Z', b'X', b'C', b'V',
	b'B', b'N', b'M', b'<', b'>', b'?', 0, 0, 0, b' ', 0, 0, 0, 0, 0, 0,
	0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
	0, 0, 0, 0, 0, 0, 0,
];

const ASCII_SHIFT_CAPSLOCK: [u8; MAX_CODE as usize] = [
	0, b'?', b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')', b'_', b'+', 0x08, b'\t',
	b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'{', b'}', b'\n', 0, b'a', b's',
	b'd', b'f', b'g', b'h', b'j', b'k', b'l', b':', b'"', b'~', 0, b'|', b'z', b'x', b'c', b'v',
	b'b', b'n', b'm', b'<', b'>', b'?', 0, 0, 0, b' ', 0, 0, 0, 0, 0, 0,
	0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
	0, 0, 0, 0, 0, 0, 0,
];

const ASCII_NOMOD: [u8; MAX_CODE as usize] = [
	0, b'?', b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 0x08, b'\t',
	b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\n', 0, b'a', b's',
	b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', b'\'', b'`', 0, b'\\', b'z', b'x', b'c', b'v',
	b'b', b'n', b'm', b',', b'.', b'/', 0, 0, 0, b' ', 0, 0, 0, 0, 0, 0,
	0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
	0, 0, 0, 0, 0, 0, 0,
];

/// Keyboard buffers and modifier latches
///
/// `raw_i <= KBD_BUF_SIZE` and `line_i <= BIG_BUF_SIZE` hold at all times;
/// both indices are only touched under the keyboard lock.
pub struct KbdState {
	raw_buf: [u8; KBD_BUF_SIZE],
	raw_i: usize,
	line_buf: [u8; BIG_BUF_SIZE],
	line_i: usize,
	caps_lock: bool,
	shift: bool,
	ctrl: bool,
}

impl KbdState {
	pub const fn new() -> Self {
		Self {
			raw_buf: [0; KBD_BUF_SIZE],
			raw_i: 0,
			line_buf: [0; BIG_BUF_SIZE],
			line_i: 0,
			caps_lock: false,
			shift: false,
			ctrl: false,
		}
	}

	/// Bytes in the line currently under edit
	pub fn raw_bytes(&self) -> &[u8] {
		&self.raw_buf[..self.raw_i]
	}

	/// Committed bytes awaiting a reader
	pub fn line_bytes(&self) -> &[u8] {
		&self.line_buf[..self.line_i]
	}

	pub fn modifiers(&self) -> (bool, bool, bool) {
		(self.caps_lock, self.shift, self.ctrl)
	}

	#[cfg(test)]
	fn clear(&mut self) {
		self.raw_i = 0;
		self.line_i = 0;
		self.caps_lock = false;
		self.shift = false;
		self.ctrl = false;
	}

	/// Process one scancode under the given terminal attributes
	pub fn handle_scancode(&mut self, code: u8, termios: &Termios) {
		// Ctrl chords are the hook point for interrupt signalling. C is
		// swallowed; other combinations fall through undecorated.
		if self.ctrl && code == CTRL_C {
			return;
		}

		// Modifier latches track press and release explicitly, so a lost
		// event cannot invert the state. Caps lock toggles on press; its
		// release code is above MAX_CODE and carries no transition.
		match code {
			CAPSLOCK => {
				self.caps_lock = !self.caps_lock;
				return;
			}
			LEFT_SHIFT | RIGHT_SHIFT => {
				self.shift = true;
				return;
			}
			LEFT_SHIFT_REL | RIGHT_SHIFT_REL => {
				self.shift = false;
				return;
			}
			LEFT_CTRL => {
				self.ctrl = true;
				return;
			}
			LEFT_CTRL_REL => {
				self.ctrl = false;
				return;
			}
			_ => {}
		}

		if code >= MAX_CODE {
			return;
		}

		let c = match (self.caps_lock, self.shift) {
			(false, false) => ASCII_NOMOD[code as usize],
			(false, true) => ASCII_SHIFT[code as usize],
			(true, true) => ASCII_SHIFT_CAPSLOCK[code as usize],
			(true, false) => ASCII_CAPSLOCK[code as usize],
		};

		let canonical = termios.c_lflag.contains(LocalFlags::ICANON);
		let echo = termios.c_lflag.contains(LocalFlags::ECHO);

		if canonical {
			match c {
				b'\n' => {
					if self.raw_i == KBD_BUF_SIZE {
						return;
					}
					self.raw_buf[self.raw_i] = c;
					self.raw_i += 1;
					if echo {
						tty_putchar(c);
					}
					self.commit_line();
					return;
				}
				BACKSPACE => {
					if self.raw_i == 0 {
						return;
					}
					self.raw_i -= 1;
					self.raw_buf[self.raw_i] = 0;
					if echo {
						tty_putchar(BACKSPACE);
						tty_putchar(b' ');
						tty_putchar(BACKSPACE);
					}
					return;
				}
				_ => {}
			}
		}

		if self.raw_i == KBD_BUF_SIZE {
			return;
		}
		self.raw_buf[self.raw_i] = c;
		self.raw_i += 1;
		if echo {
			tty_putchar(c);
		}
	}

	/// Move the edited line into the committed buffer, clamped to its
	/// capacity. The only path by which canonical input reaches a reader.
	fn commit_line(&mut self) {
		for i in 0..self.raw_i {
			if self.line_i == BIG_BUF_SIZE {
				break;
			}
			self.line_buf[self.line_i] = self.raw_buf[i];
			self.line_i += 1;
		}
		self.raw_i = 0;
	}

	/// Drain the raw buffer into `buf`, zeroing every byte taken
	///
	/// Drain-all is capped at the caller's buffer, leaving any tail queued;
	/// qword's kbd_read copied all pending bytes regardless of count and
	/// could overrun a short read.
	fn drain_raw(&mut self, buf: &mut [u8]) -> usize {
		let n = core::cmp::min(self.raw_i, buf.len());
		for i in 0..n {
			buf[i] = self.raw_buf[i];
			self.raw_buf[i] = 0;
		}
		if n < self.raw_i {
			self.raw_buf.copy_within(n..self.raw_i, 0);
			for i in (self.raw_i - n)..self.raw_i {
				self.raw_buf[i] = 0;
			}
		}
		self.raw_i -= n;
		n
	}

	/// Consume one byte from the head of the committed buffer
	fn pop_line_byte(&mut self) -> Option<u8> {
		if self.line_i == 0 {
			return None;
		}
		let byte = self.line_buf[0];
		self.line_buf.copy_within(1..self.line_i, 0);
		self.line_i -= 1;
		Some(byte)
	}
}

/// Keyboard state singleton, shared by the interrupt handler and readers
static KBD: Spinlock<KbdState> = Spinlock::new(KbdState::new());

/// Initialize the keyboard line discipline
pub fn init() -> Result<()> {
	crate::info!("kbd: line discipline ready (canonical, echo)");
	Ok(())
}

/// Interrupt-side entry point: decode one scancode byte
///
/// Runs with interrupts masked; re-entry is prevented by the interrupt
/// controller, so the lock is taken unconditionally.
pub fn kbd_handler(input_byte: u8) {
	let mut kbd = KBD.lock();
	let termios = get_termios();
	kbd.handle_scancode(input_byte, &termios);
}

/// Blocking read of keyboard input
///
/// In canonical mode, delivers up to `buf.len()` bytes from committed lines,
/// blocking until at least one byte is available and returning early once
/// the committed buffer drains after any byte has been delivered. In
/// non-canonical mode, blocks until the raw buffer is non-empty and then
/// drains it. The lock is never held across a yield.
pub fn kbd_read(buf: &mut [u8]) -> usize {
	let canonical = get_termios().c_lflag.contains(LocalFlags::ICANON);

	if !canonical {
		loop {
			let mut kbd = KBD.lock_yielding();
			if kbd.raw_i == 0 {
				drop(kbd);
				yield_ms(10);
				continue;
			}
			return kbd.drain_raw(buf);
		}
	}

	let mut wait = true;
	let mut delivered = 0usize;
	let mut kbd = KBD.lock_yielding();
	while delivered < buf.len() {
		if let Some(byte) = kbd.pop_line_byte() {
			buf[delivered] = byte;
			delivered += 1;
			wait = false;
		} else if wait {
			drop(kbd);
			yield_ms(10);
			kbd = KBD.lock_yielding();
		} else {
			return delivered;
		}
	}
	buf.len()
}
