// SPDX-License-Identifier: GPL-2.0

//! Console and kernel output
//!
//! The console retains a bounded in-memory log of recent output and forwards
//! every byte to an optional sink installed by the platform glue (UART, VGA
//! text buffer). Rendering hardware is outside the core; without a sink the
//! log buffer is the only consumer.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{self, Write};

use crate::error::Result;
use crate::sync::Spinlock;

/// Upper bound on the retained log, in bytes
const LOG_BUF_SIZE: usize = 16384;

/// Output sink installed by the platform
pub type ConsoleSink = fn(u8);

/// Console writer
static CONSOLE: Spinlock<Console> = Spinlock::new(Console::new());

struct Console {
	initialized: bool,
	log: Vec<u8>,
	sink: Option<ConsoleSink>,
}

impl Console {
	const fn new() -> Self {
		Self {
			initialized: false,
			log: Vec::new(),
			sink: None,
		}
	}

	fn write_byte(&mut self, byte: u8) {
		if let Some(sink) = self.sink {
			sink(byte);
		}

		self.log.push(byte);
		if self.log.len() > LOG_BUF_SIZE {
			// Drop the oldest half rather than shifting on every byte
			self.log.drain(..LOG_BUF_SIZE / 2);
		}
	}

	fn write_str(&mut self, s: &str) {
		for byte in s.bytes() {
			self.write_byte(byte);
		}
	}
}

/// Initialize console
pub fn init() -> Result<()> {
	let mut console = CONSOLE.lock();
	console.initialized = true;
	Ok(())
}

/// Install the platform output sink
pub fn set_sink(sink: ConsoleSink) {
	let mut console = CONSOLE.lock();
	console.sink = Some(sink);
}

/// Write a single byte to the console
pub fn putchar(byte: u8) {
	let mut console = CONSOLE.lock();
	console.write_byte(byte);
}

/// Write string to console
pub fn write_str(s: &str) {
	let mut console = CONSOLE.lock();
	console.write_str(s);
}

/// Snapshot of the retained kernel log
pub fn log_snapshot() -> String {
	let console = CONSOLE.lock();
	String::from_utf8_lossy(&console.log).into_owned()
}

/// Discard the retained kernel log
pub fn clear_log() {
	let mut console = CONSOLE.lock();
	console.log.clear();
}

/// Print function for kernel output
pub fn _print(args: fmt::Arguments) {
	let mut console = CONSOLE.lock();
	let mut writer = ConsoleWriter(&mut console);
	// Writing to the log buffer cannot fail
	let _ = writer.write_fmt(args);
}

struct ConsoleWriter<'a>(&'a mut Console);

impl Write for ConsoleWriter<'_> {
	fn write_str(&mut self, s: &str) -> fmt::Result {
		self.0.write_str(s);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_log_retains_output() {
		write_str("console self test\n");
		assert!(log_snapshot().contains("console self test"));
	}
}
