// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Minimal JSON object writer for the report wire payload.

use std::fmt::Write;

/// Writes one JSON object into a borrowed buffer, field by field.
pub(crate) struct ObjectWriter<'a> {
	out: &'a mut String,
	empty: bool,
}

impl<'a> ObjectWriter<'a> {
	pub(crate) fn begin(out: &'a mut String) -> Self {
		out.push('{');
		Self { out, empty: true }
	}

	pub(crate) fn string(&mut self, key: &str, value: &str) -> &mut Self {
		self.key(key);
		write_string(self.out, value);
		self
	}

	pub(crate) fn integer(&mut self, key: &str, value: u64) -> &mut Self {
		self.key(key);
		// Writing into a String cannot fail.
		let _ = write!(self.out, "{value}");
		self
	}

	/// Writes `key` and hands back the buffer for a nested value.
	pub(crate) fn nested(&mut self, key: &str) -> &mut String {
		self.key(key);
		&mut *self.out
	}

	pub(crate) fn end(self) {
		self.out.push('}');
	}

	fn key(&mut self, key: &str) {
		if !self.empty {
			self.out.push(',');
		}
		self.empty = false;
		write_string(self.out, key);
		self.out.push(':');
	}
}

/// Writes `value` as a quoted JSON string.
pub(crate) fn write_string(out: &mut String, value: &str) {
	out.push('"');
	for c in value.chars() {
		match c {
			'"' => out.push_str("\\\""),
			'\\' => out.push_str("\\\\"),
			'\n' => out.push_str("\\n"),
			'\r' => out.push_str("\\r"),
			'\t' => out.push_str("\\t"),
			c if u32::from(c) < 0x20 => {
				let _ = write!(out, "\\u{:04x}", u32::from(c));
			}
			c => out.push(c),
		}
	}
	out.push('"');
}
