// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fingerprinting of stack-trace text for grouping repeated failures.
//!
//! A fingerprint is the SHA-256 of the first few caller frames after
//! framework-internal frames are dropped and volatile details (file
//! locations, addresses, lambda markers, symbol hashes) are stripped. Two
//! occurrences of the same defect on different builds or machines hash to the
//! same key; a trace with no caller frames yields an empty fingerprint and is
//! left to server-side grouping.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

/// Number of caller frames that contribute to a fingerprint.
pub const MAX_FINGERPRINT_FRAMES: usize = 5;

/// Namespaces whose frames say nothing about the caller's code.
///
/// A namespace `N` matches a qualified name equal to `N` or starting with
/// `N.` or `N::`.
pub const DEFAULT_FRAMEWORK_PREFIXES: &[&str] = &[
	"UnityEngine",
	"UnityEditor",
	"System",
	"Mono",
	"Microsoft",
	"std",
	"core",
	"alloc",
	"tokio",
	"futures",
	"futures_util",
	"backtrace",
	"tracing",
	"tracing_core",
	"tracing_subscriber",
	"loom_telemetry",
	"loom_telemetry_core",
];

// Rust backtraces prefix each frame with its index ("  12: my_app::run").
static FRAME_INDEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+:\s+").unwrap());

// Source-location continuation line emitted by `std::backtrace`.
static LOCATION_LINE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^at\s+\S+:\d+(?::\d+)?$").unwrap());

static METHOD_CANDIDATE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"([A-Za-z_][\w.]*)\.[A-Za-z_<][\w<>]*\s*[(:]").unwrap());

static QUALIFIED_PAIR: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"[A-Za-z_]\w*(?:\.|::)[A-Za-z_]\w*").unwrap());

static LOCATION_PARENS: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"\s*\((?:at\s[^()]*|[^()]*:\d+)\)").unwrap());

static HEX_ADDRESS: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"\s*\[0x[0-9A-Fa-f]+\]").unwrap());

static LINE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":line\s+\d+").unwrap());

// `<my_game::Sword as my_game::Weapon>::swing` keeps the implementing type.
static TRAIT_IMPL_PATH: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"<([A-Za-z_][\w:]*)(?:<[^<>]*>)?\s+as\s+[\w:]+(?:<[^<>]*>)?>::").unwrap()
});

// `<Start>b__0`, `<>c__DisplayClass2_0`, `List<int>`
static ANGLE_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^<>]*>\w*").unwrap());

static IN_PATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+in\s+.*$").unwrap());

// Takes the leading `::` with it so `main::{{closure}}` becomes `main`.
static CLOSURE_MARKER: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?:::)?\{\{[^{}]*\}\}").unwrap());

static SYMBOL_HASH: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"::h[0-9a-f]{16}\b").unwrap());

/// Computes grouping fingerprints from stack-trace text.
#[derive(Debug, Clone)]
pub struct Fingerprinter {
	framework_prefixes: Vec<String>,
}

impl Default for Fingerprinter {
	fn default() -> Self {
		Self::new(DEFAULT_FRAMEWORK_PREFIXES.iter().copied())
	}
}

impl Fingerprinter {
	/// Creates a fingerprinter that treats the given namespaces as
	/// framework-internal.
	pub fn new<I, S>(framework_prefixes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			framework_prefixes: framework_prefixes
				.into_iter()
				.map(Into::into)
				.filter(|p: &String| !p.is_empty())
				.collect(),
		}
	}

	/// Returns the lowercase hex SHA-256 fingerprint of `stack_trace`, or an
	/// empty string when no caller frame survives filtering.
	pub fn fingerprint(&self, stack_trace: &str) -> String {
		let frames = self.caller_frames(stack_trace);
		if frames.is_empty() {
			return String::new();
		}

		let mut hasher = Sha256::new();
		hasher.update(frames.join("|").as_bytes());
		hex::encode(hasher.finalize())
	}

	/// Returns the normalized caller frames that feed the fingerprint, at
	/// most [`MAX_FINGERPRINT_FRAMES`] of them.
	pub fn caller_frames(&self, stack_trace: &str) -> Vec<String> {
		stack_trace
			.lines()
			.map(str::trim)
			.filter(|line| !line.is_empty())
			.filter_map(|line| self.caller_frame(line))
			.take(MAX_FINGERPRINT_FRAMES)
			.collect()
	}

	fn caller_frame(&self, line: &str) -> Option<String> {
		let stripped = FRAME_INDEX.replace(line, "");
		let line = stripped.trim();
		if line.is_empty() || LOCATION_LINE.is_match(line) {
			return None;
		}

		let candidate = qualified_name(line)?;
		if self.is_framework(candidate) {
			return None;
		}

		let normalized = normalize_frame(line);
		(!normalized.is_empty()).then_some(normalized)
	}

	fn is_framework(&self, qualified_name: &str) -> bool {
		self.framework_prefixes.iter().any(|prefix| {
			qualified_name
				.strip_prefix(prefix.as_str())
				.is_some_and(|rest| rest.is_empty() || rest.starts_with('.') || rest.starts_with("::"))
		})
	}
}

/// Fingerprints `stack_trace` with the default framework namespaces.
pub fn fingerprint(stack_trace: &str) -> String {
	Fingerprinter::default().fingerprint(stack_trace)
}

/// Extracts the qualified type/module name of a frame line.
fn qualified_name(line: &str) -> Option<&str> {
	METHOD_CANDIDATE
		.captures(line)
		.and_then(|caps| caps.get(1))
		.or_else(|| QUALIFIED_PAIR.find(line))
		.map(|m| m.as_str())
}

fn normalize_frame(line: &str) -> String {
	let line = LOCATION_PARENS.replace_all(line, "");
	let line = HEX_ADDRESS.replace_all(&line, "");
	let line = LINE_SUFFIX.replace_all(&line, "");
	let line = TRAIT_IMPL_PATH.replace_all(&line, "${1}::");
	let line = strip_until_stable(&ANGLE_MARKER, &line);
	let line = IN_PATH.replace_all(&line, "");
	let line = CLOSURE_MARKER.replace_all(&line, "");
	let line = SYMBOL_HASH.replace_all(&line, "");
	line.trim().to_string()
}

/// Nested markers (`A<B<C>>`) need one pass per nesting level.
fn strip_until_stable(re: &Regex, input: &str) -> String {
	let mut current = input.to_string();
	loop {
		let next = re.replace_all(&current, "").into_owned();
		if next == current {
			return current;
		}
		current = next;
	}
}
