// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Capture hooks: the points where host failures enter the pipeline.
//!
//! A [`FailureHook`] is installed with a [`FailureSink`] when capture starts
//! and uninstalled when it stops. Hooks call the sink synchronously and the
//! sink returns without blocking.

mod panic;
mod tracing_layer;

use std::sync::Arc;

use loom_telemetry_core::ReportKind;

use crate::error::Result;

pub use panic::PanicHook;
pub use tracing_layer::{ErrorCaptureLayer, TracingErrorHook};

/// Held by every test that panics or replaces the process panic hook.
#[cfg(test)]
pub(crate) static PROCESS_PANIC_HOOK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// How severe a captured failure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureSeverity {
	/// Unhandled failure (a panic).
	Fatal,
	/// Logged error.
	NonFatal,
}

impl FailureSeverity {
	pub fn report_kind(self) -> ReportKind {
		match self {
			Self::Fatal => ReportKind::Crash,
			Self::NonFatal => ReportKind::NonFatal,
		}
	}
}

/// A failure observed by a hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFailure {
	pub severity: FailureSeverity,
	pub message: String,
	/// `None` when the hook has no trace of its own; one is captured after
	/// admission.
	pub stack_trace: Option<String>,
}

/// Receives failures from installed hooks. Must not block or panic.
pub trait FailureSink: Send + Sync {
	fn on_failure(&self, failure: CapturedFailure);
}

/// A host-level failure notification source.
pub trait FailureHook: Send + Sync {
	/// Starts forwarding failures to `sink`.
	fn install(&self, sink: Arc<dyn FailureSink>) -> Result<()>;

	/// Stops forwarding. Calling it while not installed is a no-op.
	fn uninstall(&self);

	fn name(&self) -> &'static str;
}
