// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Captures `ERROR` events from the host's `tracing` subscriber.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use super::{CapturedFailure, FailureHook, FailureSeverity, FailureSink};
use crate::error::Result;

/// Events from these targets are never reported, so the SDK's own logging
/// cannot feed back into itself.
const SDK_TARGET_PREFIX: &str = "loom_telemetry";

type SinkSlot = Arc<RwLock<Option<Arc<dyn FailureSink>>>>;

/// Hook for logged errors.
///
/// Add [`TracingErrorHook::layer`] to the host subscriber once; it forwards
/// events only while the hook is installed.
///
/// ```ignore
/// let errors = TracingErrorHook::new();
/// tracing_subscriber::registry()
///     .with(tracing_subscriber::fmt::layer())
///     .with(errors.layer())
///     .init();
/// ```
#[derive(Clone, Default)]
pub struct TracingErrorHook {
	slot: SinkSlot,
}

impl TracingErrorHook {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn layer(&self) -> ErrorCaptureLayer {
		ErrorCaptureLayer {
			slot: Arc::clone(&self.slot),
		}
	}

	pub fn is_installed(&self) -> bool {
		self
			.slot
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.is_some()
	}
}

impl FailureHook for TracingErrorHook {
	fn install(&self, sink: Arc<dyn FailureSink>) -> Result<()> {
		*self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
		Ok(())
	}

	fn uninstall(&self) {
		self.slot.write().unwrap_or_else(PoisonError::into_inner).take();
	}

	fn name(&self) -> &'static str {
		"tracing"
	}
}

/// `tracing_subscriber` layer half of [`TracingErrorHook`].
#[derive(Clone)]
pub struct ErrorCaptureLayer {
	slot: SinkSlot,
}

impl<S> Layer<S> for ErrorCaptureLayer
where
	S: Subscriber,
{
	fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
		let metadata = event.metadata();
		if *metadata.level() != Level::ERROR || metadata.target().starts_with(SDK_TARGET_PREFIX) {
			return;
		}

		let sink = self
			.slot
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.clone();
		let Some(sink) = sink else {
			return;
		};

		let mut visitor = ErrorVisitor::default();
		event.record(&mut visitor);
		let stack_trace = visitor.stack_trace.take();

		sink.on_failure(CapturedFailure {
			severity: FailureSeverity::NonFatal,
			message: visitor.message(),
			stack_trace,
		});
	}
}

/// Pulls the message, an `error` field and any attached trace out of an event.
#[derive(Default)]
struct ErrorVisitor {
	message: Option<String>,
	error: Option<String>,
	stack_trace: Option<String>,
}

impl ErrorVisitor {
	fn message(self) -> String {
		match (self.message, self.error) {
			(Some(message), Some(error)) => format!("{message}: {error}"),
			(Some(message), None) => message,
			(None, Some(error)) => error,
			(None, None) => String::new(),
		}
	}

	fn set(&mut self, field: &Field, value: String) {
		match field.name() {
			"message" => self.message = Some(value),
			"error" => self.error = Some(value),
			"stack_trace" | "backtrace" => self.stack_trace = Some(value),
			_ => {}
		}
	}
}

impl Visit for ErrorVisitor {
	fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
		self.set(field, format!("{value:?}"));
	}

	fn record_str(&mut self, field: &Field, value: &str) {
		self.set(field, value.to_string());
	}

	fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
		self.set(field, value.to_string());
	}
}
