// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process panic hook integration.

use std::backtrace::Backtrace;
use std::panic::PanicHookInfo;
use std::sync::{Arc, Mutex, PoisonError};

use super::{CapturedFailure, FailureHook, FailureSeverity, FailureSink};
use crate::error::{Result, TelemetryError};

type PanicHookFn = dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static;

/// Reports panics as fatal failures.
///
/// Installing wraps the current process panic hook, which still runs after
/// the failure is reported. Uninstalling restores it.
#[derive(Default)]
pub struct PanicHook {
	previous: Mutex<Option<Arc<PanicHookFn>>>,
}

impl PanicHook {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_installed(&self) -> bool {
		self
			.previous
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.is_some()
	}
}

impl FailureHook for PanicHook {
	fn install(&self, sink: Arc<dyn FailureSink>) -> Result<()> {
		if std::thread::panicking() {
			return Err(TelemetryError::HookInstall(
				"cannot replace the panic hook while panicking".to_string(),
			));
		}

		let mut previous = self.previous.lock().unwrap_or_else(PoisonError::into_inner);
		if previous.is_some() {
			return Ok(());
		}

		let chained: Arc<PanicHookFn> = Arc::from(std::panic::take_hook());
		*previous = Some(Arc::clone(&chained));

		std::panic::set_hook(Box::new(move |info| {
			sink.on_failure(CapturedFailure {
				severity: FailureSeverity::Fatal,
				message: panic_message(info),
				stack_trace: Some(Backtrace::force_capture().to_string()),
			});
			chained(info);
		}));
		Ok(())
	}

	/// Restores the hook that was current at install time. While the thread
	/// is panicking the hook cannot be replaced, so it stays installed and a
	/// later call restores it.
	fn uninstall(&self) {
		if std::thread::panicking() {
			return;
		}

		let previous = self
			.previous
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.take();

		if let Some(previous) = previous {
			let _ = std::panic::take_hook();
			std::panic::set_hook(Box::new(move |info| previous(info)));
		}
	}

	fn name(&self) -> &'static str {
		"panic"
	}
}

/// Panic payload text plus its source location.
///
/// The location goes in the message rather than the trace so that line
/// changes do not regroup the crash.
fn panic_message(info: &PanicHookInfo<'_>) -> String {
	let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
		(*s).to_string()
	} else if let Some(s) = info.payload().downcast_ref::<String>() {
		s.clone()
	} else {
		"Box<dyn Any>".to_string()
	};

	match info.location() {
		Some(location) => format!(
			"{payload} at {}:{}:{}",
			location.file(),
			location.line(),
			location.column()
		),
		None => payload,
	}
}
