// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Crash reports: assembly from pipeline state and wire serialization.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::breadcrumb::{Breadcrumb, BreadcrumbRing};
use crate::custom_keys::CustomKeyStore;
use crate::device::DeviceInfo;
use crate::error::TelemetryCoreError;
use crate::fingerprint::Fingerprinter;
use crate::json::ObjectWriter;

/// Failure class of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
	/// Unhandled failure.
	Crash,
	/// Logged or manually recorded error.
	NonFatal,
	/// Application not responding. Defined for the wire format; nothing in
	/// the SDK detects hangs.
	Anr,
}

impl ReportKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Crash => "CRASH",
			Self::NonFatal => "NON_FATAL",
			Self::Anr => "ANR",
		}
	}
}

impl fmt::Display for ReportKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ReportKind {
	type Err = TelemetryCoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"CRASH" => Ok(Self::Crash),
			"NON_FATAL" => Ok(Self::NonFatal),
			"ANR" => Ok(Self::Anr),
			_ => Err(TelemetryCoreError::InvalidReportKind(s.to_string())),
		}
	}
}

/// A fully assembled report. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashReport {
	kind: ReportKind,
	message: String,
	stack_trace: String,
	fingerprint: String,
	device: DeviceInfo,
	session_id: String,
	user_id: String,
	breadcrumbs: Vec<Breadcrumb>,
	custom_keys: BTreeMap<String, String>,
}

impl CrashReport {
	pub fn kind(&self) -> ReportKind {
		self.kind
	}

	pub fn message(&self) -> &str {
		&self.message
	}

	pub fn stack_trace(&self) -> &str {
		&self.stack_trace
	}

	/// 64-char lowercase hex, or empty when the trace could not be grouped.
	pub fn fingerprint(&self) -> &str {
		&self.fingerprint
	}

	pub fn device(&self) -> &DeviceInfo {
		&self.device
	}

	pub fn session_id(&self) -> &str {
		&self.session_id
	}

	pub fn user_id(&self) -> &str {
		&self.user_id
	}

	pub fn breadcrumbs(&self) -> &[Breadcrumb] {
		&self.breadcrumbs
	}

	pub fn custom_keys(&self) -> &BTreeMap<String, String> {
		&self.custom_keys
	}

	/// Serializes the report into the collector's JSON payload.
	///
	/// Field order is fixed; string values escape `\`, `"`, newline, carriage
	/// return, tab and the remaining control characters.
	pub fn to_json(&self) -> String {
		let mut out = String::with_capacity(512 + self.message.len() + self.stack_trace.len());
		let mut obj = ObjectWriter::begin(&mut out);

		obj.string("type", self.kind.as_str())
			.string("message", &self.message)
			.string("stackTrace", &self.stack_trace)
			.string("fingerprint", &self.fingerprint)
			.string("appVersion", &self.device.app_version)
			.string("sdkVersion", &self.device.sdk_version)
			.string("platform", &self.device.platform)
			.string("os", &self.device.os)
			.string("deviceModel", &self.device.device_model)
			.integer("deviceMemoryMb", self.device.device_memory_mb)
			.string("sessionId", &self.session_id)
			.string("userId", &self.user_id);

		let crumbs = obj.nested("breadcrumbs");
		crumbs.push('[');
		for (i, crumb) in self.breadcrumbs.iter().enumerate() {
			if i > 0 {
				crumbs.push(',');
			}
			let mut entry = ObjectWriter::begin(&mut *crumbs);
			entry
				.string("timestamp", &crumb.timestamp_rfc3339())
				.string("type", &crumb.category)
				.string("message", &crumb.message);
			entry.end();
		}
		crumbs.push(']');

		let mut keys = ObjectWriter::begin(obj.nested("customKeys"));
		for (key, value) in &self.custom_keys {
			keys.string(key, value);
		}
		keys.end();

		obj.end();
		out
	}
}

/// Everything a report needs besides the failure itself.
#[derive(Debug, Clone, Copy)]
pub struct ReportContext<'a> {
	pub device: &'a DeviceInfo,
	pub session_id: &'a str,
	pub user_id: &'a str,
	pub breadcrumbs: &'a BreadcrumbRing,
	pub custom_keys: &'a CustomKeyStore,
}

/// Assembles [`CrashReport`]s.
#[derive(Debug, Clone, Default)]
pub struct ReportBuilder {
	fingerprinter: Fingerprinter,
}

impl ReportBuilder {
	pub fn new(fingerprinter: Fingerprinter) -> Self {
		Self { fingerprinter }
	}

	pub fn fingerprinter(&self) -> &Fingerprinter {
		&self.fingerprinter
	}

	/// Builds a report, snapshotting breadcrumbs and merging `extra_keys`
	/// over the persistent custom keys.
	pub fn build(
		&self,
		kind: ReportKind,
		message: &str,
		stack_trace: &str,
		extra_keys: Option<&BTreeMap<String, String>>,
		context: &ReportContext<'_>,
	) -> CrashReport {
		CrashReport {
			kind,
			message: message.to_string(),
			stack_trace: stack_trace.to_string(),
			fingerprint: self.fingerprinter.fingerprint(stack_trace),
			device: context.device.clone(),
			session_id: context.session_id.to_string(),
			user_id: context.user_id.to_string(),
			breadcrumbs: context.breadcrumbs.snapshot(),
			custom_keys: context.custom_keys.merge(extra_keys),
		}
	}
}
