// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Reporter configuration: defaults, TOML files and environment overrides.

use std::fmt;
use std::time::Duration;

use loom_telemetry_core::{RateLimitConfig, DEFAULT_FRAMEWORK_PREFIXES};
use serde::Deserialize;

use crate::error::Result;
use crate::retry::RetryConfig;

/// Environment variable overriding [`TelemetryConfig::base_url`].
pub const ENV_BASE_URL: &str = "LOOM_TELEMETRY_BASE_URL";
/// Environment variable overriding [`TelemetryConfig::api_key`].
pub const ENV_API_KEY: &str = "LOOM_TELEMETRY_API_KEY";
/// Environment variable overriding [`TelemetryConfig::app_version`].
pub const ENV_APP_VERSION: &str = "LOOM_TELEMETRY_APP_VERSION";

pub const DEFAULT_REPORT_PATH: &str = "/api/crash/reports";
pub const DEFAULT_SESSION_PATH: &str = "/api/crash/sessions";

/// Settings for a [`CrashReporter`](crate::CrashReporter).
///
/// ```toml
/// base_url = "https://loom.example.com"
/// api_key = "lt_live_xxx"
/// app_version = "1.4.0"
///
/// [rate_limit]
/// per_minute = 5
/// per_session = 20
/// ```
#[derive(Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
	pub base_url: Option<String>,
	pub api_key: Option<String>,
	pub app_version: Option<String>,
	pub report_path: String,
	pub session_path: String,
	pub request_timeout_secs: u64,
	pub rate_limit: RateLimitConfig,
	pub retry: RetryConfig,
	/// Namespaces skipped when fingerprinting.
	pub framework_prefixes: Vec<String>,
}

impl Default for TelemetryConfig {
	fn default() -> Self {
		Self {
			base_url: None,
			api_key: None,
			app_version: None,
			report_path: DEFAULT_REPORT_PATH.to_string(),
			session_path: DEFAULT_SESSION_PATH.to_string(),
			request_timeout_secs: 30,
			rate_limit: RateLimitConfig::default(),
			retry: RetryConfig::default(),
			framework_prefixes: DEFAULT_FRAMEWORK_PREFIXES
				.iter()
				.map(|p| p.to_string())
				.collect(),
		}
	}
}

impl fmt::Debug for TelemetryConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TelemetryConfig")
			.field("base_url", &self.base_url)
			.field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
			.field("app_version", &self.app_version)
			.field("report_path", &self.report_path)
			.field("session_path", &self.session_path)
			.field("request_timeout_secs", &self.request_timeout_secs)
			.field("rate_limit", &self.rate_limit)
			.field("retry", &self.retry)
			.field("framework_prefixes", &self.framework_prefixes)
			.finish()
	}
}

impl TelemetryConfig {
	/// Parses a TOML document. Missing fields take their defaults.
	pub fn from_toml_str(source: &str) -> Result<Self> {
		Ok(toml::from_str(source)?)
	}

	/// Applies `LOOM_TELEMETRY_*` variables from the process environment.
	pub fn with_env_overrides(self) -> Self {
		self.with_overrides_from(|name| std::env::var(name).ok())
	}

	/// Applies overrides from an arbitrary variable lookup. Empty values are
	/// ignored.
	pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

		if let Some(url) = var(ENV_BASE_URL) {
			self.base_url = Some(url);
		}
		if let Some(key) = var(ENV_API_KEY) {
			self.api_key = Some(key);
		}
		if let Some(version) = var(ENV_APP_VERSION) {
			self.app_version = Some(version);
		}
		self
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}
}
