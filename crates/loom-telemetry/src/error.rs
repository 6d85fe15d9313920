// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the telemetry SDK.

use loom_telemetry_core::TelemetryCoreError;
use thiserror::Error;

use crate::retry::RetryableError;

/// Result type alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors that can occur in the telemetry SDK.
#[derive(Debug, Error)]
pub enum TelemetryError {
	/// API key is missing or empty.
	#[error("invalid API key")]
	InvalidApiKey,

	/// Base URL is missing or not an http(s) URL.
	#[error("invalid base URL")]
	InvalidBaseUrl,

	/// Capture was started outside a tokio runtime.
	#[error("crash capture requires a tokio runtime")]
	NoRuntime,

	/// Configuration file could not be parsed.
	#[error("config parse error: {0}")]
	Config(#[from] toml::de::Error),

	/// HTTP request failed before a response arrived, or the body was unreadable.
	#[error("HTTP request failed: {0}")]
	RequestFailed(#[from] reqwest::Error),

	/// The collector refused the request for this account (HTTP 403).
	#[error("feature unavailable for current account tier")]
	FeatureUnavailable,

	/// The collector is throttling this client (HTTP 429).
	#[error("server-side rate limit, retry after {retry_after_secs:?} seconds")]
	ServerRateLimited {
		/// Value of the `Retry-After` header, when present.
		retry_after_secs: Option<u64>,
	},

	/// Any other non-2xx response.
	#[error("server error (status {status}): {message}")]
	ServerError {
		/// HTTP status code.
		status: u16,
		/// Response body.
		message: String,
	},

	/// Failed to encode or decode a JSON body.
	#[error("serialization error: {0}")]
	SerializationError(#[from] serde_json::Error),

	#[error(transparent)]
	Core(#[from] TelemetryCoreError),

	/// A capture hook could not be installed.
	#[error("failed to install capture hook: {0}")]
	HookInstall(String),
}

impl TelemetryError {
	/// Short human-readable reason carried by `ReportFailed` events.
	pub fn failure_reason(&self) -> String {
		match self {
			Self::FeatureUnavailable => "feature unavailable for current account tier".to_string(),
			Self::ServerRateLimited { .. } => "server-side rate limit".to_string(),
			Self::ServerError { status, .. } => format!("server error (status {status})"),
			other => other.to_string(),
		}
	}
}

impl RetryableError for TelemetryError {
	fn is_retryable(&self) -> bool {
		match self {
			Self::RequestFailed(e) => e.is_retryable(),
			Self::ServerError { status, .. } => {
				matches!(*status, 408 | 500 | 502 | 503 | 504)
			}
			Self::ServerRateLimited { .. } => true,
			_ => false,
		}
	}
}
