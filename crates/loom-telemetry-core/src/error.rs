// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for crash telemetry core.

use thiserror::Error;

/// Errors raised by the core telemetry types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryCoreError {
	#[error("custom key limit reached ({max} keys)")]
	CustomKeyLimit { max: usize },

	#[error("custom key must not be empty")]
	EmptyCustomKey,

	#[error("invalid report kind: {0}")]
	InvalidReportKind(String),
}

/// Result type for core telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryCoreError>;
