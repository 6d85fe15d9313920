// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Device and build metadata attached to every report.

/// Metadata captured once when the reporter starts; not re-queried per report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
	pub app_version: String,
	pub sdk_version: String,
	/// e.g. "linux-x86_64", "windows-aarch64"
	pub platform: String,
	pub os: String,
	pub device_model: String,
	pub device_memory_mb: u64,
}
