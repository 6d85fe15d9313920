// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Host detection for [`DeviceInfo`].

use loom_telemetry_core::DeviceInfo;
use sysinfo::System;

/// Version of this SDK, sent as `sdkVersion`.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

const UNKNOWN: &str = "unknown";

/// Detects device metadata for the current host.
///
/// Queries the OS once; callers cache the result.
pub fn detect(app_version: &str) -> DeviceInfo {
	let mut system = System::new();
	system.refresh_memory();

	DeviceInfo {
		app_version: app_version.to_string(),
		sdk_version: SDK_VERSION.to_string(),
		platform: platform(),
		os: System::long_os_version().unwrap_or_else(|| std::env::consts::OS.to_string()),
		device_model: hostname::get()
			.ok()
			.and_then(|name| name.into_string().ok())
			.filter(|name| !name.is_empty())
			.unwrap_or_else(|| UNKNOWN.to_string()),
		device_memory_mb: system.total_memory() / (1024 * 1024),
	}
}

/// `<os>-<arch>`, e.g. `linux-x86_64`.
pub fn platform() -> String {
	format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}
