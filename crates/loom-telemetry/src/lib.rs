// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Crash and error telemetry SDK for Rust applications.
//!
//! The reporter captures panics and logged errors, enriches them with
//! breadcrumbs, custom keys and device metadata, groups them by a stack-trace
//! fingerprint, throttles them, and sends them to the Loom crash collector in
//! the background. Nothing on the capture path blocks or panics.
//!
//! # Quick Start
//!
//! ```ignore
//! use loom_telemetry::{CrashReporter, TelemetryConfig};
//! use tracing_subscriber::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TelemetryConfig::from_toml_str(&std::fs::read_to_string("telemetry.toml")?)?
//!         .with_env_overrides();
//!
//!     let reporter = CrashReporter::builder_from_config(config)
//!         .app_version(env!("CARGO_PKG_VERSION"))
//!         .build()?;
//!
//!     // Logged errors are reported through this layer while capturing.
//!     tracing_subscriber::registry()
//!         .with(tracing_subscriber::fmt::layer())
//!         .with(reporter.error_layer())
//!         .init();
//!
//!     reporter.start_capture()?;
//!     reporter.add_breadcrumb("scene", "Loaded main menu");
//!     reporter.set_custom_key("build", "nightly")?;
//!
//!     // ...
//!
//!     reporter.stop_capture();
//!     Ok(())
//! }
//! ```
//!
//! # Collector protocol
//!
//! Reports are POSTed as JSON to `{base_url}/api/crash/reports` with an
//! `X-API-Key` header, and each capture session is registered at
//! `{base_url}/api/crash/sessions`. Report submission is attempted exactly
//! once; session registration retries transient failures.

mod auth;
mod config;
mod device;
mod error;
mod events;
pub mod hooks;
mod reporter;
mod retry;
mod transport;

pub use auth::{AuthProvider, StaticAuth};
pub use config::{
	TelemetryConfig, DEFAULT_REPORT_PATH, DEFAULT_SESSION_PATH, ENV_API_KEY, ENV_APP_VERSION,
	ENV_BASE_URL,
};
pub use device::{detect as detect_device, platform, SDK_VERSION};
pub use error::{Result, TelemetryError};
pub use events::{BroadcastPublisher, EventPublisher, NoopPublisher, TelemetryEvent};
pub use hooks::{ErrorCaptureLayer, PanicHook, TracingErrorHook};
pub use reporter::{CrashReporter, CrashReporterBuilder, CAPTURE_NOT_STARTED};
pub use retry::{RetryConfig, RetryableError};
pub use transport::{HttpTransport, SessionRegistration, SubmitResponse, Transport};

// Re-export core types for convenience
pub use loom_telemetry_core::{
	Admission, Breadcrumb, CrashReport, DeviceInfo, Fingerprinter, RateLimitConfig, ReportKind,
	TelemetryCoreError,
};
