// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Example: capture errors with the loom-telemetry SDK.
//!
//! Run with:
//!   LOOM_TELEMETRY_API_KEY=lt_xxx cargo run --example capture -p loom-telemetry

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use loom_telemetry::{BroadcastPublisher, CrashReporter, TelemetryConfig, TelemetryEvent};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let mut config = TelemetryConfig::default().with_env_overrides();
	if config.base_url.is_none() {
		config.base_url = Some("https://loom.ghuntley.com".to_string());
	}

	let events = BroadcastPublisher::default();
	let mut rx = events.subscribe();

	let reporter = CrashReporter::builder_from_config(config)
		.app_version("0.1.0-example")
		.event_publisher(Arc::new(events))
		.build()?;

	tracing_subscriber::registry()
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with(tracing_subscriber::fmt::layer())
		.with(reporter.error_layer())
		.init();

	println!("Device: {:?}", reporter.device_info());

	reporter.start_capture()?;
	reporter.add_breadcrumb("startup", "Application started");
	reporter.add_breadcrumb("network", "GET /api/data failed");
	reporter.set_custom_key("example", "true")?;
	reporter.set_user_id(Some("user_example_123".to_string()));

	// Reported as NON_FATAL through the tracing layer.
	tracing::error!(target: "example", error = "connection reset", "Failed to sync save");

	let extra = BTreeMap::from([("attempt".to_string(), "3".to_string())]);
	reporter.record_error(
		"Example error from loom-telemetry",
		"example::sync::upload (at src/sync.rs:42)\nexample::main (at src/main.rs:10)",
		Some(&extra),
	);

	let deadline = tokio::time::sleep(Duration::from_secs(10));
	tokio::pin!(deadline);
	let mut outcomes = 0;
	while outcomes < 2 {
		tokio::select! {
			_ = &mut deadline => break,
			event = rx.recv() => match event {
				Ok(TelemetryEvent::ReportSubmitted { kind, report_id, group_id }) => {
					println!("Submitted {kind}: id={report_id} group={group_id}");
					outcomes += 1;
				}
				Ok(TelemetryEvent::ReportFailed { kind, reason }) => {
					println!("Failed {kind}: {reason}");
					outcomes += 1;
				}
				Ok(other) => println!("Event: {other:?}"),
				Err(_) => break,
			},
		}
	}

	reporter.stop_capture();
	println!("Capture stopped.");

	Ok(())
}
