// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Notifications published by the reporter.

use loom_telemetry_core::ReportKind;
use tokio::sync::broadcast;

/// Outcome notifications. The reporter only publishes; it never subscribes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryEvent {
	ReportSubmitted {
		kind: ReportKind,
		report_id: String,
		group_id: String,
	},
	ReportFailed {
		kind: ReportKind,
		reason: String,
	},
	SessionRegistered {
		session_id: String,
	},
	BreadcrumbRecorded {
		message: String,
	},
}

/// Sink for [`TelemetryEvent`]s. Must not block.
pub trait EventPublisher: Send + Sync {
	fn publish(&self, event: TelemetryEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
	fn publish(&self, _event: TelemetryEvent) {}
}

/// Fans events out to any number of [`broadcast::Receiver`]s.
///
/// Publishing with no subscribers is not an error; slow subscribers lag and
/// lose the oldest events.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
	sender: broadcast::Sender<TelemetryEvent>,
}

impl BroadcastPublisher {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
		self.sender.subscribe()
	}
}

impl Default for BroadcastPublisher {
	fn default() -> Self {
		Self::new(256)
	}
}

impl EventPublisher for BroadcastPublisher {
	fn publish(&self, event: TelemetryEvent) {
		let _ = self.sender.send(event);
	}
}
