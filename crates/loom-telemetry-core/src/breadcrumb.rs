// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Breadcrumbs (events leading up to a failure) and the fixed-size ring that
//! keeps the most recent ones.

use chrono::{DateTime, SecondsFormat, Utc};

/// Number of breadcrumbs retained by a [`BreadcrumbRing`].
pub const BREADCRUMB_CAPACITY: usize = 50;

/// Category used when a breadcrumb is recorded without one.
pub const DEFAULT_BREADCRUMB_CATEGORY: &str = "custom";

/// A timestamped note describing something that happened before a failure.
///
/// Sent on the wire as `{"timestamp", "type", "message"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breadcrumb {
	pub timestamp: DateTime<Utc>,
	/// Free-form category: "scene", "network", "ui", "custom".
	pub category: String,
	pub message: String,
}

impl Breadcrumb {
	/// Creates a breadcrumb stamped with the current time.
	pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
		Self::with_timestamp(Utc::now(), category, message)
	}

	/// Creates a breadcrumb with an explicit timestamp.
	pub fn with_timestamp(
		timestamp: DateTime<Utc>,
		category: impl Into<String>,
		message: impl Into<String>,
	) -> Self {
		let category = category.into();
		Self {
			timestamp,
			category: if category.is_empty() {
				DEFAULT_BREADCRUMB_CATEGORY.to_string()
			} else {
				category
			},
			message: message.into(),
		}
	}

	/// RFC 3339 timestamp with a `Z` suffix and full sub-second precision.
	pub fn timestamp_rfc3339(&self) -> String {
		self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
	}
}

/// Fixed-capacity circular log of the most recent breadcrumbs.
///
/// `head` is the next slot to write and `count` the number of live entries.
/// Once full, each push overwrites the oldest entry.
#[derive(Debug, Clone)]
pub struct BreadcrumbRing {
	slots: [Option<Breadcrumb>; BREADCRUMB_CAPACITY],
	head: usize,
	count: usize,
}

impl Default for BreadcrumbRing {
	fn default() -> Self {
		Self::new()
	}
}

impl BreadcrumbRing {
	pub fn new() -> Self {
		Self {
			slots: std::array::from_fn(|_| None),
			head: 0,
			count: 0,
		}
	}

	/// Records a breadcrumb. Empty messages are ignored.
	///
	/// Returns `true` if the breadcrumb was recorded.
	pub fn push(&mut self, category: &str, message: &str) -> bool {
		if message.is_empty() {
			return false;
		}
		self.push_breadcrumb(Breadcrumb::new(category, message))
	}

	/// Records a prebuilt breadcrumb. Empty messages are ignored.
	pub fn push_breadcrumb(&mut self, breadcrumb: Breadcrumb) -> bool {
		if breadcrumb.message.is_empty() {
			return false;
		}

		self.slots[self.head] = Some(breadcrumb);
		self.head = (self.head + 1) % BREADCRUMB_CAPACITY;
		if self.count < BREADCRUMB_CAPACITY {
			self.count += 1;
		}
		true
	}

	/// Returns a copy of the live breadcrumbs, oldest first.
	pub fn snapshot(&self) -> Vec<Breadcrumb> {
		let start = (self.head + BREADCRUMB_CAPACITY - self.count) % BREADCRUMB_CAPACITY;
		(0..self.count)
			.filter_map(|offset| self.slots[(start + offset) % BREADCRUMB_CAPACITY].clone())
			.collect()
	}

	pub fn len(&self) -> usize {
		self.count
	}

	pub fn is_empty(&self) -> bool {
		self.count == 0
	}

	pub fn capacity(&self) -> usize {
		BREADCRUMB_CAPACITY
	}
}
