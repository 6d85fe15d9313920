// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Dual-level admission control for outgoing crash reports.
//!
//! A continuously refilling token bucket bounds the per-minute rate, and a
//! hard counter bounds the total number of reports per capture session.
//! Rejected reports are dropped, never queued.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Limits applied by a [`RateLimiter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
	/// Bucket size: reports admitted in a burst.
	pub per_minute: u32,
	/// Time for an empty bucket to refill completely.
	pub refill_window_secs: u64,
	/// Reports admitted per capture session.
	pub per_session: u32,
}

impl Default for RateLimitConfig {
	fn default() -> Self {
		Self {
			per_minute: 5,
			refill_window_secs: 60,
			per_session: 20,
		}
	}
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
	Admitted,
	/// The token bucket is empty.
	MinuteLimitExceeded,
	/// The session cap has been reached.
	SessionLimitExceeded,
}

impl Admission {
	pub fn is_admitted(self) -> bool {
		matches!(self, Self::Admitted)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Admitted => "admitted",
			Self::MinuteLimitExceeded => "per-minute limit exceeded",
			Self::SessionLimitExceeded => "per-session limit exceeded",
		}
	}
}

impl fmt::Display for Admission {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Token bucket plus per-session cap.
#[derive(Debug, Clone)]
pub struct RateLimiter {
	config: RateLimitConfig,
	tokens: f64,
	last_refill: Instant,
	session_count: u32,
}

impl Default for RateLimiter {
	fn default() -> Self {
		Self::new(RateLimitConfig::default())
	}
}

impl RateLimiter {
	/// Creates a limiter with a full bucket and an empty session count.
	pub fn new(config: RateLimitConfig) -> Self {
		let tokens = f64::from(config.per_minute);
		Self {
			config,
			tokens,
			last_refill: Instant::now(),
			session_count: 0,
		}
	}

	pub fn try_admit(&mut self) -> Admission {
		self.try_admit_at(Instant::now())
	}

	/// Admission check against an explicit clock reading.
	pub fn try_admit_at(&mut self, now: Instant) -> Admission {
		self.refill(now);

		if self.tokens < 1.0 {
			return Admission::MinuteLimitExceeded;
		}
		if self.session_count >= self.config.per_session {
			return Admission::SessionLimitExceeded;
		}

		self.tokens -= 1.0;
		self.session_count += 1;
		Admission::Admitted
	}

	/// Starts a new session: full bucket, zero reports.
	pub fn reset(&mut self) {
		self.reset_at(Instant::now());
	}

	pub fn reset_at(&mut self, now: Instant) {
		self.tokens = self.capacity();
		self.last_refill = now;
		self.session_count = 0;
	}

	pub fn tokens(&self) -> f64 {
		self.tokens
	}

	pub fn session_count(&self) -> u32 {
		self.session_count
	}

	pub fn config(&self) -> &RateLimitConfig {
		&self.config
	}

	fn capacity(&self) -> f64 {
		f64::from(self.config.per_minute)
	}

	fn refill(&mut self, now: Instant) {
		let capacity = self.capacity();
		let elapsed = now.saturating_duration_since(self.last_refill);
		let window = Duration::from_secs(self.config.refill_window_secs);

		self.tokens = if window.is_zero() {
			capacity
		} else {
			(self.tokens + elapsed.as_secs_f64() * capacity / window.as_secs_f64()).min(capacity)
		};
		self.last_refill = now;
	}
}
