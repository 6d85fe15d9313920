// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Exponential backoff with jitter for session registration.
//!
//! Report submission never goes through here: a report is sent once.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Backoff policy for the retrying request path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
	pub max_attempts: u32,
	pub base_delay_ms: u64,
	pub max_delay_ms: u64,
	pub backoff_factor: f64,
	pub jitter: bool,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay_ms: 200,
			max_delay_ms: 5_000,
			backoff_factor: 2.0,
			jitter: true,
		}
	}
}

impl RetryConfig {
	pub fn base_delay(&self) -> Duration {
		Duration::from_millis(self.base_delay_ms)
	}

	pub fn max_delay(&self) -> Duration {
		Duration::from_millis(self.max_delay_ms)
	}
}

/// Classifies errors as transient (worth retrying) or final.
pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

const RETRYABLE_STATUSES: [StatusCode; 6] = [
	StatusCode::TOO_MANY_REQUESTS,
	StatusCode::REQUEST_TIMEOUT,
	StatusCode::INTERNAL_SERVER_ERROR,
	StatusCode::BAD_GATEWAY,
	StatusCode::SERVICE_UNAVAILABLE,
	StatusCode::GATEWAY_TIMEOUT,
];

impl RetryableError for reqwest::Error {
	fn is_retryable(&self) -> bool {
		if self.is_timeout() || self.is_connect() {
			return true;
		}
		self
			.status()
			.is_some_and(|status| RETRYABLE_STATUSES.contains(&status))
	}
}

pub(crate) fn calculate_delay(cfg: &RetryConfig, attempt: u32) -> Duration {
	let exponential = cfg.base_delay().as_secs_f64() * cfg.backoff_factor.powi(attempt as i32);
	let capped = exponential.min(cfg.max_delay().as_secs_f64());

	let delay = if cfg.jitter {
		capped * (0.5 + fastrand::f64())
	} else {
		capped
	};

	Duration::from_secs_f64(delay.max(0.0))
}

/// Runs `f` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` is reached.
pub async fn retry<F, Fut, T, E>(cfg: &RetryConfig, mut f: F) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: std::future::Future<Output = Result<T, E>>,
	E: RetryableError + std::fmt::Display,
{
	let mut attempt = 0;

	loop {
		match f().await {
			Ok(value) => return Ok(value),
			Err(err) => {
				attempt += 1;

				if !err.is_retryable() {
					return Err(err);
				}

				if attempt >= cfg.max_attempts {
					warn!(
						error = %err,
						attempt,
						max_attempts = cfg.max_attempts,
						"Retry attempts exhausted"
					);
					return Err(err);
				}

				let delay = calculate_delay(cfg, attempt - 1);
				warn!(
					error = %err,
					attempt,
					delay_ms = delay.as_millis() as u64,
					"Retrying after transient error"
				);
				tokio::time::sleep(delay).await;
			}
		}
	}
}
