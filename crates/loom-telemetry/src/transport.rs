// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP exchange with the crash collector.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::AuthProvider;
use crate::device::SDK_VERSION;
use crate::error::{Result, TelemetryError};
use crate::retry::{retry, RetryConfig};

/// Header carrying the project API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Collector acknowledgement for a submitted report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubmitResponse {
	pub id: String,
	pub group_id: Option<String>,
}

/// Body of a session registration ping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRegistration {
	pub session_id: String,
	pub app_version: String,
	pub platform: String,
	pub user_id: String,
}

/// Moves reports and session pings to the collector.
///
/// Implementations attach credentials; callers supply only the path and body.
#[async_trait]
pub trait Transport: Send + Sync {
	/// Sends one serialized report. Never retried.
	async fn submit_report(&self, path: &str, body: String) -> Result<SubmitResponse>;

	/// Registers a capture session, retrying transient failures.
	async fn register_session(&self, path: &str, registration: &SessionRegistration) -> Result<()>;
}

/// [`Transport`] over `reqwest`.
#[derive(Clone)]
pub struct HttpTransport {
	client: Client,
	base_url: String,
	api_key: String,
	retry: RetryConfig,
	auth: Option<Arc<dyn AuthProvider>>,
}

impl fmt::Debug for HttpTransport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("HttpTransport")
			.field("base_url", &self.base_url)
			.field("retry", &self.retry)
			.field("has_auth", &self.auth.is_some())
			.finish_non_exhaustive()
	}
}

impl HttpTransport {
	/// Creates a transport for `base_url` (no trailing slash).
	pub fn new(
		base_url: impl Into<String>,
		api_key: impl Into<String>,
		timeout: Duration,
		retry: RetryConfig,
	) -> Result<Self> {
		let client = Client::builder()
			.user_agent(format!("loom-telemetry/{SDK_VERSION}"))
			.timeout(timeout)
			.build()?;

		Ok(Self {
			client,
			base_url: base_url.into().trim_end_matches('/').to_string(),
			api_key: api_key.into(),
			retry,
			auth: None,
		})
	}

	/// Attaches `Authorization: Bearer` from `auth` when it has a token.
	pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
		self.auth = Some(auth);
		self
	}

	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	fn post(&self, path: &str) -> RequestBuilder {
		let mut request = self
			.client
			.post(format!("{}{}", self.base_url, path))
			.header(API_KEY_HEADER, &self.api_key)
			.header(CONTENT_TYPE, "application/json");

		if let Some(token) = self.auth.as_ref().and_then(|auth| auth.access_token()) {
			request = request.header(AUTHORIZATION, format!("Bearer {token}"));
		}
		request
	}
}

#[async_trait]
impl Transport for HttpTransport {
	async fn submit_report(&self, path: &str, body: String) -> Result<SubmitResponse> {
		debug!(path, bytes = body.len(), "Submitting crash report");

		let response = self.post(path).body(body).send().await?;
		let response = check_status(response).await?;
		let text = response.text().await?;

		if text.trim().is_empty() {
			return Ok(SubmitResponse::default());
		}
		Ok(serde_json::from_str(&text)?)
	}

	async fn register_session(&self, path: &str, registration: &SessionRegistration) -> Result<()> {
		let this = self;
		retry(&self.retry, || async move {
			let response = this.post(path).json(registration).send().await?;
			check_status(response).await?;
			Ok::<_, TelemetryError>(())
		})
		.await
	}
}

/// Maps non-2xx responses to their [`TelemetryError`].
async fn check_status(response: Response) -> Result<Response> {
	let status = response.status();
	if status.is_success() {
		return Ok(response);
	}

	match status {
		StatusCode::FORBIDDEN => Err(TelemetryError::FeatureUnavailable),
		StatusCode::TOO_MANY_REQUESTS => {
			let retry_after_secs = response
				.headers()
				.get(RETRY_AFTER)
				.and_then(|v| v.to_str().ok())
				.and_then(|s| s.trim().parse().ok());
			Err(TelemetryError::ServerRateLimited { retry_after_secs })
		}
		_ => {
			let message = response.text().await.unwrap_or_default();
			Err(TelemetryError::ServerError {
				status: status.as_u16(),
				message,
			})
		}
	}
}
