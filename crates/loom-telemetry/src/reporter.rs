// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Crash reporter: capture lifecycle and the report pipeline.

use std::backtrace::Backtrace;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use loom_telemetry_core::{
	BreadcrumbRing, CustomKeyStore, DeviceInfo, Fingerprinter, RateLimitConfig, RateLimiter,
	ReportBuilder, ReportContext, ReportKind,
};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::AuthProvider;
use crate::config::TelemetryConfig;
use crate::device;
use crate::error::{Result, TelemetryError};
use crate::events::{EventPublisher, NoopPublisher, TelemetryEvent};
use crate::hooks::{
	CapturedFailure, ErrorCaptureLayer, FailureHook, FailureSink, PanicHook, TracingErrorHook,
};
use crate::retry::RetryConfig;
use crate::transport::{HttpTransport, SessionRegistration, Transport};

/// Reason attached to reports recorded while capture is stopped.
pub const CAPTURE_NOT_STARTED: &str = "capture not started";

const REPORT_BUILD_FAILED: &str = "report build failed";
const PIPELINE_FAILED: &str = "capture pipeline failed";
const UNKNOWN_APP_VERSION: &str = "unknown";

/// Builder for constructing a [`CrashReporter`].
pub struct CrashReporterBuilder {
	config: TelemetryConfig,
	device: Option<DeviceInfo>,
	transport: Option<Arc<dyn Transport>>,
	publisher: Option<Arc<dyn EventPublisher>>,
	auth: Option<Arc<dyn AuthProvider>>,
	hooks: Option<Vec<Arc<dyn FailureHook>>>,
}

impl CrashReporterBuilder {
	pub fn new() -> Self {
		Self::from_config(TelemetryConfig::default())
	}

	/// Starts from a loaded configuration; builder calls override it.
	pub fn from_config(config: TelemetryConfig) -> Self {
		Self {
			config,
			device: None,
			transport: None,
			publisher: None,
			auth: None,
			hooks: None,
		}
	}

	/// Sets the collector base URL.
	///
	/// Example: `https://loom.ghuntley.com`
	pub fn base_url(mut self, url: impl Into<String>) -> Self {
		self.config.base_url = Some(url.into());
		self
	}

	/// Sets the project API key sent as `X-API-Key`.
	pub fn api_key(mut self, key: impl Into<String>) -> Self {
		self.config.api_key = Some(key.into());
		self
	}

	pub fn app_version(mut self, version: impl Into<String>) -> Self {
		self.config.app_version = Some(version.into());
		self
	}

	pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
		self.config.rate_limit = rate_limit;
		self
	}

	/// Backoff policy for session registration.
	pub fn retry_config(mut self, retry: RetryConfig) -> Self {
		self.config.retry = retry;
		self
	}

	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.config.request_timeout_secs = timeout.as_secs();
		self
	}

	/// Replaces the namespaces skipped when fingerprinting.
	pub fn framework_prefixes<I, S>(mut self, prefixes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.config.framework_prefixes = prefixes.into_iter().map(Into::into).collect();
		self
	}

	/// Uses fixed device metadata instead of detecting it.
	pub fn device_info(mut self, device: DeviceInfo) -> Self {
		self.device = Some(device);
		self
	}

	/// Replaces the default [`HttpTransport`].
	pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);
		self
	}

	pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
		self.publisher = Some(publisher);
		self
	}

	/// Supplies the user id and access token.
	pub fn auth_provider(mut self, auth: Arc<dyn AuthProvider>) -> Self {
		self.auth = Some(auth);
		self
	}

	/// Adds a capture hook. Once any hook is added, the default panic and
	/// tracing hooks are not installed.
	pub fn hook(mut self, hook: Arc<dyn FailureHook>) -> Self {
		self.hooks.get_or_insert_with(Vec::new).push(hook);
		self
	}

	/// Builds the reporter. Capture does not begin until
	/// [`CrashReporter::start_capture`].
	pub fn build(self) -> Result<CrashReporter> {
		let api_key = self
			.config
			.api_key
			.clone()
			.filter(|key| !key.trim().is_empty())
			.ok_or(TelemetryError::InvalidApiKey)?;
		let base_url = self
			.config
			.base_url
			.as_deref()
			.map(|url| url.trim().trim_end_matches('/').to_string())
			.filter(|url| url.starts_with("http://") || url.starts_with("https://"))
			.ok_or(TelemetryError::InvalidBaseUrl)?;

		let transport: Arc<dyn Transport> = match self.transport {
			Some(transport) => transport,
			None => {
				let mut http = HttpTransport::new(
					base_url.clone(),
					api_key,
					self.config.request_timeout(),
					self.config.retry.clone(),
				)?;
				if let Some(auth) = &self.auth {
					http = http.with_auth(Arc::clone(auth));
				}
				Arc::new(http)
			}
		};

		let (hooks, error_hook) = match self.hooks {
			Some(hooks) => (hooks, None),
			None => {
				let error_hook = TracingErrorHook::new();
				let panic_hook: Arc<dyn FailureHook> = Arc::new(PanicHook::new());
				let tracing_hook: Arc<dyn FailureHook> = Arc::new(error_hook.clone());
				(vec![panic_hook, tracing_hook], Some(error_hook))
			}
		};

		let device = self.device.unwrap_or_else(|| {
			device::detect(
				self
					.config
					.app_version
					.as_deref()
					.unwrap_or(UNKNOWN_APP_VERSION),
			)
		});

		let fingerprinter = Fingerprinter::new(self.config.framework_prefixes.iter().cloned());

		let inner = Arc::new(ReporterInner {
			report_path: self.config.report_path.clone(),
			session_path: self.config.session_path.clone(),
			device,
			builder: ReportBuilder::new(fingerprinter),
			transport,
			publisher: self
				.publisher
				.unwrap_or_else(|| Arc::new(NoopPublisher) as Arc<dyn EventPublisher>),
			auth: self.auth,
			hooks,
			error_hook,
			state: Mutex::new(CaptureState::Idle),
			breadcrumbs: Mutex::new(BreadcrumbRing::new()),
			limiter: Mutex::new(RateLimiter::new(self.config.rate_limit.clone())),
			custom_keys: Mutex::new(CustomKeyStore::new()),
			user_id: Mutex::new(None),
		});

		info!(base_url = %base_url, "Crash reporter initialized");

		Ok(CrashReporter { inner })
	}
}

impl Default for CrashReporterBuilder {
	fn default() -> Self {
		Self::new()
	}
}

#[derive(Debug, Clone)]
struct ActiveSession {
	session_id: String,
	runtime: Handle,
}

#[derive(Debug)]
enum CaptureState {
	Idle,
	Capturing(ActiveSession),
}

/// Shared reporter state.
///
/// Each component sits behind its own mutex, held only for the component
/// operation itself. Host callbacks, logging and event publishing happen with
/// no lock held.
struct ReporterInner {
	report_path: String,
	session_path: String,
	device: DeviceInfo,
	builder: ReportBuilder,
	transport: Arc<dyn Transport>,
	publisher: Arc<dyn EventPublisher>,
	auth: Option<Arc<dyn AuthProvider>>,
	hooks: Vec<Arc<dyn FailureHook>>,
	error_hook: Option<TracingErrorHook>,
	state: Mutex<CaptureState>,
	breadcrumbs: Mutex<BreadcrumbRing>,
	limiter: Mutex<RateLimiter>,
	custom_keys: Mutex<CustomKeyStore>,
	user_id: Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

thread_local! {
	static IN_PIPELINE: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as running the report pipeline. Failures raised
/// while it is held (a panic inside the pipeline reaching the panic hook) are
/// not reported again.
struct PipelineGuard;

impl PipelineGuard {
	fn enter() -> Option<Self> {
		if IN_PIPELINE.with(|flag| flag.replace(true)) {
			None
		} else {
			Some(Self)
		}
	}
}

impl Drop for PipelineGuard {
	fn drop(&mut self) {
		IN_PIPELINE.with(|flag| flag.set(false));
	}
}

impl ReporterInner {
	fn active_session(&self) -> Option<ActiveSession> {
		match &*lock(&self.state) {
			CaptureState::Capturing(session) => Some(session.clone()),
			CaptureState::Idle => None,
		}
	}

	/// Explicit override, else the auth provider, else empty.
	fn resolve_user_id(&self) -> String {
		let explicit = lock(&self.user_id).clone();
		if let Some(user_id) = explicit {
			return user_id;
		}
		let Some(auth) = &self.auth else {
			return String::new();
		};
		let _guard = PipelineGuard::enter();
		match panic::catch_unwind(AssertUnwindSafe(|| auth.user_id())) {
			Ok(user_id) => user_id.unwrap_or_default(),
			Err(_) => {
				warn!("Auth provider panicked while resolving user id");
				String::new()
			}
		}
	}

	/// Hands an event to the host's publisher. A panicking publisher is
	/// logged and otherwise ignored.
	fn publish(&self, event: TelemetryEvent) {
		let _guard = PipelineGuard::enter();
		if panic::catch_unwind(AssertUnwindSafe(|| self.publisher.publish(event))).is_err() {
			warn!("Event publisher panicked");
		}
	}

	fn reject(&self, kind: ReportKind, reason: String) {
		self.publish(TelemetryEvent::ReportFailed { kind, reason });
	}

	/// Admission, build and dispatch for one failure. Never blocks on I/O and
	/// never unwinds into the caller.
	fn handle_failure(
		self: &Arc<Self>,
		kind: ReportKind,
		message: &str,
		stack_trace: Option<String>,
		extra_keys: Option<&BTreeMap<String, String>>,
	) {
		let Some(_guard) = PipelineGuard::enter() else {
			return;
		};

		let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
			self.process_failure(kind, message, stack_trace, extra_keys)
		}));
		if outcome.is_err() {
			error!(kind = %kind, "Crash report pipeline panicked");
			self.reject(kind, PIPELINE_FAILED.to_string());
		}
	}

	fn process_failure(
		self: &Arc<Self>,
		kind: ReportKind,
		message: &str,
		stack_trace: Option<String>,
		extra_keys: Option<&BTreeMap<String, String>>,
	) {
		let Some(session) = self.active_session() else {
			warn!(kind = %kind, "Crash report dropped: capture not started");
			self.reject(kind, CAPTURE_NOT_STARTED.to_string());
			return;
		};

		let admission = lock(&self.limiter).try_admit();
		if !admission.is_admitted() {
			warn!(kind = %kind, reason = %admission, "Crash report dropped by rate limiter");
			self.reject(kind, admission.to_string());
			return;
		}

		let stack_trace = stack_trace.unwrap_or_else(|| Backtrace::force_capture().to_string());
		let user_id = self.resolve_user_id();

		let built = panic::catch_unwind(AssertUnwindSafe(|| {
			let breadcrumbs = lock(&self.breadcrumbs);
			let custom_keys = lock(&self.custom_keys);
			let context = ReportContext {
				device: &self.device,
				session_id: &session.session_id,
				user_id: &user_id,
				breadcrumbs: &breadcrumbs,
				custom_keys: &custom_keys,
			};
			let report = self
				.builder
				.build(kind, message, &stack_trace, extra_keys, &context);
			(report.fingerprint().to_string(), report.to_json())
		}));

		let (fingerprint, payload) = match built {
			Ok(built) => built,
			Err(_) => {
				error!(kind = %kind, "Failed to build crash report");
				self.reject(kind, REPORT_BUILD_FAILED.to_string());
				return;
			}
		};

		debug!(
			kind = %kind,
			fingerprint = %fingerprint,
			session_id = %session.session_id,
			"Dispatching crash report"
		);

		let inner = Arc::clone(self);
		session
			.runtime
			.spawn(async move { inner.submit(kind, payload).await });
	}

	async fn submit(&self, kind: ReportKind, payload: String) {
		match self.transport.submit_report(&self.report_path, payload).await {
			Ok(response) => {
				let group_id = response.group_id.unwrap_or_default();
				info!(
					kind = %kind,
					report_id = %response.id,
					group_id = %group_id,
					"Crash report submitted"
				);
				self.publish(TelemetryEvent::ReportSubmitted {
					kind,
					report_id: response.id,
					group_id,
				});
			}
			Err(e) => {
				warn!(kind = %kind, error = %e, "Failed to submit crash report");
				self.reject(kind, e.failure_reason());
			}
		}
	}

	async fn register_session(&self, registration: SessionRegistration) {
		match self
			.transport
			.register_session(&self.session_path, &registration)
			.await
		{
			Ok(()) => {
				info!(session_id = %registration.session_id, "Crash session registered");
				self.publish(TelemetryEvent::SessionRegistered {
					session_id: registration.session_id,
				});
			}
			Err(e) => {
				warn!(
					session_id = %registration.session_id,
					error = %e,
					"Failed to register crash session"
				);
			}
		}
	}

	fn uninstall_hooks(&self, hooks: &[Arc<dyn FailureHook>]) {
		for hook in hooks {
			hook.uninstall();
			debug!(hook = hook.name(), "Capture hook uninstalled");
		}
	}
}

/// Routes hook callbacks into the reporter without keeping it alive.
struct HookSink {
	inner: Weak<ReporterInner>,
}

impl FailureSink for HookSink {
	fn on_failure(&self, failure: CapturedFailure) {
		if let Some(inner) = self.inner.upgrade() {
			inner.handle_failure(
				failure.severity.report_kind(),
				&failure.message,
				failure.stack_trace,
				None,
			);
		}
	}
}

/// Captures host failures and reports them to the Loom crash collector.
///
/// # Example
///
/// ```ignore
/// use loom_telemetry::CrashReporter;
///
/// let reporter = CrashReporter::builder()
///     .base_url("https://loom.ghuntley.com")
///     .api_key("lt_live_xxx")
///     .app_version(env!("CARGO_PKG_VERSION"))
///     .build()?;
///
/// reporter.start_capture()?;
/// reporter.add_breadcrumb("scene", "Loaded main menu");
/// reporter.set_custom_key("build", "nightly")?;
///
/// if let Err(e) = load_save_file() {
///     reporter.record_exception(&e, None);
/// }
///
/// reporter.stop_capture();
/// ```
#[derive(Clone)]
pub struct CrashReporter {
	inner: Arc<ReporterInner>,
}

impl CrashReporter {
	pub fn builder() -> CrashReporterBuilder {
		CrashReporterBuilder::new()
	}

	pub fn builder_from_config(config: TelemetryConfig) -> CrashReporterBuilder {
		CrashReporterBuilder::from_config(config)
	}

	/// Starts a capture session: fresh session id, reset rate limits,
	/// installed hooks and a background session registration.
	///
	/// Must be called from within a tokio runtime; reports are dispatched on
	/// that runtime even when hooks fire on other threads. Calling it while
	/// already capturing does nothing.
	pub fn start_capture(&self) -> Result<()> {
		let runtime = Handle::try_current().map_err(|_| TelemetryError::NoRuntime)?;
		let session_id = Uuid::now_v7().to_string();

		let existing = {
			let mut state = lock(&self.inner.state);
			match &*state {
				CaptureState::Capturing(session) => Some(session.session_id.clone()),
				CaptureState::Idle => {
					*state = CaptureState::Capturing(ActiveSession {
						session_id: session_id.clone(),
						runtime: runtime.clone(),
					});
					None
				}
			}
		};
		if let Some(existing) = existing {
			warn!(session_id = %existing, "Crash capture already started");
			return Ok(());
		}

		lock(&self.inner.limiter).reset();

		let sink: Arc<dyn FailureSink> = Arc::new(HookSink {
			inner: Arc::downgrade(&self.inner),
		});
		for (installed, hook) in self.inner.hooks.iter().enumerate() {
			if let Err(e) = hook.install(Arc::clone(&sink)) {
				error!(hook = hook.name(), error = %e, "Failed to install capture hook");
				self.inner.uninstall_hooks(&self.inner.hooks[..installed]);
				*lock(&self.inner.state) = CaptureState::Idle;
				return Err(e);
			}
			debug!(hook = hook.name(), "Capture hook installed");
		}

		let registration = SessionRegistration {
			session_id: session_id.clone(),
			app_version: self.inner.device.app_version.clone(),
			platform: self.inner.device.platform.clone(),
			user_id: self.inner.resolve_user_id(),
		};
		let inner = Arc::clone(&self.inner);
		runtime.spawn(async move { inner.register_session(registration).await });

		info!(session_id = %session_id, "Crash capture started");
		Ok(())
	}

	/// Uninstalls the hooks and ends the session. Calling it while stopped
	/// does nothing.
	pub fn stop_capture(&self) {
		let previous = std::mem::replace(&mut *lock(&self.inner.state), CaptureState::Idle);
		let CaptureState::Capturing(session) = previous else {
			debug!("Crash capture already stopped");
			return;
		};

		self.inner.uninstall_hooks(&self.inner.hooks);
		info!(session_id = %session.session_id, "Crash capture stopped");
	}

	pub fn is_capturing(&self) -> bool {
		matches!(*lock(&self.inner.state), CaptureState::Capturing(_))
	}

	/// Id of the current capture session.
	pub fn session_id(&self) -> Option<String> {
		self.inner.active_session().map(|session| session.session_id)
	}

	/// Reports a handled error as `NON_FATAL`. The message includes the
	/// error's source chain; the stack trace is captured here.
	pub fn record_exception(
		&self,
		error: &(dyn std::error::Error + 'static),
		extra_keys: Option<&BTreeMap<String, String>>,
	) {
		let mut message = error.to_string();
		let mut source = error.source();
		while let Some(cause) = source {
			message.push_str(": ");
			message.push_str(&cause.to_string());
			source = cause.source();
		}

		self
			.inner
			.handle_failure(ReportKind::NonFatal, &message, None, extra_keys);
	}

	/// Reports an error with an explicit message and stack trace as
	/// `NON_FATAL`.
	pub fn record_error(
		&self,
		message: &str,
		stack_trace: &str,
		extra_keys: Option<&BTreeMap<String, String>>,
	) {
		self.inner.handle_failure(
			ReportKind::NonFatal,
			message,
			Some(stack_trace.to_string()),
			extra_keys,
		);
	}

	/// Records a breadcrumb. Empty messages are ignored; an empty category
	/// becomes `custom`.
	pub fn add_breadcrumb(&self, category: &str, message: &str) {
		let recorded = lock(&self.inner.breadcrumbs).push(category, message);
		if recorded {
			self.inner.publish(TelemetryEvent::BreadcrumbRecorded {
				message: message.to_string(),
			});
		}
	}

	/// Sets a key attached to every later report.
	pub fn set_custom_key(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
		let key = key.into();
		let result = lock(&self.inner.custom_keys).set(key.clone(), value);
		if let Err(e) = &result {
			warn!(key = %key, error = %e, "Custom key rejected");
		}
		result.map_err(TelemetryError::from)
	}

	/// Overrides the user id from the auth provider. `None` clears the
	/// override.
	pub fn set_user_id(&self, user_id: Option<String>) {
		*lock(&self.inner.user_id) = user_id;
	}

	pub fn device_info(&self) -> &DeviceInfo {
		&self.inner.device
	}

	/// Layer for the host's `tracing` subscriber when the default hooks are in
	/// use. Logged errors are reported only while capturing.
	pub fn error_layer(&self) -> Option<ErrorCaptureLayer> {
		self.inner.error_hook.as_ref().map(TracingErrorHook::layer)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::transport::SubmitResponse;
	use async_trait::async_trait;
	use serde_json::Value;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use tracing_subscriber::layer::SubscriberExt;

	#[derive(Default)]
	struct FakeTransport {
		reports: Mutex<Vec<String>>,
		sessions: Mutex<Vec<SessionRegistration>>,
		fail_status: Option<u16>,
	}

	impl FakeTransport {
		fn failing(status: u16) -> Self {
			Self {
				fail_status: Some(status),
				..Self::default()
			}
		}

		fn reports(&self) -> Vec<Value> {
			self
				.reports
				.lock()
				.unwrap()
				.iter()
				.map(|body| serde_json::from_str(body).unwrap())
				.collect()
		}
	}

	#[async_trait]
	impl Transport for FakeTransport {
		async fn submit_report(&self, _path: &str, body: String) -> Result<SubmitResponse> {
			let n = {
				let mut reports = self.reports.lock().unwrap();
				reports.push(body);
				reports.len()
			};
			match self.fail_status {
				Some(403) => Err(TelemetryError::FeatureUnavailable),
				Some(429) => Err(TelemetryError::ServerRateLimited {
					retry_after_secs: None,
				}),
				Some(status) => Err(TelemetryError::ServerError {
					status,
					message: String::new(),
				}),
				None => Ok(SubmitResponse {
					id: format!("rep_{n}"),
					group_id: Some("grp_1".to_string()),
				}),
			}
		}

		async fn register_session(
			&self,
			_path: &str,
			registration: &SessionRegistration,
		) -> Result<()> {
			self.sessions.lock().unwrap().push(registration.clone());
			Ok(())
		}
	}

	#[derive(Default)]
	struct FakeHook {
		installs: AtomicUsize,
		uninstalls: AtomicUsize,
		sink: Mutex<Option<Arc<dyn FailureSink>>>,
	}

	impl FakeHook {
		fn fire(&self, failure: CapturedFailure) {
			let sink = self.sink.lock().unwrap().clone();
			if let Some(sink) = sink {
				sink.on_failure(failure);
			}
		}
	}

	impl FailureHook for FakeHook {
		fn install(&self, sink: Arc<dyn FailureSink>) -> Result<()> {
			self.installs.fetch_add(1, Ordering::SeqCst);
			*self.sink.lock().unwrap() = Some(sink);
			Ok(())
		}

		fn uninstall(&self) {
			self.uninstalls.fetch_add(1, Ordering::SeqCst);
			self.sink.lock().unwrap().take();
		}

		fn name(&self) -> &'static str {
			"fake"
		}
	}

	struct BrokenHook;

	impl FailureHook for BrokenHook {
		fn install(&self, _sink: Arc<dyn FailureSink>) -> Result<()> {
			Err(TelemetryError::HookInstall("no hook slot".to_string()))
		}

		fn uninstall(&self) {}

		fn name(&self) -> &'static str {
			"broken"
		}
	}

	#[derive(Default)]
	struct RecordingPublisher {
		events: Mutex<Vec<TelemetryEvent>>,
	}

	impl RecordingPublisher {
		fn events(&self) -> Vec<TelemetryEvent> {
			self.events.lock().unwrap().clone()
		}

		fn failures(&self) -> Vec<String> {
			self
				.events()
				.into_iter()
				.filter_map(|event| match event {
					TelemetryEvent::ReportFailed { reason, .. } => Some(reason),
					_ => None,
				})
				.collect()
		}

		async fn wait_for(&self, predicate: impl Fn(&[TelemetryEvent]) -> bool) {
			for _ in 0..200 {
				if predicate(&self.events()) {
					return;
				}
				tokio::time::sleep(Duration::from_millis(5)).await;
			}
			panic!("timed out waiting for events: {:?}", self.events());
		}

		async fn wait_for_count(&self, count: usize, filter: fn(&TelemetryEvent) -> bool) {
			self
				.wait_for(|events| events.iter().filter(|e| filter(e)).count() >= count)
				.await;
		}
	}

	impl EventPublisher for RecordingPublisher {
		fn publish(&self, event: TelemetryEvent) {
			self.events.lock().unwrap().push(event);
		}
	}

	fn is_submitted(event: &TelemetryEvent) -> bool {
		matches!(event, TelemetryEvent::ReportSubmitted { .. })
	}

	fn is_failed(event: &TelemetryEvent) -> bool {
		matches!(event, TelemetryEvent::ReportFailed { .. })
	}

	fn test_device() -> DeviceInfo {
		DeviceInfo {
			app_version: "1.4.0".to_string(),
			sdk_version: device::SDK_VERSION.to_string(),
			platform: "linux-x86_64".to_string(),
			os: "Linux".to_string(),
			device_model: "ci-runner".to_string(),
			device_memory_mb: 8_192,
		}
	}

	struct Harness {
		reporter: CrashReporter,
		transport: Arc<FakeTransport>,
		hook: Arc<FakeHook>,
		publisher: Arc<RecordingPublisher>,
	}

	fn harness_with(transport: FakeTransport, builder: CrashReporterBuilder) -> Harness {
		let transport = Arc::new(transport);
		let hook = Arc::new(FakeHook::default());
		let publisher = Arc::new(RecordingPublisher::default());

		let reporter = builder
			.base_url("https://loom.example.com/")
			.api_key("lt_test")
			.device_info(test_device())
			.transport(transport.clone())
			.event_publisher(publisher.clone())
			.hook(hook.clone())
			.build()
			.unwrap();

		Harness {
			reporter,
			transport,
			hook,
			publisher,
		}
	}

	fn harness() -> Harness {
		harness_with(FakeTransport::default(), CrashReporter::builder())
	}

	const UNITY_TRACE: &str =
		"GameLogic.Update (at Assets/Game.cs:42)\nUnityEngine.MonoBehaviour.Invoke (...)";

	#[test]
	fn builder_requires_api_key() {
		let result = CrashReporter::builder()
			.base_url("https://example.com")
			.device_info(test_device())
			.build();
		assert!(matches!(result, Err(TelemetryError::InvalidApiKey)));
	}

	#[test]
	fn builder_requires_http_base_url() {
		let missing = CrashReporter::builder()
			.api_key("lt_test")
			.device_info(test_device())
			.build();
		assert!(matches!(missing, Err(TelemetryError::InvalidBaseUrl)));

		let bogus = CrashReporter::builder()
			.api_key("lt_test")
			.base_url("loom.example.com")
			.device_info(test_device())
			.build();
		assert!(matches!(bogus, Err(TelemetryError::InvalidBaseUrl)));
	}

	#[test]
	fn default_hooks_expose_error_layer() {
		let reporter = CrashReporter::builder()
			.api_key("lt_test")
			.base_url("https://example.com")
			.device_info(test_device())
			.build()
			.unwrap();
		assert!(reporter.error_layer().is_some());
		assert!(harness().reporter.error_layer().is_none());
	}

	#[test]
	fn start_capture_needs_a_runtime() {
		let h = harness();
		assert!(matches!(
			h.reporter.start_capture(),
			Err(TelemetryError::NoRuntime)
		));
		assert!(!h.reporter.is_capturing());
		assert_eq!(h.hook.installs.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn start_and_stop_are_idempotent() {
		let h = harness();

		h.reporter.start_capture().unwrap();
		let session = h.reporter.session_id().unwrap();
		h.reporter.start_capture().unwrap();

		assert_eq!(h.reporter.session_id().as_deref(), Some(session.as_str()));
		assert_eq!(h.hook.installs.load(Ordering::SeqCst), 1);

		h.reporter.stop_capture();
		h.reporter.stop_capture();
		assert!(!h.reporter.is_capturing());
		assert_eq!(h.reporter.session_id(), None);
		assert_eq!(h.hook.uninstalls.load(Ordering::SeqCst), 1);

		h.reporter.start_capture().unwrap();
		assert_ne!(h.reporter.session_id().unwrap(), session);
		assert_eq!(h.hook.installs.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn failed_hook_install_rolls_back() {
		let h = harness_with(
			FakeTransport::default(),
			CrashReporter::builder().hook(Arc::new(BrokenHook)),
		);

		let err = h.reporter.start_capture().unwrap_err();
		assert!(matches!(err, TelemetryError::HookInstall(_)));
		assert!(!h.reporter.is_capturing());
		assert_eq!(h.hook.installs.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn start_registers_session() {
		let h = harness();
		h.reporter.set_user_id(Some("player-1".to_string()));
		h.reporter.start_capture().unwrap();
		let session = h.reporter.session_id().unwrap();

		h.publisher
			.wait_for(|events| {
				events
					.iter()
					.any(|e| matches!(e, TelemetryEvent::SessionRegistered { .. }))
			})
			.await;

		let sessions = h.transport.sessions.lock().unwrap().clone();
		assert_eq!(
			sessions,
			vec![SessionRegistration {
				session_id: session,
				app_version: "1.4.0".to_string(),
				platform: "linux-x86_64".to_string(),
				user_id: "player-1".to_string(),
			}]
		);
	}

	#[tokio::test]
	async fn hook_failure_is_reported_as_crash() {
		let h = harness();
		h.reporter.start_capture().unwrap();
		h.reporter.add_breadcrumb("scene", "Entered arena");

		h.hook.fire(CapturedFailure {
			severity: crate::hooks::FailureSeverity::Fatal,
			message: "index out of bounds".to_string(),
			stack_trace: Some(UNITY_TRACE.to_string()),
		});
		h.publisher.wait_for_count(1, is_submitted).await;

		let reports = h.transport.reports();
		assert_eq!(reports.len(), 1);
		assert_eq!(reports[0]["type"], "CRASH");
		assert_eq!(reports[0]["message"], "index out of bounds");
		assert_eq!(reports[0]["sessionId"], h.reporter.session_id().unwrap().as_str());
		assert_eq!(reports[0]["breadcrumbs"][0]["message"], "Entered arena");

		assert!(h.publisher.events().contains(&TelemetryEvent::ReportSubmitted {
			kind: ReportKind::Crash,
			report_id: "rep_1".to_string(),
			group_id: "grp_1".to_string(),
		}));
	}

	#[tokio::test]
	async fn record_error_builds_non_fatal_report() {
		let h = harness();
		h.reporter.start_capture().unwrap();

		h.reporter.record_error("npe", UNITY_TRACE, None);
		h.publisher.wait_for_count(1, is_submitted).await;

		let report = &h.transport.reports()[0];
		assert_eq!(report["type"], "NON_FATAL");
		assert_eq!(report["message"], "npe");
		assert_eq!(
			report["fingerprint"],
			loom_telemetry_core::fingerprint(UNITY_TRACE).as_str()
		);
		assert_eq!(report["fingerprint"].as_str().unwrap().len(), 64);
		assert_eq!(report["appVersion"], "1.4.0");
		assert_eq!(report["deviceMemoryMb"], 8_192);
	}

	#[tokio::test]
	async fn record_exception_includes_source_chain() {
		let h = harness();
		h.reporter.start_capture().unwrap();

		#[derive(Debug, thiserror::Error)]
		#[error("failed to load save")]
		struct LoadError(#[source] std::io::Error);

		let error = LoadError(std::io::Error::new(
			std::io::ErrorKind::NotFound,
			"save.dat missing",
		));
		h.reporter.record_exception(&error, None);
		h.publisher.wait_for_count(1, is_submitted).await;

		let report = &h.transport.reports()[0];
		assert_eq!(report["type"], "NON_FATAL");
		assert_eq!(
			report["message"],
			"failed to load save: save.dat missing"
		);
		assert!(!report["stackTrace"].as_str().unwrap().is_empty());
	}

	#[tokio::test]
	async fn recording_while_idle_is_dropped() {
		let h = harness();

		h.reporter.record_error("too early", UNITY_TRACE, None);

		assert!(h.transport.reports().is_empty());
		assert_eq!(h.publisher.failures(), vec![CAPTURE_NOT_STARTED.to_string()]);
	}

	#[tokio::test]
	async fn minute_limit_drops_sixth_report() {
		let h = harness();
		h.reporter.start_capture().unwrap();

		for i in 0..6 {
			h.reporter.record_error(&format!("error {i}"), UNITY_TRACE, None);
		}
		h.publisher.wait_for_count(5, is_submitted).await;

		assert_eq!(h.transport.reports().len(), 5);
		assert_eq!(
			h.publisher.failures(),
			vec!["per-minute limit exceeded".to_string()]
		);
	}

	#[tokio::test]
	async fn session_limit_drops_reports_until_restart() {
		let h = harness_with(
			FakeTransport::default(),
			CrashReporter::builder().rate_limit(RateLimitConfig {
				per_minute: 100,
				refill_window_secs: 60,
				per_session: 3,
			}),
		);
		h.reporter.start_capture().unwrap();

		for _ in 0..4 {
			h.reporter.record_error("boom", UNITY_TRACE, None);
		}
		h.publisher.wait_for_count(3, is_submitted).await;
		assert_eq!(
			h.publisher.failures(),
			vec!["per-session limit exceeded".to_string()]
		);

		h.reporter.stop_capture();
		h.reporter.start_capture().unwrap();
		h.reporter.record_error("boom", UNITY_TRACE, None);
		h.publisher.wait_for_count(4, is_submitted).await;
		assert_eq!(h.transport.reports().len(), 4);
	}

	#[tokio::test]
	async fn transport_errors_become_failure_events() {
		for (status, reason) in [
			(403, "feature unavailable for current account tier"),
			(429, "server-side rate limit"),
			(500, "server error (status 500)"),
		] {
			let h = harness_with(FakeTransport::failing(status), CrashReporter::builder());
			h.reporter.start_capture().unwrap();

			h.reporter.record_error("boom", UNITY_TRACE, None);
			h.publisher.wait_for_count(1, is_failed).await;

			assert_eq!(h.publisher.failures(), vec![reason.to_string()]);
		}
	}

	#[tokio::test]
	async fn custom_keys_are_bounded_and_extras_win() {
		let h = harness();
		for i in 0..10 {
			h.reporter.set_custom_key(format!("k{i}"), "v").unwrap();
		}
		let err = h.reporter.set_custom_key("k10", "v").unwrap_err();
		assert!(matches!(err, TelemetryError::Core(_)));
		h.reporter.set_custom_key("k0", "updated").unwrap();

		h.reporter.start_capture().unwrap();
		let extra = BTreeMap::from([("k1".to_string(), "from-call".to_string())]);
		h.reporter.record_error("boom", UNITY_TRACE, Some(&extra));
		h.publisher.wait_for_count(1, is_submitted).await;

		let keys = &h.transport.reports()[0]["customKeys"];
		assert_eq!(keys["k0"], "updated");
		assert_eq!(keys["k1"], "from-call");
		assert_eq!(keys.as_object().unwrap().len(), 10);
	}

	#[tokio::test]
	async fn user_id_prefers_override_then_auth() {
		let auth = crate::auth::StaticAuth {
			user_id: Some("auth-user".to_string()),
			access_token: None,
		};
		let h = harness_with(
			FakeTransport::default(),
			CrashReporter::builder().auth_provider(Arc::new(auth)),
		);
		h.reporter.start_capture().unwrap();

		h.reporter.record_error("one", UNITY_TRACE, None);
		h.reporter.set_user_id(Some("override".to_string()));
		h.reporter.record_error("two", UNITY_TRACE, None);
		h.publisher.wait_for_count(2, is_submitted).await;

		let mut users: Vec<String> = h
			.transport
			.reports()
			.iter()
			.map(|r| r["userId"].as_str().unwrap().to_string())
			.collect();
		users.sort();
		assert_eq!(users, vec!["auth-user".to_string(), "override".to_string()]);
	}

	#[tokio::test]
	async fn breadcrumbs_publish_events_and_skip_empty_messages() {
		let h = harness();
		h.reporter.add_breadcrumb("", "Opened inventory");
		h.reporter.add_breadcrumb("ui", "");

		assert_eq!(
			h.publisher.events(),
			vec![TelemetryEvent::BreadcrumbRecorded {
				message: "Opened inventory".to_string()
			}]
		);
	}

	#[tokio::test]
	async fn dropped_reporter_ignores_late_hook_calls() {
		let h = harness();
		h.reporter.start_capture().unwrap();
		h.publisher
			.wait_for(|events| {
				events
					.iter()
					.any(|e| matches!(e, TelemetryEvent::SessionRegistered { .. }))
			})
			.await;
		tokio::time::sleep(Duration::from_millis(10)).await;

		let Harness {
			reporter,
			transport,
			hook,
			..
		} = h;
		drop(reporter);

		hook.fire(CapturedFailure {
			severity: crate::hooks::FailureSeverity::NonFatal,
			message: "late".to_string(),
			stack_trace: None,
		});
		tokio::task::yield_now().await;
		assert!(transport.reports().is_empty());
	}

	fn default_hooks_reporter(
		transport: Arc<FakeTransport>,
		publisher: Arc<RecordingPublisher>,
		builder: CrashReporterBuilder,
	) -> CrashReporter {
		builder
			.base_url("https://loom.example.com")
			.api_key("lt_test")
			.device_info(test_device())
			.transport(transport)
			.event_publisher(publisher)
			.build()
			.unwrap()
	}

	fn process_panic_hook() -> MutexGuard<'static, ()> {
		lock(&crate::hooks::PROCESS_PANIC_HOOK)
	}

	#[tokio::test]
	async fn logged_errors_reach_collector_through_error_layer() {
		let _process_hook = process_panic_hook();
		let transport = Arc::new(FakeTransport::default());
		let publisher = Arc::new(RecordingPublisher::default());
		let reporter =
			default_hooks_reporter(transport.clone(), publisher.clone(), CrashReporter::builder());
		let subscriber = tracing_subscriber::registry().with(reporter.error_layer().unwrap());

		reporter.start_capture().unwrap();
		tracing::subscriber::with_default(subscriber, || {
			tracing::error!(
				target: "game::save",
				error = "disk full",
				stack_trace = UNITY_TRACE,
				"Failed to save slot"
			);
		});
		publisher.wait_for_count(1, is_submitted).await;
		reporter.stop_capture();

		let reports = transport.reports();
		assert_eq!(reports.len(), 1);
		assert_eq!(reports[0]["type"], "NON_FATAL");
		assert_eq!(reports[0]["message"], "Failed to save slot: disk full");
		assert_eq!(reports[0]["stackTrace"], UNITY_TRACE);
		assert_eq!(
			reports[0]["fingerprint"],
			loom_telemetry_core::fingerprint(UNITY_TRACE).as_str()
		);
	}

	#[tokio::test]
	async fn panics_reach_collector_through_panic_hook() {
		let _process_hook = process_panic_hook();
		let transport = Arc::new(FakeTransport::default());
		let publisher = Arc::new(RecordingPublisher::default());
		let reporter =
			default_hooks_reporter(transport.clone(), publisher.clone(), CrashReporter::builder());

		reporter.start_capture().unwrap();
		let result = std::panic::catch_unwind(|| panic!("sword durability underflow"));
		assert!(result.is_err());
		publisher.wait_for_count(1, is_submitted).await;
		reporter.stop_capture();

		let reports = transport.reports();
		assert_eq!(reports.len(), 1);
		assert_eq!(reports[0]["type"], "CRASH");
		assert!(reports[0]["message"]
			.as_str()
			.unwrap()
			.starts_with("sword durability underflow at "));
		assert!(!reports[0]["stackTrace"].as_str().unwrap().is_empty());
	}

	struct PanickingAuth;

	impl AuthProvider for PanickingAuth {
		fn user_id(&self) -> Option<String> {
			panic!("identity service unavailable")
		}
	}

	#[tokio::test]
	async fn panicking_auth_provider_stays_inside_capture_path() {
		let _process_hook = process_panic_hook();
		let transport = Arc::new(FakeTransport::default());
		let publisher = Arc::new(RecordingPublisher::default());
		let reporter = default_hooks_reporter(
			transport.clone(),
			publisher.clone(),
			CrashReporter::builder().auth_provider(Arc::new(PanickingAuth)),
		);

		reporter.start_capture().unwrap();
		let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
			reporter.record_error("boom", UNITY_TRACE, None);
		}));
		assert!(outcome.is_ok());

		publisher.wait_for_count(1, is_submitted).await;
		tokio::time::sleep(Duration::from_millis(20)).await;
		reporter.stop_capture();

		let reports = transport.reports();
		assert_eq!(reports.len(), 1);
		assert_eq!(reports[0]["type"], "NON_FATAL");
		assert_eq!(reports[0]["userId"], "");
		assert!(publisher.failures().is_empty());
	}

	struct PanickingPublisher;

	impl EventPublisher for PanickingPublisher {
		fn publish(&self, _event: TelemetryEvent) {
			panic!("event subscriber gone")
		}
	}

	#[test]
	fn panicking_publisher_stays_inside_capture_path() {
		let _process_hook = process_panic_hook();
		let reporter = CrashReporter::builder()
			.base_url("https://loom.example.com")
			.api_key("lt_test")
			.device_info(test_device())
			.transport(Arc::new(FakeTransport::default()))
			.event_publisher(Arc::new(PanickingPublisher))
			.hook(Arc::new(FakeHook::default()))
			.build()
			.unwrap();

		let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
			reporter.add_breadcrumb("ui", "Opened map");
			reporter.record_error("too early", UNITY_TRACE, None);
		}));
		assert!(outcome.is_ok());
	}

	#[tokio::test]
	async fn failures_raised_inside_pipeline_are_not_reported() {
		let h = harness();
		h.reporter.start_capture().unwrap();

		{
			let _guard = PipelineGuard::enter().unwrap();
			assert!(PipelineGuard::enter().is_none());
			h.hook.fire(CapturedFailure {
				severity: crate::hooks::FailureSeverity::Fatal,
				message: "raised while reporting".to_string(),
				stack_trace: None,
			});
		}
		assert!(PipelineGuard::enter().is_some());

		h.reporter.record_error("after", UNITY_TRACE, None);
		h.publisher.wait_for_count(1, is_submitted).await;

		let reports = h.transport.reports();
		assert_eq!(reports.len(), 1);
		assert_eq!(reports[0]["message"], "after");
		assert!(h.publisher.failures().is_empty());
	}
}
