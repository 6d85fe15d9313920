// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types and algorithms for the Loom crash telemetry pipeline.
//!
//! This crate holds the pieces of the pipeline that do no I/O and keep no
//! global state. The `loom-telemetry` SDK wires them together behind its
//! capture hooks and transport.
//!
//! # Overview
//!
//! - [`Fingerprinter`] turns stack-trace text into a stable grouping key
//! - [`BreadcrumbRing`] keeps the last 50 context events in a fixed ring
//! - [`RateLimiter`] admits reports through a per-minute token bucket and a
//!   per-session hard cap
//! - [`CustomKeyStore`] holds up to 10 persistent report annotations
//! - [`ReportBuilder`] assembles an immutable [`CrashReport`] and
//!   [`CrashReport::to_json`] writes the wire payload

pub mod breadcrumb;
pub mod custom_keys;
pub mod device;
pub mod error;
pub mod fingerprint;
mod json;
pub mod rate_limit;
pub mod report;

pub use breadcrumb::{Breadcrumb, BreadcrumbRing, BREADCRUMB_CAPACITY, DEFAULT_BREADCRUMB_CATEGORY};
pub use custom_keys::{CustomKeyStore, MAX_CUSTOM_KEYS};
pub use device::DeviceInfo;
pub use error::{Result, TelemetryCoreError};
pub use fingerprint::{
	fingerprint, Fingerprinter, DEFAULT_FRAMEWORK_PREFIXES, MAX_FINGERPRINT_FRAMES,
};
pub use rate_limit::{Admission, RateLimitConfig, RateLimiter};
pub use report::{CrashReport, ReportBuilder, ReportContext, ReportKind};
