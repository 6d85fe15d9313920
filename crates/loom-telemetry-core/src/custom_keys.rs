// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persistent key/value annotations attached to every crash report.

use std::collections::BTreeMap;

use crate::error::{Result, TelemetryCoreError};

/// Maximum number of distinct persistent keys.
pub const MAX_CUSTOM_KEYS: usize = 10;

/// Bounded set of custom keys. Updating an existing key always succeeds; a
/// new key is rejected once [`MAX_CUSTOM_KEYS`] are held.
#[derive(Debug, Clone, Default)]
pub struct CustomKeyStore {
	entries: BTreeMap<String, String>,
}

impl CustomKeyStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
		let key = key.into();
		if key.is_empty() {
			return Err(TelemetryCoreError::EmptyCustomKey);
		}

		if let Some(existing) = self.entries.get_mut(&key) {
			*existing = value.into();
			return Ok(());
		}

		if self.entries.len() >= MAX_CUSTOM_KEYS {
			return Err(TelemetryCoreError::CustomKeyLimit {
				max: MAX_CUSTOM_KEYS,
			});
		}

		self.entries.insert(key, value.into());
		Ok(())
	}

	pub fn get(&self, key: &str) -> Option<&str> {
		self.entries.get(key).map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Persistent keys overlaid with per-report extras; extras win on
	/// collision. The result is not bound by the key limit.
	pub fn merge(&self, extra: Option<&BTreeMap<String, String>>) -> BTreeMap<String, String> {
		let mut merged = self.entries.clone();
		if let Some(extra) = extra {
			merged.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
		}
		merged
	}
}
