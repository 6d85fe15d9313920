// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identity supplied by the host's authentication layer.

/// Source of the signed-in user and their access token.
///
/// Both are read at report time, so a provider may change its answers as the
/// user signs in or out.
pub trait AuthProvider: Send + Sync {
	/// Identifier of the signed-in user, if any.
	fn user_id(&self) -> Option<String>;

	/// Bearer token sent alongside the API key, if any.
	fn access_token(&self) -> Option<String> {
		None
	}
}

/// Fixed identity, handy for tools and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
	pub user_id: Option<String>,
	pub access_token: Option<String>,
}

impl AuthProvider for StaticAuth {
	fn user_id(&self) -> Option<String> {
		self.user_id.clone()
	}

	fn access_token(&self) -> Option<String> {
		self.access_token.clone()
	}
}
