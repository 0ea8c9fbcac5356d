// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for crash collection.

use thiserror::Error;

/// Errors that can occur while collecting crash context.
///
/// None of these ever escape the interceptor: they are logged and the
/// offending entry is skipped.
#[derive(Debug, Error)]
pub enum CrashError {
	#[error("package not found: {0}")]
	PackageNotFound(String),

	#[error("build field {field} unavailable: {reason}")]
	FieldUnavailable { field: &'static str, reason: String },

	#[error("invalid build field: {0}")]
	InvalidBuildField(String),

	#[error("invalid report id: {0}")]
	InvalidReportId(#[from] uuid::Error),
}

impl CrashError {
	/// Create a field-unavailable error.
	pub fn unavailable(field: &'static str, reason: impl Into<String>) -> Self {
		Self::FieldUnavailable {
			field,
			reason: reason.into(),
		}
	}
}

/// Result type for crash collection operations.
pub type Result<T> = std::result::Result<T, CrashError>;
