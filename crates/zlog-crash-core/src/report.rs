// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rendered crash reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::context::ThreadInfo;
use crate::error::CrashError;

/// Unique, time-ordered identifier for a crash report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReportId(pub Uuid);

impl ReportId {
	pub fn new() -> Self {
		Self(Uuid::now_v7())
	}

	/// File name used when the report is persisted.
	pub fn file_name(&self) -> String {
		format!("crash-{}.log", self.0)
	}

	/// Inverse of [`ReportId::file_name`].
	pub fn from_file_name(name: &str) -> Option<Self> {
		name
			.strip_prefix("crash-")?
			.strip_suffix(".log")?
			.parse()
			.ok()
	}

	/// Creation time embedded in a v7 id. `None` for other uuid versions.
	pub fn timestamp(&self) -> Option<DateTime<Utc>> {
		let (secs, nanos) = self.0.get_timestamp()?.to_unix();
		DateTime::from_timestamp(secs as i64, nanos)
	}
}

impl Default for ReportId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for ReportId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for ReportId {
	type Err = CrashError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// A rendered, write-once crash report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashReport {
	pub id: ReportId,
	pub created_at: DateTime<Utc>,
	pub thread: ThreadInfo,
	pub text: String,
}

impl CrashReport {
	pub fn new(thread: ThreadInfo, text: String) -> Self {
		Self {
			id: ReportId::new(),
			created_at: Utc::now(),
			thread,
			text,
		}
	}
}
