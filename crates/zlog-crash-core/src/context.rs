// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Context types describing the crashing process (thread, package, build).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CrashError;

/// The thread a crash was delivered on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
	pub name: Option<String>,
	/// Debug rendering of the std `ThreadId`, e.g. `ThreadId(3)`
	pub id: String,
}

impl ThreadInfo {
	pub fn new(name: Option<String>, id: impl Into<String>) -> Self {
		Self {
			name,
			id: id.into(),
		}
	}

	/// Describe the calling thread.
	pub fn current() -> Self {
		let thread = std::thread::current();
		Self {
			name: thread.name().map(str::to_string),
			id: format!("{:?}", thread.id()),
		}
	}

	/// Thread name, falling back to its id for unnamed threads.
	pub fn display_name(&self) -> &str {
		self.name.as_deref().unwrap_or(&self.id)
	}
}

impl fmt::Display for ThreadInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.display_name())
	}
}

/// Installed package metadata for the running application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
	pub name: String,
	pub version_name: Option<String>,
	pub version_code: u64,
}

impl PackageInfo {
	pub fn new(name: impl Into<String>, version_name: Option<String>, version_code: u64) -> Self {
		Self {
			name: name.into(),
			version_name,
			version_code,
		}
	}
}

/// Build and platform metadata keys read at crash time.
///
/// The list is closed: collection walks [`BuildField::ALL`] in order and reads
/// each field independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildField {
	Os,
	Family,
	Arch,
	Hostname,
	KernelRelease,
	CpuCount,
	ProcessId,
	Executable,
	RustBacktrace,
}

impl BuildField {
	pub const ALL: [BuildField; 9] = [
		Self::Os,
		Self::Family,
		Self::Arch,
		Self::Hostname,
		Self::KernelRelease,
		Self::CpuCount,
		Self::ProcessId,
		Self::Executable,
		Self::RustBacktrace,
	];

	/// Snapshot key for this field.
	pub fn key(&self) -> &'static str {
		match self {
			Self::Os => "os",
			Self::Family => "family",
			Self::Arch => "arch",
			Self::Hostname => "hostname",
			Self::KernelRelease => "kernel_release",
			Self::CpuCount => "cpu_count",
			Self::ProcessId => "process_id",
			Self::Executable => "executable",
			Self::RustBacktrace => "rust_backtrace",
		}
	}
}

impl fmt::Display for BuildField {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.key())
	}
}

impl FromStr for BuildField {
	type Err = CrashError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|field| field.key() == s)
			.ok_or_else(|| CrashError::InvalidBuildField(s.to_string()))
	}
}
