// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Diagnostic metadata collection.

use std::path::Path;

use tracing::{error, trace};
use zlog_crash_core::{BuildField, CrashError, DiagnosticSnapshot, PackageInfo, Result};

/// Where crash-time metadata comes from.
pub trait MetadataSource: Send + Sync {
	/// Package metadata for the running application.
	fn package(&self) -> Result<PackageInfo>;

	/// Read a single build/platform field.
	fn build_field(&self, field: BuildField) -> Result<String>;
}

/// Collect a snapshot from `source`.
///
/// Each read is isolated: a failing package lookup or field read is logged and
/// skipped, and the remaining entries are still collected.
pub fn collect(source: &dyn MetadataSource) -> DiagnosticSnapshot {
	let mut snapshot = DiagnosticSnapshot::new();

	match source.package() {
		Ok(package) => {
			let version_name = package.version_name.unwrap_or_else(|| "null".to_string());
			snapshot.insert("version_name", version_name);
			snapshot.insert("version_code", package.version_code.to_string());
		}
		Err(e) => error!(error = %e, "an error occurred when collecting package info"),
	}

	for field in BuildField::ALL {
		match source.build_field(field) {
			Ok(value) => {
				trace!(field = field.key(), "collected build field");
				snapshot.insert(field.key(), value);
			}
			Err(e) => error!(field = field.key(), error = %e, "an error occurred when collecting crash info"),
		}
	}

	snapshot
}

/// Metadata read from the running process and the host system.
#[derive(Debug, Clone, Default)]
pub struct SystemMetadata {
	package: Option<PackageInfo>,
}

impl SystemMetadata {
	pub fn new(package: PackageInfo) -> Self {
		Self {
			package: Some(package),
		}
	}

	/// System metadata with no package registered; package lookups fail.
	pub fn without_package() -> Self {
		Self::default()
	}
}

impl MetadataSource for SystemMetadata {
	fn package(&self) -> Result<PackageInfo> {
		self
			.package
			.clone()
			.ok_or_else(|| CrashError::PackageNotFound("no package registered".to_string()))
	}

	fn build_field(&self, field: BuildField) -> Result<String> {
		let key = field.key();
		match field {
			BuildField::Os => Ok(std::env::consts::OS.to_string()),
			BuildField::Family => Ok(std::env::consts::FAMILY.to_string()),
			BuildField::Arch => Ok(std::env::consts::ARCH.to_string()),
			BuildField::Hostname => std::env::var("HOSTNAME")
				.ok()
				.filter(|h| !h.trim().is_empty())
				.map(Ok)
				.unwrap_or_else(|| read_trimmed(key, Path::new("/etc/hostname"))),
			BuildField::KernelRelease => read_trimmed(key, Path::new("/proc/sys/kernel/osrelease")),
			BuildField::CpuCount => std::thread::available_parallelism()
				.map(|n| n.to_string())
				.map_err(|e| CrashError::unavailable(key, e.to_string())),
			BuildField::ProcessId => Ok(std::process::id().to_string()),
			BuildField::Executable => std::env::current_exe()
				.map(|p| p.display().to_string())
				.map_err(|e| CrashError::unavailable(key, e.to_string())),
			BuildField::RustBacktrace => {
				std::env::var("RUST_BACKTRACE").map_err(|e| CrashError::unavailable(key, e.to_string()))
			}
		}
	}
}

fn read_trimmed(key: &'static str, path: &Path) -> Result<String> {
	let content = std::fs::read_to_string(path)
		.map_err(|e| CrashError::unavailable(key, format!("{}: {e}", path.display())))?;
	let value = content.trim();
	if value.is_empty() {
		return Err(CrashError::unavailable(key, format!("{} is empty", path.display())));
	}
	Ok(value.to_string())
}
