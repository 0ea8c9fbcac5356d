// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! On-disk crash report store: one plain text file per report.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use zlog_crash_core::{CrashReport, ReportId};

use crate::error::StoreError;

/// Directory of persisted crash reports, named `crash-<id>.log`.
#[derive(Debug, Clone)]
pub struct ReportStore {
	dir: PathBuf,
}

impl ReportStore {
	/// Open (and create if needed) a report directory.
	pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let dir = dir.into();
		fs::create_dir_all(&dir).map_err(|source| StoreError::CreateDir {
			path: dir.clone(),
			source,
		})?;
		Ok(Self { dir })
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	pub fn path_for(&self, id: ReportId) -> PathBuf {
		self.dir.join(id.file_name())
	}

	/// Persist a report, returning the path it was written to.
	///
	/// The text is written to a temporary file first and renamed into place,
	/// so readers never see a partial report.
	pub fn save(&self, report: &CrashReport) -> Result<PathBuf, StoreError> {
		let path = self.path_for(report.id);
		let tmp = self.dir.join(format!(".{}.tmp", report.id));

		let write = || -> std::io::Result<()> {
			let mut file = fs::File::create(&tmp)?;
			file.write_all(report.text.as_bytes())?;
			file.sync_all()?;
			fs::rename(&tmp, &path)
		};

		write().map_err(|source| {
			let _ = fs::remove_file(&tmp);
			StoreError::Write {
				path: path.clone(),
				source,
			}
		})?;

		debug!(report_id = %report.id, path = %path.display(), "crash report saved");
		Ok(path)
	}

	pub fn load(&self, id: ReportId) -> Result<String, StoreError> {
		let path = self.path_for(id);
		fs::read_to_string(&path).map_err(|source| match source.kind() {
			std::io::ErrorKind::NotFound => StoreError::NotFound(id),
			_ => StoreError::Read { path, source },
		})
	}

	/// Stored report ids, oldest first.
	pub fn list(&self) -> Result<Vec<ReportId>, StoreError> {
		let entries = fs::read_dir(&self.dir).map_err(|source| StoreError::Read {
			path: self.dir.clone(),
			source,
		})?;

		let mut ids: Vec<ReportId> = entries
			.filter_map(|entry| entry.ok())
			.filter_map(|entry| entry.file_name().to_str().and_then(ReportId::from_file_name))
			.collect();
		ids.sort();
		Ok(ids)
	}

	/// Delete the oldest reports so that at most `keep` remain.
	///
	/// Returns the number of reports removed.
	pub fn prune(&self, keep: usize) -> Result<usize, StoreError> {
		let ids = self.list()?;
		let excess = ids.len().saturating_sub(keep);
		let mut removed = 0;

		for id in ids.into_iter().take(excess) {
			let path = self.path_for(id);
			match fs::remove_file(&path) {
				Ok(()) => removed += 1,
				Err(e) => warn!(path = %path.display(), error = %e, "failed to prune crash report"),
			}
		}

		if removed > 0 {
			debug!(removed, keep, "pruned crash reports");
		}
		Ok(removed)
	}
}
