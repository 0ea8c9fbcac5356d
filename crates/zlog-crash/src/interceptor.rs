// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The crash interceptor: registered as the default uncaught handler, it
//! reports each crash and then hands it back to the handler it replaced.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use tracing::{debug, error, info, warn};
use zlog_crash_core::{CrashReport, DiagnosticSnapshot, ReportId, ThreadInfo};

use crate::config::ReporterConfig;
use crate::crash::Crash;
use crate::diagnostics::{self, MetadataSource, SystemMetadata};
use crate::error::ConfigError;
use crate::handler::{HandlerSlot, UncaughtHandler};
use crate::notify::Notifier;
use crate::render::render_report;
use crate::store::ReportStore;

/// Log target crash reports are emitted under.
pub const CRASH_LOG_TARGET: &str = "zlog::crash";

/// Lifecycle of an interceptor. There is no way back to `Uninitialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptorState {
	Uninitialized,
	Installed,
}

/// Builder for constructing a [`CrashInterceptor`].
pub struct CrashInterceptorBuilder {
	config: ReporterConfig,
	metadata: Option<Arc<dyn MetadataSource>>,
	notifier: Notifier,
	store: Option<ReportStore>,
}

impl CrashInterceptorBuilder {
	/// Creates a new builder with default settings.
	pub fn new() -> Self {
		Self {
			config: ReporterConfig::default(),
			metadata: None,
			notifier: Notifier::disabled(),
			store: None,
		}
	}

	pub fn config(mut self, config: ReporterConfig) -> Self {
		self.config = config;
		self
	}

	/// Sets where package and build metadata are read from.
	///
	/// Defaults to [`SystemMetadata`] with no package registered.
	pub fn metadata(mut self, metadata: Arc<dyn MetadataSource>) -> Self {
		self.metadata = Some(metadata);
		self
	}

	/// Sets the notifier used to tell the UI layer about a crash.
	pub fn notifier(mut self, notifier: Notifier) -> Self {
		self.notifier = notifier;
		self
	}

	/// Uses an already opened store instead of the configured report directory.
	pub fn store(mut self, store: ReportStore) -> Self {
		self.store = Some(store);
		self
	}

	/// Builds the interceptor. It is not installed anywhere yet.
	pub fn build(self) -> Result<CrashInterceptor, ConfigError> {
		self.config.validate()?;
		Ok(self.assemble())
	}

	fn assemble(self) -> CrashInterceptor {
		let store = self.store.or_else(|| {
			let dir = self.config.effective_report_dir()?;
			match ReportStore::open(dir) {
				Ok(store) => Some(store),
				Err(e) => {
					// Reports still go to the log.
					warn!(error = %e, "crash reports will not be persisted");
					None
				}
			}
		});

		let metadata = self
			.metadata
			.unwrap_or_else(|| Arc::new(SystemMetadata::without_package()));

		CrashInterceptor {
			inner: Arc::new(InterceptorInner {
				config: self.config,
				metadata,
				notifier: self.notifier,
				store,
				previous: OnceLock::new(),
			}),
		}
	}
}

impl Default for CrashInterceptorBuilder {
	fn default() -> Self {
		Self::new()
	}
}

struct InterceptorInner {
	config: ReporterConfig,
	metadata: Arc<dyn MetadataSource>,
	notifier: Notifier,
	store: Option<ReportStore>,
	/// The handler we replaced; set exactly once, on installation.
	previous: OnceLock<Arc<dyn UncaughtHandler>>,
}

/// Process-wide crash interceptor.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CrashInterceptor {
	inner: Arc<InterceptorInner>,
}

impl CrashInterceptor {
	pub fn builder() -> CrashInterceptorBuilder {
		CrashInterceptorBuilder::new()
	}

	pub fn state(&self) -> InterceptorState {
		if self.inner.previous.get().is_some() {
			InterceptorState::Installed
		} else {
			InterceptorState::Uninitialized
		}
	}

	pub fn is_installed(&self) -> bool {
		self.state() == InterceptorState::Installed
	}

	pub fn config(&self) -> &ReporterConfig {
		&self.inner.config
	}

	pub fn store(&self) -> Option<&ReportStore> {
		self.inner.store.as_ref()
	}

	/// Register as the default handler of `slot`.
	///
	/// Returns `false` without touching the slot when it has no default
	/// handler to fall back to, or when this interceptor is already installed
	/// (installing twice would make it chain to itself).
	pub fn initialize(&self, slot: &dyn HandlerSlot) -> bool {
		if self.is_installed() {
			warn!("crash interceptor already installed");
			return false;
		}

		let Some(previous) = slot.default_handler() else {
			warn!("no default uncaught handler to fall back to, crash interceptor not installed");
			return false;
		};

		if self.inner.previous.set(previous).is_err() {
			warn!("crash interceptor installed concurrently");
			return false;
		}

		slot.set_default_handler(Arc::new(self.clone()));
		info!("crash interceptor installed");
		true
	}

	/// Entry point for a fatal failure on `thread`.
	///
	/// Reports the crash, then delegates to the previous default handler with
	/// the same thread and crash. Only a handler that claims full recovery
	/// (`suppress_default_handler`) skips delegation; the thread then sleeps
	/// for the grace period so pending notices can be shown.
	pub fn on_uncaught_exception(&self, thread: &ThreadInfo, crash: &Crash<'_>) {
		// A nested panic inside a std panic hook aborts the process anyway;
		// this guards the other delivery paths.
		let handled = panic::catch_unwind(AssertUnwindSafe(|| self.handle(thread, crash)))
			.unwrap_or_else(|_| {
				error!(thread = %thread, "crash handling failed");
				false
			});

		if handled {
			debug!(grace_period = ?self.inner.config.grace_period, "crash handled locally");
			std::thread::sleep(self.inner.config.grace_period);
			return;
		}

		match self.inner.previous.get() {
			Some(previous) => previous.uncaught_exception(thread, crash),
			None => warn!(thread = %thread, "crash interceptor not installed, nothing to delegate to"),
		}
	}

	/// Notify, collect and report. Returns whether the crash was fully handled.
	pub fn handle(&self, thread: &ThreadInfo, crash: &Crash<'_>) -> bool {
		let queued = self.inner.notifier.notify(&self.inner.config.notice_message);
		debug!(queued, "crash notice dispatched");

		let snapshot = self.collect_diagnostics();
		self.render_and_log(thread, crash, &snapshot);

		self.inner.config.suppress_default_handler
	}

	/// Collect package and build metadata. Never fails as a whole.
	pub fn collect_diagnostics(&self) -> DiagnosticSnapshot {
		diagnostics::collect(self.inner.metadata.as_ref())
	}

	/// Render the report, log it under [`CRASH_LOG_TARGET`] and persist it
	/// when a store is configured.
	///
	/// Returns the report id; when persisted the report can be located with
	/// [`ReportStore::path_for`]. `None` means rendering failed.
	pub fn render_and_log(
		&self,
		thread: &ThreadInfo,
		crash: &Crash<'_>,
		snapshot: &DiagnosticSnapshot,
	) -> Option<ReportId> {
		let text = match render_report(snapshot, thread, crash, self.inner.config.max_cause_depth) {
			Ok(text) => text,
			Err(e) => {
				error!(error = %e, "failed to render crash report");
				return None;
			}
		};

		let report = CrashReport::new(thread.clone(), text);
		error!(target: CRASH_LOG_TARGET, report_id = %report.id, thread = %thread, "{}", report.text);

		if let Some(store) = &self.inner.store {
			match store.save(&report) {
				Ok(path) => {
					info!(report_id = %report.id, path = %path.display(), "crash report persisted");
					if let Err(e) = store.prune(self.inner.config.max_reports) {
						warn!(error = %e, "failed to prune crash reports");
					}
				}
				Err(e) => error!(report_id = %report.id, error = %e, "failed to persist crash report"),
			}
		}

		Some(report.id)
	}
}

impl UncaughtHandler for CrashInterceptor {
	fn uncaught_exception(&self, thread: &ThreadInfo, crash: &Crash<'_>) {
		self.on_uncaught_exception(thread, crash);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::handler::SharedSlot;
	use std::io;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Mutex;
	use std::time::Duration;
	use zlog_crash_core::{BuildField, CrashError, PackageInfo};

	#[derive(Default)]
	struct Recorder {
		calls: AtomicUsize,
		seen: Mutex<Vec<(String, usize, String)>>,
	}

	impl UncaughtHandler for Recorder {
		fn uncaught_exception(&self, thread: &ThreadInfo, crash: &Crash<'_>) {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.seen.lock().unwrap().push((
				thread.id.clone(),
				crash as *const Crash<'_> as *const () as usize,
				crash.message().to_string(),
			));
		}
	}

	fn quiet_config() -> ReporterConfig {
		ReporterConfig {
			persist_reports: false,
			grace_period: Duration::from_millis(10),
			..Default::default()
		}
	}

	fn interceptor(config: ReporterConfig) -> CrashInterceptor {
		CrashInterceptor::builder().config(config).build().unwrap()
	}

	#[test]
	fn initialize_fails_on_empty_slot() {
		let slot = SharedSlot::new();
		let interceptor = interceptor(quiet_config());

		assert!(!interceptor.initialize(&slot));
		assert_eq!(interceptor.state(), InterceptorState::Uninitialized);
		assert!(slot.is_empty());
	}

	#[test]
	fn initialize_installs_and_chains() {
		let recorder = Arc::new(Recorder::default());
		let slot = SharedSlot::with_handler(recorder.clone());
		let interceptor = interceptor(quiet_config());

		assert!(interceptor.initialize(&slot));
		assert_eq!(interceptor.state(), InterceptorState::Installed);

		let thread = ThreadInfo::current();
		let crash = Crash::new("panic", "boom");
		assert!(slot.deliver(&thread, &crash));

		assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
		let seen = recorder.seen.lock().unwrap();
		assert_eq!(seen[0].0, thread.id);
		assert_eq!(seen[0].1, &crash as *const Crash<'_> as *const () as usize);
		assert_eq!(seen[0].2, "boom");
	}

	#[test]
	fn second_initialize_is_rejected() {
		let recorder = Arc::new(Recorder::default());
		let slot = SharedSlot::with_handler(recorder.clone());
		let interceptor = interceptor(quiet_config());

		assert!(interceptor.initialize(&slot));
		assert!(!interceptor.initialize(&slot));

		slot.deliver(&ThreadInfo::current(), &Crash::new("panic", "once"));
		assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn uninstalled_interceptor_skips_delegation() {
		let interceptor = interceptor(quiet_config());
		interceptor.on_uncaught_exception(&ThreadInfo::current(), &Crash::new("panic", "boom"));
		assert!(!interceptor.is_installed());
	}

	#[test]
	fn suppression_skips_default_handler() {
		let recorder = Arc::new(Recorder::default());
		let slot = SharedSlot::with_handler(recorder.clone());
		let interceptor = interceptor(ReporterConfig {
			suppress_default_handler: true,
			..quiet_config()
		});
		assert!(interceptor.initialize(&slot));

		slot.deliver(&ThreadInfo::current(), &Crash::new("panic", "handled"));
		assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn handle_reports_not_handled_by_default() {
		let interceptor = interceptor(quiet_config());
		assert!(!interceptor.handle(&ThreadInfo::current(), &Crash::new("panic", "boom")));
	}

	struct PanickingMetadata;

	impl MetadataSource for PanickingMetadata {
		fn package(&self) -> zlog_crash_core::Result<PackageInfo> {
			panic!("metadata backend exploded");
		}

		fn build_field(&self, field: BuildField) -> zlog_crash_core::Result<String> {
			Err(CrashError::unavailable(field.key(), "unused"))
		}
	}

	#[test]
	fn fault_during_handling_still_delegates() {
		let recorder = Arc::new(Recorder::default());
		let slot = SharedSlot::with_handler(recorder.clone());
		let interceptor = CrashInterceptor::builder()
			.config(quiet_config())
			.metadata(Arc::new(PanickingMetadata))
			.build()
			.unwrap();
		assert!(interceptor.initialize(&slot));

		let err = io::Error::other("disk on fire");
		assert!(slot.deliver_error(&err));
		assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn handle_sends_notice() {
		let (notifier, mut rx) = Notifier::channel();
		let interceptor = CrashInterceptor::builder()
			.config(quiet_config())
			.notifier(notifier)
			.build()
			.unwrap();

		interceptor.handle(&ThreadInfo::current(), &Crash::new("panic", "boom"));
		let notice = rx.try_recv().unwrap();
		assert_eq!(notice.message, crate::config::DEFAULT_NOTICE_MESSAGE);
	}

	#[test]
	fn render_and_log_persists_report() {
		let dir = tempfile::tempdir().unwrap();
		let store = ReportStore::open(dir.path()).unwrap();
		let interceptor = CrashInterceptor::builder()
			.config(quiet_config())
			.metadata(Arc::new(SystemMetadata::new(PackageInfo::new(
				"com.example.zlog",
				Some("1.0.0".into()),
				1,
			))))
			.store(store)
			.build()
			.unwrap();

		let snapshot = interceptor.collect_diagnostics();
		let id = interceptor
			.render_and_log(&ThreadInfo::current(), &Crash::new("panic", "boom"), &snapshot)
			.unwrap();

		let text = interceptor.store().unwrap().load(id).unwrap();
		assert!(text.starts_with("version_name=1.0.0\nversion_code=1\n"));
		assert!(text.contains("panic: boom"));
	}

	#[test]
	fn failed_save_still_delegates() {
		let dir = tempfile::tempdir().unwrap();
		let store = ReportStore::open(dir.path().join("crashes")).unwrap();
		std::fs::remove_dir_all(store.dir()).unwrap();

		let recorder = Arc::new(Recorder::default());
		let slot = SharedSlot::with_handler(recorder.clone());
		let interceptor = CrashInterceptor::builder()
			.config(quiet_config())
			.store(store)
			.build()
			.unwrap();
		assert!(interceptor.initialize(&slot));

		let snapshot = interceptor.collect_diagnostics();
		let crash = Crash::new("panic", "disk gone");
		assert!(interceptor
			.render_and_log(&ThreadInfo::current(), &crash, &snapshot)
			.is_some());

		slot.deliver(&ThreadInfo::current(), &crash);
		assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
		assert!(interceptor.store().unwrap().list().is_err());
	}

	#[test]
	fn build_rejects_invalid_config() {
		let result = CrashInterceptor::builder()
			.config(ReporterConfig {
				max_cause_depth: 0,
				..quiet_config()
			})
			.build();
		assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
	}
}
