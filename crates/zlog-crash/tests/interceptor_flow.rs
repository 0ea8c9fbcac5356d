// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! End-to-end crash flow through an in-memory handler slot.

mod common;

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use common::CaptureLayer;
use tracing_subscriber::layer::SubscriberExt;
use zlog_crash::{
	BuildField, Crash, CrashError, CrashInterceptor, MetadataSource, Notifier, PackageInfo,
	ReportStore, ReporterConfig, SharedSlot, ThreadInfo, UncaughtHandler, CRASH_LOG_TARGET,
};

#[derive(Debug)]
struct Layered {
	message: &'static str,
	source: Option<Box<Layered>>,
}

impl Layered {
	fn chain(messages: &[&'static str]) -> Option<Box<Layered>> {
		messages.iter().rev().fold(None, |source, &message| {
			Some(Box::new(Layered { message, source }))
		})
	}
}

impl fmt::Display for Layered {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.message)
	}
}

impl Error for Layered {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		self.source.as_deref().map(|e| e as &(dyn Error + 'static))
	}
}

#[derive(Debug, thiserror::Error)]
enum SyncError {
	#[error("failed to open sync journal")]
	Journal(#[source] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
#[error("sync worker stopped")]
struct WorkerError {
	#[source]
	source: SyncError,
}

struct Looped {
	name: &'static str,
	next: OnceLock<Arc<Looped>>,
}

impl fmt::Debug for Looped {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name)
	}
}

impl fmt::Display for Looped {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name)
	}
}

impl Error for Looped {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		self.next.get().map(|e| e.as_ref() as &(dyn Error + 'static))
	}
}

struct FixedMetadata;

impl MetadataSource for FixedMetadata {
	fn package(&self) -> zlog_crash_core::Result<PackageInfo> {
		Ok(PackageInfo::new("com.example.notes", Some("2.4.1".into()), 241))
	}

	fn build_field(&self, field: BuildField) -> zlog_crash_core::Result<String> {
		match field {
			BuildField::Os => Ok("linux".into()),
			BuildField::Hostname => Err(CrashError::unavailable(field.key(), "permission denied")),
			other => Ok(format!("{}-value", other.key())),
		}
	}
}

#[derive(Default)]
struct CountingHandler {
	calls: AtomicUsize,
	messages: Mutex<Vec<String>>,
}

impl UncaughtHandler for CountingHandler {
	fn uncaught_exception(&self, _thread: &ThreadInfo, crash: &Crash<'_>) {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.messages.lock().unwrap().push(crash.message().to_string());
	}
}

fn worker() -> ThreadInfo {
	ThreadInfo::new(Some("worker".into()), "ThreadId(7)")
}

fn config() -> ReporterConfig {
	ReporterConfig {
		persist_reports: false,
		grace_period: Duration::from_millis(50),
		..Default::default()
	}
}

#[test]
fn error_with_causes_is_reported_and_delegated() {
	let dir = tempfile::tempdir().unwrap();
	let store = ReportStore::open(dir.path()).unwrap();
	let (notifier, mut notices) = Notifier::channel();
	let interceptor = CrashInterceptor::builder()
		.config(config())
		.metadata(Arc::new(FixedMetadata))
		.notifier(notifier)
		.store(store.clone())
		.build()
		.unwrap();

	let previous = Arc::new(CountingHandler::default());
	let slot = SharedSlot::with_handler(previous.clone());
	assert!(interceptor.initialize(&slot));

	let capture = CaptureLayer::new();
	let subscriber = tracing_subscriber::registry().with(capture.clone());

	let error = Layered::chain(&["sync failed", "request timed out", "connection reset"]).unwrap();
	tracing::subscriber::with_default(subscriber, || {
		let crash = Crash::from_error(&*error);
		assert!(slot.deliver(&worker(), &crash));
	});

	assert_eq!(previous.calls.load(Ordering::SeqCst), 1);
	assert_eq!(*previous.messages.lock().unwrap(), vec!["sync failed".to_string()]);

	let ids = store.list().unwrap();
	assert_eq!(ids.len(), 1);
	let report = store.load(ids[0]).unwrap();

	let lines: Vec<&str> = report.lines().collect();
	assert_eq!(lines[0], "version_name=2.4.1");
	assert_eq!(lines[1], "version_code=241");
	assert_eq!(lines[2], "os=linux");
	assert!(!report.contains("hostname="));
	assert!(report.contains("Exception in thread \"worker\" error: sync failed"));

	let causes: Vec<&str> = lines
		.iter()
		.filter_map(|l| l.strip_prefix("Caused by: "))
		.collect();
	assert_eq!(causes, vec!["request timed out", "connection reset"]);

	let logged = capture.for_target(CRASH_LOG_TARGET);
	assert_eq!(logged.len(), 1);
	assert_eq!(logged[0].message, report);

	assert_eq!(
		notices.try_recv().unwrap().message,
		zlog_crash::config::DEFAULT_NOTICE_MESSAGE
	);
}

#[test]
fn nested_error_values_keep_their_whole_chain() {
	let dir = tempfile::tempdir().unwrap();
	let store = ReportStore::open(dir.path()).unwrap();
	let interceptor = CrashInterceptor::builder()
		.config(config())
		.metadata(Arc::new(FixedMetadata))
		.store(store.clone())
		.build()
		.unwrap();
	let previous = Arc::new(CountingHandler::default());
	let slot = SharedSlot::with_handler(previous.clone());
	assert!(interceptor.initialize(&slot));

	let error = WorkerError {
		source: SyncError::Journal(std::io::Error::new(
			std::io::ErrorKind::PermissionDenied,
			"journal.db is read-only",
		)),
	};
	assert!(slot.deliver_error(&error));

	assert_eq!(previous.calls.load(Ordering::SeqCst), 1);
	let report = store.load(store.list().unwrap()[0]).unwrap();
	let causes: Vec<&str> = report
		.lines()
		.filter_map(|l| l.strip_prefix("Caused by: "))
		.collect();
	assert_eq!(causes, vec!["failed to open sync journal", "journal.db is read-only"]);
	assert!(report.contains("error: sync worker stopped"));
	assert!(!report.contains("truncated"));
}

#[test]
fn cyclic_cause_chain_terminates() {
	let a = Arc::new(Looped {
		name: "A",
		next: OnceLock::new(),
	});
	let b = Arc::new(Looped {
		name: "B",
		next: OnceLock::new(),
	});
	a.next.set(Arc::clone(&b)).unwrap();
	b.next.set(Arc::clone(&a)).unwrap();

	let dir = tempfile::tempdir().unwrap();
	let store = ReportStore::open(dir.path()).unwrap();
	let interceptor = CrashInterceptor::builder()
		.config(config())
		.metadata(Arc::new(FixedMetadata))
		.store(store.clone())
		.build()
		.unwrap();
	let previous = Arc::new(CountingHandler::default());
	let slot = SharedSlot::with_handler(previous.clone());
	assert!(interceptor.initialize(&slot));

	let crash = Crash::new("panic", "loop").with_cause(a.as_ref());
	slot.deliver(&worker(), &crash);

	assert_eq!(previous.calls.load(Ordering::SeqCst), 1);
	let report = store.load(store.list().unwrap()[0]).unwrap();
	assert!(report.contains("Caused by: A\nCaused by: B\n"));
	assert!(report.contains("cycle detected"));
}

#[test]
fn suppressed_crash_waits_for_grace_period() {
	let interceptor = CrashInterceptor::builder()
		.config(ReporterConfig {
			suppress_default_handler: true,
			..config()
		})
		.metadata(Arc::new(FixedMetadata))
		.build()
		.unwrap();
	let previous = Arc::new(CountingHandler::default());
	let slot = SharedSlot::with_handler(previous.clone());
	assert!(interceptor.initialize(&slot));

	let started = Instant::now();
	slot.deliver(&worker(), &Crash::new("panic", "recovered"));

	assert!(started.elapsed() >= Duration::from_millis(50));
	assert_eq!(previous.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn empty_slot_is_left_untouched() {
	let interceptor = CrashInterceptor::builder().config(config()).build().unwrap();
	let slot = SharedSlot::new();

	assert!(!interceptor.initialize(&slot));
	assert!(!interceptor.is_installed());
	assert!(!slot.deliver(&worker(), &Crash::new("panic", "nobody listening")));
}

#[test]
fn concurrent_crashes_each_delegate_once() {
	let interceptor = CrashInterceptor::builder()
		.config(config())
		.metadata(Arc::new(FixedMetadata))
		.build()
		.unwrap();
	let previous = Arc::new(CountingHandler::default());
	let slot = Arc::new(SharedSlot::with_handler(previous.clone()));
	assert!(interceptor.initialize(slot.as_ref()));

	let handles: Vec<_> = (0..4)
		.map(|i| {
			let slot = Arc::clone(&slot);
			std::thread::spawn(move || {
				let thread = ThreadInfo::new(Some(format!("worker-{i}")), format!("ThreadId({i})"));
				slot.deliver(&thread, &Crash::new("panic", format!("crash {i}")));
			})
		})
		.collect();
	for handle in handles {
		handle.join().unwrap();
	}

	assert_eq!(previous.calls.load(Ordering::SeqCst), 4);
	let mut messages = previous.messages.lock().unwrap().clone();
	messages.sort();
	assert_eq!(messages, vec!["crash 0", "crash 1", "crash 2", "crash 3"]);
}
