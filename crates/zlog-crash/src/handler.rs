// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Uncaught handlers and the slot that holds the process default.

use std::error::Error;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};
use zlog_crash_core::ThreadInfo;

use crate::crash::Crash;

/// Receives fatal failures that nothing else recovered from.
pub trait UncaughtHandler: Send + Sync {
	fn uncaught_exception(&self, thread: &ThreadInfo, crash: &Crash<'_>);
}

impl<F> UncaughtHandler for F
where
	F: Fn(&ThreadInfo, &Crash<'_>) + Send + Sync,
{
	fn uncaught_exception(&self, thread: &ThreadInfo, crash: &Crash<'_>) {
		self(thread, crash)
	}
}

/// The single "default handler" slot of a runtime.
///
/// Implementations must cooperate with whatever handler was registered
/// before them: readers get the current handler so they can chain to it.
pub trait HandlerSlot: Send + Sync {
	/// The currently registered default handler, if the runtime has one.
	fn default_handler(&self) -> Option<Arc<dyn UncaughtHandler>>;

	/// Replace the default handler.
	fn set_default_handler(&self, handler: Arc<dyn UncaughtHandler>);
}

/// In-memory handler slot for host runtimes that deliver fatal errors
/// themselves, e.g. at thread or task boundaries.
#[derive(Default)]
pub struct SharedSlot {
	handler: RwLock<Option<Arc<dyn UncaughtHandler>>>,
}

impl SharedSlot {
	/// An empty slot, with no default handler registered.
	pub fn new() -> Self {
		Self::default()
	}

	/// A slot pre-populated with a default handler.
	pub fn with_handler(handler: Arc<dyn UncaughtHandler>) -> Self {
		Self {
			handler: RwLock::new(Some(handler)),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.current().is_none()
	}

	/// Deliver a crash to the current default handler.
	///
	/// Returns `false` when the slot is empty and the crash went nowhere.
	pub fn deliver(&self, thread: &ThreadInfo, crash: &Crash<'_>) -> bool {
		match self.current() {
			Some(handler) => {
				debug!(thread = %thread, kind = crash.kind(), "delivering uncaught failure");
				handler.uncaught_exception(thread, crash);
				true
			}
			None => {
				warn!(thread = %thread, crash = %crash, "no default handler registered, dropping crash");
				false
			}
		}
	}

	/// Deliver a fatal error raised on the calling thread.
	pub fn deliver_error(&self, error: &(dyn Error + 'static)) -> bool {
		let thread = ThreadInfo::current();
		let crash = Crash::from_error(error);
		self.deliver(&thread, &crash)
	}

	fn current(&self) -> Option<Arc<dyn UncaughtHandler>> {
		// A poisoned lock still holds a usable handler.
		match self.handler.read() {
			Ok(guard) => guard.clone(),
			Err(poisoned) => poisoned.into_inner().clone(),
		}
	}
}

impl HandlerSlot for SharedSlot {
	fn default_handler(&self) -> Option<Arc<dyn UncaughtHandler>> {
		self.current()
	}

	fn set_default_handler(&self, handler: Arc<dyn UncaughtHandler>) {
		let mut guard = match self.handler.write() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		};
		*guard = Some(handler);
	}
}
