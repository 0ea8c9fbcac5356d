// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bridge between [`HandlerSlot`] and the std panic hook.

use std::panic::{self, PanicHookInfo};
use std::sync::Arc;

use tracing::error;
use zlog_crash_core::ThreadInfo;

use crate::crash::Crash;
use crate::handler::{HandlerSlot, UncaughtHandler};

type StdHook = Box<dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static>;

/// The process panic hook, viewed as a handler slot.
///
/// Rust always has a panic hook installed (the std default prints the message
/// and an optional backtrace), so [`HandlerSlot::default_handler`] never
/// returns `None` here.
///
/// Both methods call into `std::panic::{take_hook, set_hook}` and therefore
/// must not be used from a panicking thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct PanicHookSlot;

impl HandlerSlot for PanicHookSlot {
	fn default_handler(&self) -> Option<Arc<dyn UncaughtHandler>> {
		let previous = Arc::new(StdPanicHook {
			hook: panic::take_hook(),
		});

		// take_hook left the std default in place; put the original back.
		let restore = Arc::clone(&previous);
		panic::set_hook(Box::new(move |info| (restore.hook)(info)));

		Some(previous)
	}

	fn set_default_handler(&self, handler: Arc<dyn UncaughtHandler>) {
		panic::set_hook(Box::new(move |info| {
			let thread = ThreadInfo::current();
			let crash = Crash::from_panic(info);
			handler.uncaught_exception(&thread, &crash);
		}));
	}
}

/// A std panic hook captured from the process.
pub struct StdPanicHook {
	hook: StdHook,
}

impl StdPanicHook {
	pub fn new(hook: StdHook) -> Self {
		Self { hook }
	}
}

impl UncaughtHandler for StdPanicHook {
	fn uncaught_exception(&self, thread: &ThreadInfo, crash: &Crash<'_>) {
		match crash.panic_info() {
			Some(info) => (self.hook)(info),
			// A std hook can only be driven by a real panic.
			None => error!(thread = %thread, crash = %crash, "uncaught failure"),
		}
	}
}
