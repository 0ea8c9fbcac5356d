// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The failure delivered to an uncaught handler.

use std::error::Error;
use std::fmt;
use std::panic::PanicHookInfo;

use zlog_crash_core::Stacktrace;

use crate::backtrace::capture_backtrace;

/// Kind reported for panics.
pub const PANIC_KIND: &str = "panic";
/// Kind reported for fatal errors delivered outside the panic machinery.
pub const ERROR_KIND: &str = "error";

/// A fatal failure on its way to the default handler.
///
/// The crash borrows whatever it was built from, so it is passed along by
/// reference and forwarded unchanged to the previous handler. A crash built
/// from a panic keeps the original [`PanicHookInfo`] so the std hook can be
/// invoked with it.
pub struct Crash<'a> {
	kind: String,
	message: String,
	location: Option<String>,
	stacktrace: Stacktrace,
	error: Option<&'a (dyn Error + 'static)>,
	cause: Option<&'a (dyn Error + 'static)>,
	panic_info: Option<&'a PanicHookInfo<'a>>,
}

impl<'a> Crash<'a> {
	pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			kind: kind.into(),
			message: message.into(),
			location: None,
			stacktrace: Stacktrace::default(),
			error: None,
			cause: None,
			panic_info: None,
		}
	}

	/// Build a crash from a panic hook invocation, capturing the backtrace now.
	///
	/// A payload raised with `std::panic::panic_any` carrying a boxed error
	/// becomes the head of the cause chain.
	pub fn from_panic(info: &'a PanicHookInfo<'a>) -> Self {
		let payload = info.payload();
		let cause = payload
			.downcast_ref::<Box<dyn Error + Send + Sync>>()
			.map(|e| e.as_ref() as &(dyn Error + 'static));

		Self {
			kind: PANIC_KIND.to_string(),
			message: panic_message(info),
			location: info
				.location()
				.map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column())),
			stacktrace: capture_backtrace(),
			error: None,
			cause,
			panic_info: Some(info),
		}
	}

	/// Build a crash from a fatal error; the error's sources form the cause chain.
	pub fn from_error(error: &'a (dyn Error + 'static)) -> Self {
		Self {
			kind: ERROR_KIND.to_string(),
			message: error.to_string(),
			location: None,
			stacktrace: capture_backtrace(),
			error: Some(error),
			cause: error.source(),
			panic_info: None,
		}
	}

	pub fn with_cause(mut self, cause: &'a (dyn Error + 'static)) -> Self {
		self.cause = Some(cause);
		self
	}

	pub fn with_location(mut self, location: impl Into<String>) -> Self {
		self.location = Some(location.into());
		self
	}

	pub fn with_stacktrace(mut self, stacktrace: Stacktrace) -> Self {
		self.stacktrace = stacktrace;
		self
	}

	pub fn kind(&self) -> &str {
		&self.kind
	}

	pub fn message(&self) -> &str {
		&self.message
	}

	pub fn location(&self) -> Option<&str> {
		self.location.as_deref()
	}

	pub fn stacktrace(&self) -> &Stacktrace {
		&self.stacktrace
	}

	/// The error this crash was built from, if any.
	pub fn error(&self) -> Option<&'a (dyn Error + 'static)> {
		self.error
	}

	/// Head of the cause chain; follow it with [`Error::source`].
	pub fn cause(&self) -> Option<&'a (dyn Error + 'static)> {
		self.cause
	}

	/// The std panic info, when this crash came from the panic hook.
	pub fn panic_info(&self) -> Option<&'a PanicHookInfo<'a>> {
		self.panic_info
	}
}

impl fmt::Display for Crash<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.kind, self.message)
	}
}

impl fmt::Debug for Crash<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Crash")
			.field("kind", &self.kind)
			.field("message", &self.message)
			.field("location", &self.location)
			.field("frames", &self.stacktrace.frames.len())
			.field("has_cause", &self.cause.is_some())
			.field("from_panic", &self.panic_info.is_some())
			.finish()
	}
}

/// Extract the panic message from panic info.
fn panic_message(info: &PanicHookInfo<'_>) -> String {
	let payload = info.payload();
	if let Some(s) = payload.downcast_ref::<&str>() {
		s.to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else if let Some(e) = payload.downcast_ref::<Box<dyn Error + Send + Sync>>() {
		e.to_string()
	} else {
		"Box<dyn Any>".to_string()
	}
}
