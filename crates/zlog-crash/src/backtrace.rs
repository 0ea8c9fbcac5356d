// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Backtrace capture and parsing.

use std::backtrace::{Backtrace, BacktraceStatus};

use rustc_demangle::demangle;
use zlog_crash_core::{Frame, Stacktrace};

/// Crates whose frames are never application code.
const RUNTIME_CRATES: &[&str] = &[
	"std",
	"core",
	"alloc",
	"backtrace",
	"panic_unwind",
	"tokio",
	"tracing",
	"zlog_crash",
];

/// Convert a std backtrace. Anything but a captured backtrace yields no frames.
pub fn parse_backtrace(backtrace: &Backtrace) -> Stacktrace {
	match backtrace.status() {
		BacktraceStatus::Captured => Stacktrace {
			frames: frames_from_text(&format!("{backtrace:#}")),
		},
		_ => Stacktrace::default(),
	}
}

/// Capture the calling thread's backtrace regardless of `RUST_BACKTRACE`.
pub fn capture_backtrace() -> Stacktrace {
	parse_backtrace(&Backtrace::force_capture())
}

/// Frames from std's backtrace text:
///
/// ```text
///    3: my_app::run
///              at ./src/main.rs:12:5
/// ```
///
/// `at` lines belong to the symbol line above them.
fn frames_from_text(text: &str) -> Vec<Frame> {
	let mut frames: Vec<Frame> = Vec::new();

	for raw in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
		match raw.strip_prefix("at ") {
			Some(location) => {
				if let Some(last) = frames.last_mut() {
					apply_location(last, location);
				}
			}
			None => frames.extend(symbol_frame(raw)),
		}
	}

	frames
}

fn symbol_frame(line: &str) -> Option<Frame> {
	let symbol = match line.split_once(':') {
		Some((index, rest)) if index.trim().chars().all(|c| c.is_ascii_digit()) => rest.trim(),
		_ => line.trim(),
	};
	if symbol.is_empty() {
		return None;
	}

	let function = demangle(symbol).to_string();
	Some(Frame {
		module: function.rsplit_once("::").map(|(module, _)| module.to_string()),
		in_app: is_app_frame(&function),
		function: Some(function),
		..Default::default()
	})
}

/// Fill file/line/column from an `at path:line[:col]` location.
fn apply_location(frame: &mut Frame, location: &str) {
	let mut parts = location.rsplitn(3, ':');
	let last = parts.next();
	let middle = parts.next();
	let rest = parts.next();

	match (rest, middle, last) {
		(Some(file), Some(line), Some(col)) if line.parse::<u32>().is_ok() => {
			frame.filename = Some(file.to_string());
			frame.lineno = line.parse().ok();
			frame.colno = col.parse().ok();
		}
		(_, Some(file), Some(line)) if line.parse::<u32>().is_ok() => {
			frame.filename = Some(match rest {
				Some(prefix) => format!("{prefix}:{file}"),
				None => file.to_string(),
			});
			frame.lineno = line.parse().ok();
		}
		_ => frame.filename = Some(location.to_string()),
	}
}

fn is_app_frame(function: &str) -> bool {
	if function.starts_with("__rust") || function.starts_with("_rust") || function.starts_with("rust_") {
		return false;
	}

	let path = function.trim_start_matches('<');
	let krate = path.split("::").next().unwrap_or(path);
	if RUNTIME_CRATES.contains(&krate) {
		return false;
	}

	// generic std machinery instantiated inside application crates
	!["::panicking::", "::rt::", "::sys_common::"]
		.iter()
		.any(|m| function.contains(m))
}
