// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Crash report rendering.
//!
//! A report is the diagnostic snapshot as `key=value` lines, then the crash's
//! own trace, then one `Caused by:` section per cause, outermost first:
//!
//! ```text
//! version_name=1.2.0
//! os=linux
//! Exception in thread "worker" panic: boom
//! 	at src/main.rs:10:5
//! 	at my_app::run (src/main.rs:10:5)
//! Caused by: connection reset
//! ```

use std::error::Error;
use std::fmt::{self, Write};

use zlog_crash_core::{DiagnosticSnapshot, ThreadInfo};

use crate::crash::Crash;

/// Default bound on the number of causes rendered.
pub const DEFAULT_MAX_CAUSE_DEPTH: usize = 64;

/// Render a crash report.
///
/// The cause walk stops at the end of the chain, on the first cause already
/// seen (cycles), or after `max_cause_depth` causes.
pub fn render_report(
	snapshot: &DiagnosticSnapshot,
	thread: &ThreadInfo,
	crash: &Crash<'_>,
	max_cause_depth: usize,
) -> Result<String, fmt::Error> {
	let mut out = String::new();

	for (key, value) in snapshot.iter() {
		writeln!(out, "{key}={value}")?;
	}

	writeln!(
		out,
		"Exception in thread \"{}\" {}: {}",
		thread.display_name(),
		crash.kind(),
		crash.message()
	)?;
	if let Some(location) = crash.location() {
		writeln!(out, "\tat {location}")?;
	}
	for frame in &crash.stacktrace().frames {
		writeln!(out, "\tat {frame}")?;
	}

	let chain = walk_causes(crash.error(), crash.cause(), max_cause_depth);
	for cause in &chain.causes {
		write_cause(&mut out, *cause)?;
	}
	match chain.stop {
		ChainStop::End => {}
		ChainStop::Cycle => writeln!(out, "\t... cause chain truncated (cycle detected)")?,
		ChainStop::DepthLimit => writeln!(
			out,
			"\t... cause chain truncated after {max_cause_depth} causes"
		)?,
	}

	Ok(out)
}

// Display only: a Debug impl may itself follow the cause chain.
fn write_cause(out: &mut String, cause: &(dyn Error + 'static)) -> fmt::Result {
	writeln!(out, "Caused by: {cause}")
}

/// Why a cause walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStop {
	End,
	Cycle,
	DepthLimit,
}

/// The causes of a crash, outermost first.
pub struct CauseChain<'a> {
	pub causes: Vec<&'a (dyn Error + 'static)>,
	pub stop: ChainStop,
}

/// Walk a cause chain with cycle detection and a depth bound.
pub fn cause_chain<'a>(head: Option<&'a (dyn Error + 'static)>, max_depth: usize) -> CauseChain<'a> {
	walk_causes(None, head, max_depth)
}

// `root` is the crash's own error; it is never repeated as a cause.
fn walk_causes<'a>(
	root: Option<&'a (dyn Error + 'static)>,
	head: Option<&'a (dyn Error + 'static)>,
	max_depth: usize,
) -> CauseChain<'a> {
	let mut causes: Vec<&'a (dyn Error + 'static)> = Vec::new();
	let mut next = head;

	while let Some(cause) = next {
		let seen = root.is_some_and(|r| same_error(r, cause))
			|| causes.iter().any(|c| same_error(*c, cause));
		if seen {
			return CauseChain {
				causes,
				stop: ChainStop::Cycle,
			};
		}
		if causes.len() >= max_depth {
			return CauseChain {
				causes,
				stop: ChainStop::DepthLimit,
			};
		}
		causes.push(cause);
		next = cause.source();
	}

	CauseChain {
		causes,
		stop: ChainStop::End,
	}
}

// Address and vtable: a wrapper and a source field stored at offset 0 share
// an address but not a type.
fn same_error(a: &(dyn Error + 'static), b: &(dyn Error + 'static)) -> bool {
	std::ptr::eq(a, b)
}
