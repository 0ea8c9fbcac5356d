// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stack trace types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stack trace containing multiple frames, innermost first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stacktrace {
	pub frames: Vec<Frame>,
}

impl Stacktrace {
	pub fn is_empty(&self) -> bool {
		self.frames.is_empty()
	}
}

/// A single stack frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
	/// Demangled function name
	pub function: Option<String>,
	/// Module path, e.g. `my_app::handlers`
	pub module: Option<String>,
	pub filename: Option<String>,
	pub lineno: Option<u32>,
	pub colno: Option<u32>,
	/// User code vs dependency
	pub in_app: bool,
}

impl Frame {
	/// `file:line[:col]`, when a file is known.
	pub fn location(&self) -> Option<String> {
		let file = self.filename.as_deref()?;
		Some(match (self.lineno, self.colno) {
			(Some(line), Some(col)) => format!("{file}:{line}:{col}"),
			(Some(line), None) => format!("{file}:{line}"),
			_ => file.to_string(),
		})
	}
}

impl fmt::Display for Frame {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let function = self.function.as_deref().unwrap_or("<unknown>");
		match self.location() {
			Some(location) => write!(f, "{function} ({location})"),
			None => write!(f, "{function}"),
		}
	}
}
