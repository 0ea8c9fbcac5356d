// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the zlog crash interceptor.
//!
//! This crate provides the plain data shared by the interceptor (`zlog-crash`)
//! and the host application:
//! - [`Stacktrace`] and [`Frame`] for captured backtraces
//! - [`DiagnosticSnapshot`], the ordered key/value metadata collected at crash time
//! - [`ThreadInfo`], [`PackageInfo`] and [`BuildField`] describing the crashing process
//! - [`CrashReport`] and [`ReportId`] for rendered reports
//!
//! Nothing in here touches global state; installing hooks and collecting
//! metadata lives in `zlog-crash`.

pub mod context;
pub mod error;
pub mod report;
pub mod snapshot;
pub mod stacktrace;

pub use context::{BuildField, PackageInfo, ThreadInfo};
pub use error::{CrashError, Result};
pub use report::{CrashReport, ReportId};
pub use snapshot::DiagnosticSnapshot;
pub use stacktrace::{Frame, Stacktrace};
