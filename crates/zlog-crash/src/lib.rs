// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process-wide crash interceptor.
//!
//! This crate provides:
//! - A crash interceptor that registers as the process default uncaught
//!   handler and chains to the handler it replaced
//! - Best-effort diagnostics collection (package and build metadata)
//! - Plain-text crash reports with a cycle-safe cause chain
//! - Fire-and-forget crash notices for the UI layer
//! - An optional on-disk report store
//! - Layered configuration from defaults, TOML files and environment
//!
//! # Example
//!
//! ```no_run
//! use zlog_crash::{config, CrashInterceptor};
//!
//! let config = config::load_config(None).expect("invalid crash config");
//! let interceptor = zlog_crash::install(CrashInterceptor::builder().config(config))
//!     .expect("invalid crash config");
//! assert!(interceptor.is_installed());
//! ```

mod backtrace;
pub mod config;
mod crash;
mod diagnostics;
mod error;
mod handler;
mod interceptor;
mod notify;
mod panic_hook;
mod render;
mod store;

use std::sync::OnceLock;

use tracing::{debug, warn};

pub use backtrace::{capture_backtrace, parse_backtrace};
pub use config::{load_config, ReporterConfig};
pub use crash::{Crash, ERROR_KIND, PANIC_KIND};
pub use diagnostics::{collect, MetadataSource, SystemMetadata};
pub use error::{ConfigError, StoreError};
pub use handler::{HandlerSlot, SharedSlot, UncaughtHandler};
pub use interceptor::{CrashInterceptor, CrashInterceptorBuilder, InterceptorState, CRASH_LOG_TARGET};
pub use notify::{CrashNotice, NotificationReceiver, Notifier};
pub use panic_hook::{PanicHookSlot, StdPanicHook};
pub use render::{cause_chain, render_report, CauseChain, ChainStop, DEFAULT_MAX_CAUSE_DEPTH};
pub use store::ReportStore;

pub use zlog_crash_core::{
	BuildField, CrashError, CrashReport, DiagnosticSnapshot, Frame, PackageInfo, ReportId,
	Stacktrace, ThreadInfo,
};

static GLOBAL: OnceLock<CrashInterceptor> = OnceLock::new();

/// Build the process-wide interceptor and install it as the panic hook.
///
/// Only the first call installs anything; later calls return the interceptor
/// that is already in place and drop `builder`.
pub fn install(builder: CrashInterceptorBuilder) -> Result<CrashInterceptor, ConfigError> {
	if let Some(existing) = GLOBAL.get() {
		debug!("crash interceptor already installed for this process");
		return Ok(existing.clone());
	}

	let candidate = builder.build()?;
	let interceptor = GLOBAL.get_or_init(|| {
		if !candidate.initialize(&PanicHookSlot) {
			warn!("failed to install crash interceptor as panic hook");
		}
		candidate
	});
	Ok(interceptor.clone())
}

/// The interceptor installed by [`install`], if any.
pub fn global() -> Option<&'static CrashInterceptor> {
	GLOBAL.get()
}
