// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for the crash interceptor.
//!
//! Sources, lowest precedence first:
//! - built-in defaults
//! - user file: `$XDG_CONFIG_HOME/zlog/config.toml`
//! - an explicit file (e.g. `--config`)
//! - environment: `ZLOG_CRASH_*`, `ZLOG_LOG_LEVEL`
//!
//! ```toml
//! [crash]
//! notice_message = "Sorry, the application hit an unexpected error and will exit."
//! persist_reports = true
//! report_dir = "/var/lib/myapp/crashes"
//! max_reports = 50
//! suppress_default_handler = false
//! grace_period_ms = 3000
//! max_cause_depth = 64
//!
//! [logging]
//! level = "info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, trace};

use crate::error::ConfigError;
use crate::render::DEFAULT_MAX_CAUSE_DEPTH;

pub const DEFAULT_NOTICE_MESSAGE: &str =
	"Sorry, the application hit an unexpected error and will exit.";
pub const DEFAULT_MAX_REPORTS: usize = 50;
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);
pub const DEFAULT_LOG_LEVEL: &str = "info";

const MAX_GRACE_PERIOD: Duration = Duration::from_secs(60);

/// Runtime configuration of the interceptor.
#[derive(Debug, Clone, PartialEq)]
pub struct ReporterConfig {
	/// Fixed message shown to the user when a crash is intercepted.
	pub notice_message: String,
	/// Write each report to `report_dir`.
	pub persist_reports: bool,
	pub report_dir: Option<PathBuf>,
	/// Oldest reports beyond this count are pruned after each save.
	pub max_reports: usize,
	/// Treat local handling as a full recovery and skip the default handler.
	pub suppress_default_handler: bool,
	/// Pause on the failing thread when the default handler is skipped.
	pub grace_period: Duration,
	pub max_cause_depth: usize,
	pub log_level: String,
}

impl Default for ReporterConfig {
	fn default() -> Self {
		Self {
			notice_message: DEFAULT_NOTICE_MESSAGE.to_string(),
			persist_reports: true,
			report_dir: default_report_dir(),
			max_reports: DEFAULT_MAX_REPORTS,
			suppress_default_handler: false,
			grace_period: DEFAULT_GRACE_PERIOD,
			max_cause_depth: DEFAULT_MAX_CAUSE_DEPTH,
			log_level: DEFAULT_LOG_LEVEL.to_string(),
		}
	}
}

impl ReporterConfig {
	/// Finalize a merged layer on top of the defaults.
	pub fn from_layer(layer: ConfigLayer) -> Self {
		let mut config = Self::default();

		if let Some(crash) = layer.crash {
			if let Some(v) = crash.notice_message {
				config.notice_message = v;
			}
			if let Some(v) = crash.persist_reports {
				config.persist_reports = v;
			}
			if let Some(v) = crash.report_dir {
				config.report_dir = Some(v);
			}
			if let Some(v) = crash.max_reports {
				config.max_reports = v;
			}
			if let Some(v) = crash.suppress_default_handler {
				config.suppress_default_handler = v;
			}
			if let Some(v) = crash.grace_period_ms {
				config.grace_period = Duration::from_millis(v);
			}
			if let Some(v) = crash.max_cause_depth {
				config.max_cause_depth = v;
			}
		}

		if let Some(level) = layer.logging.and_then(|l| l.level) {
			config.log_level = level;
		}

		config
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.notice_message.trim().is_empty() {
			return Err(ConfigError::invalid_value("crash.notice_message", "must not be empty"));
		}
		if self.max_cause_depth == 0 {
			return Err(ConfigError::invalid_value("crash.max_cause_depth", "must be at least 1"));
		}
		if self.persist_reports && self.max_reports == 0 {
			return Err(ConfigError::invalid_value(
				"crash.max_reports",
				"must be at least 1 when reports are persisted",
			));
		}
		if self.grace_period > MAX_GRACE_PERIOD {
			return Err(ConfigError::invalid_value(
				"crash.grace_period_ms",
				format!("must not exceed {}ms", MAX_GRACE_PERIOD.as_millis()),
			));
		}
		Ok(())
	}

	/// The directory reports are written to, if persistence is on.
	pub fn effective_report_dir(&self) -> Option<&Path> {
		if self.persist_reports {
			self.report_dir.as_deref()
		} else {
			None
		}
	}
}

/// `$XDG_DATA_HOME/zlog/crashes`, when a data directory can be resolved.
pub fn default_report_dir() -> Option<PathBuf> {
	dirs::data_local_dir().map(|d| d.join("zlog").join("crashes"))
}

/// `$XDG_CONFIG_HOME/zlog/config.toml`, when a config directory can be resolved.
pub fn user_config_file() -> Option<PathBuf> {
	dirs::config_dir().map(|d| d.join("zlog").join("config.toml"))
}

/// Partial configuration layer - all fields are Option for merging.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
	#[serde(default)]
	pub crash: Option<CrashLayer>,
	#[serde(default)]
	pub logging: Option<LoggingLayer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrashLayer {
	#[serde(default)]
	pub notice_message: Option<String>,
	#[serde(default)]
	pub persist_reports: Option<bool>,
	#[serde(default)]
	pub report_dir: Option<PathBuf>,
	#[serde(default)]
	pub max_reports: Option<usize>,
	#[serde(default)]
	pub suppress_default_handler: Option<bool>,
	#[serde(default)]
	pub grace_period_ms: Option<u64>,
	#[serde(default)]
	pub max_cause_depth: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingLayer {
	#[serde(default)]
	pub level: Option<String>,
}

impl ConfigLayer {
	/// Merge `other` on top of `self`; set fields in `other` win.
	pub fn merge(&mut self, other: ConfigLayer) {
		if let Some(theirs) = other.crash {
			let ours = self.crash.get_or_insert_with(CrashLayer::default);
			merge_opt(&mut ours.notice_message, theirs.notice_message);
			merge_opt(&mut ours.persist_reports, theirs.persist_reports);
			merge_opt(&mut ours.report_dir, theirs.report_dir);
			merge_opt(&mut ours.max_reports, theirs.max_reports);
			merge_opt(&mut ours.suppress_default_handler, theirs.suppress_default_handler);
			merge_opt(&mut ours.grace_period_ms, theirs.grace_period_ms);
			merge_opt(&mut ours.max_cause_depth, theirs.max_cause_depth);
		}
		if let Some(theirs) = other.logging {
			let ours = self.logging.get_or_insert_with(LoggingLayer::default);
			merge_opt(&mut ours.level, theirs.level);
		}
	}

	fn crash_mut(&mut self) -> &mut CrashLayer {
		self.crash.get_or_insert_with(CrashLayer::default)
	}
}

fn merge_opt<T>(ours: &mut Option<T>, theirs: Option<T>) {
	if theirs.is_some() {
		*ours = theirs;
	}
}

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	UserFile = 30,
	ExplicitFile = 40,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	/// Name for logging
	fn name(&self) -> &'static str;

	/// Precedence level
	fn precedence(&self) -> Precedence;

	/// Load configuration layer from this source
	fn load(&self) -> Result<ConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		// Defaults are applied in ReporterConfig::from_layer
		Ok(ConfigLayer::default())
	}
}

/// File-based configuration source (TOML).
pub struct FileSource {
	path: PathBuf,
	precedence: Precedence,
	name: &'static str,
}

impl FileSource {
	/// User config: ~/.config/zlog/config.toml
	pub fn user() -> Option<Self> {
		user_config_file().map(|path| Self {
			path,
			precedence: Precedence::UserFile,
			name: "user-config",
		})
	}

	/// A file named explicitly by the caller.
	pub fn explicit(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			precedence: Precedence::ExplicitFile,
			name: "explicit-config",
		}
	}
}

impl ConfigSource for FileSource {
	fn name(&self) -> &'static str {
		self.name
	}

	fn precedence(&self) -> Precedence {
		self.precedence
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), source = self.name, "config file not found, skipping");
			return Ok(ConfigLayer::default());
		}

		debug!(path = %self.path.display(), source = self.name, "loading config file");

		let content = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
			path: self.path.clone(),
			source,
		})?;
		let layer: ConfigLayer = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
			path: self.path.clone(),
			source: e,
		})?;

		trace!(source = self.name, "parsed config layer");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: `ZLOG_CRASH_<FIELD>` for the `[crash]` table and
/// `ZLOG_LOG_LEVEL` for logging.
pub struct EnvSource {
	vars: Vec<(String, String)>,
}

impl EnvSource {
	/// Snapshot the process environment.
	pub fn from_env() -> Self {
		Self::from_vars(std::env::vars())
	}

	pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
		Self {
			vars: vars
				.into_iter()
				.filter(|(k, _)| k.starts_with("ZLOG_"))
				.collect(),
		}
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		debug!("loading environment variables");
		let mut layer = ConfigLayer::default();

		for (key, value) in &self.vars {
			let value = value.trim();
			if value.is_empty() {
				continue;
			}

			trace!(key = %key, "processing env var");

			match key.as_str() {
				"ZLOG_CRASH_NOTICE_MESSAGE" => {
					layer.crash_mut().notice_message = Some(value.to_string());
				}
				"ZLOG_CRASH_PERSIST_REPORTS" => {
					layer.crash_mut().persist_reports = Some(parse_bool(key, value)?);
				}
				"ZLOG_CRASH_REPORT_DIR" => {
					layer.crash_mut().report_dir = Some(PathBuf::from(value));
				}
				"ZLOG_CRASH_MAX_REPORTS" => {
					layer.crash_mut().max_reports = Some(parse_number(key, value)?);
				}
				"ZLOG_CRASH_SUPPRESS_DEFAULT_HANDLER" => {
					layer.crash_mut().suppress_default_handler = Some(parse_bool(key, value)?);
				}
				"ZLOG_CRASH_GRACE_PERIOD_MS" => {
					layer.crash_mut().grace_period_ms = Some(parse_number(key, value)?);
				}
				"ZLOG_CRASH_MAX_CAUSE_DEPTH" => {
					layer.crash_mut().max_cause_depth = Some(parse_number(key, value)?);
				}
				"ZLOG_LOG_LEVEL" => {
					layer
						.logging
						.get_or_insert_with(LoggingLayer::default)
						.level = Some(value.to_string());
				}
				_ => trace!(key = %key, "ignoring unknown env var"),
			}
		}

		Ok(layer)
	}
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
	match value.to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(ConfigError::invalid_value(key, format!("expected a boolean, got {value:?}"))),
	}
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
	value
		.parse()
		.map_err(|_| ConfigError::invalid_value(key, format!("expected a number, got {value:?}")))
}

/// Merge the given sources by precedence, finalize and validate.
pub fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ReporterConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ConfigLayer::default();
	for source in &sources {
		debug!(source = source.name(), precedence = ?source.precedence(), "merging config layer");
		merged.merge(source.load()?);
	}

	let config = ReporterConfig::from_layer(merged);
	config.validate()?;

	info!(
		persist_reports = config.persist_reports,
		report_dir = ?config.report_dir,
		suppress_default_handler = config.suppress_default_handler,
		"crash reporter configuration loaded"
	);

	Ok(config)
}

/// Load configuration from defaults, the user file, an optional explicit file
/// and the environment.
pub fn load_config(explicit: Option<&Path>) -> Result<ReporterConfig, ConfigError> {
	let mut sources: Vec<Box<dyn ConfigSource>> = vec![Box::new(DefaultsSource)];
	if let Some(user) = FileSource::user() {
		sources.push(Box::new(user));
	}
	if let Some(path) = explicit {
		sources.push(Box::new(FileSource::explicit(path)));
	}
	sources.push(Box::new(EnvSource::from_env()));

	load_from_sources(sources)
}
