// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! zlog command line driver.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zlog_crash::{
	Crash, CrashInterceptor, NotificationReceiver, Notifier, PackageInfo, ReportId, ReportStore,
	ReporterConfig, SystemMetadata, ThreadInfo,
};

/// zlog - crash interceptor driver
#[derive(Parser, Debug)]
#[command(name = "zlog", version, about, long_about = None)]
struct Args {
	/// Path to custom configuration file
	#[arg(short, long, env = "ZLOG_CONFIG")]
	config: Option<PathBuf>,

	/// Log level (overrides config)
	#[arg(short, long)]
	log_level: Option<String>,

	/// Output logs as JSON
	#[arg(long)]
	json_logs: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Install the interceptor and wait for Ctrl-C, printing crash notices
	Run,
	/// Panic on a worker thread
	Panic {
		/// Panic message
		#[arg(long, short, default_value = "boom")]
		message: String,
		/// Name of the panicking thread
		#[arg(long, default_value = "worker")]
		thread: String,
	},
	/// Report a fatal error with a cause chain
	Error {
		/// Top level error message
		#[arg(long, short)]
		message: String,
		/// Causes, outermost first (repeatable)
		#[arg(long = "cause", short = 'c')]
		causes: Vec<String>,
	},
	/// Inspect persisted crash reports
	#[command(subcommand)]
	Reports(ReportsCommand),
}

#[derive(Subcommand, Debug)]
enum ReportsCommand {
	/// List stored reports, oldest first
	List {
		/// Output as JSON
		#[arg(long)]
		json: bool,
	},
	/// Print a stored report
	Show {
		/// Report ID
		id: ReportId,
	},
	/// Delete the oldest reports
	Prune {
		/// Number of reports to keep (defaults to the configured maximum)
		#[arg(long)]
		keep: Option<usize>,
	},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	let config = zlog_crash::load_config(args.config.as_deref()).context("failed to load configuration")?;
	init_tracing(&config, args.log_level.as_deref(), args.json_logs);

	match args.command {
		Command::Run => run(config).await,
		Command::Panic { message, thread } => panic_on_worker(config, message, thread),
		Command::Error { message, causes } => report_error(config, message, causes),
		Command::Reports(command) => reports(&config, command),
	}
}

fn init_tracing(config: &ReporterConfig, log_level: Option<&str>, json: bool) {
	let filter = match log_level {
		Some(level) => tracing_subscriber::EnvFilter::new(level),
		None => tracing_subscriber::EnvFilter::try_from_default_env()
			.unwrap_or_else(|_| config.log_level.clone().into()),
	};

	tracing_subscriber::registry()
		.with(filter)
		.with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
		.with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
		.init();
}

fn install(config: ReporterConfig) -> anyhow::Result<(CrashInterceptor, NotificationReceiver)> {
	let (notifier, notices) = Notifier::channel();
	let interceptor = zlog_crash::install(
		CrashInterceptor::builder()
			.config(config)
			.metadata(Arc::new(SystemMetadata::new(package_info())))
			.notifier(notifier),
	)?;
	Ok((interceptor, notices))
}

fn package_info() -> PackageInfo {
	let part = |s: &str| s.parse::<u64>().unwrap_or(0);
	let version_code = part(env!("CARGO_PKG_VERSION_MAJOR")) * 10_000
		+ part(env!("CARGO_PKG_VERSION_MINOR")) * 100
		+ part(env!("CARGO_PKG_VERSION_PATCH"));
	PackageInfo::new(
		env!("CARGO_PKG_NAME"),
		Some(env!("CARGO_PKG_VERSION").to_string()),
		version_code,
	)
}

fn drain_notices(notices: &mut NotificationReceiver) {
	while let Ok(notice) = notices.try_recv() {
		eprintln!("{}", notice.message);
	}
}

async fn run(config: ReporterConfig) -> anyhow::Result<()> {
	let (_interceptor, mut notices) = install(config)?;
	tracing::info!("crash interceptor running, press Ctrl-C to exit");

	let notice_task = tokio::spawn(async move {
		while let Some(notice) = notices.recv().await {
			eprintln!("{}", notice.message);
		}
	});

	tokio::signal::ctrl_c().await?;
	notice_task.abort();
	Ok(())
}

fn panic_on_worker(config: ReporterConfig, message: String, name: String) -> anyhow::Result<()> {
	let (_interceptor, mut notices) = install(config)?;

	let result = thread::Builder::new()
		.name(name.clone())
		.spawn(move || panic!("{message}"))?
		.join();
	drain_notices(&mut notices);

	match result {
		Ok(()) => Ok(()),
		Err(_) => bail!("thread '{name}' crashed"),
	}
}

fn report_error(config: ReporterConfig, message: String, causes: Vec<String>) -> anyhow::Result<()> {
	let (interceptor, mut notices) = install(config)?;

	let mut chain = causes.into_iter().rev();
	let error = match chain.next() {
		Some(root) => chain
			.fold(anyhow!(root), |err, cause| err.context(cause))
			.context(message),
		None => anyhow!(message),
	};

	{
		let source: &(dyn Error + 'static) = error.as_ref();
		let crash = Crash::from_error(source);
		interceptor.on_uncaught_exception(&ThreadInfo::current(), &crash);
	}
	drain_notices(&mut notices);

	Err(error)
}

fn reports(config: &ReporterConfig, command: ReportsCommand) -> anyhow::Result<()> {
	let Some(dir) = config.effective_report_dir() else {
		bail!("crash reports are not persisted (set crash.persist_reports and crash.report_dir)");
	};
	let store = ReportStore::open(dir)?;

	match command {
		ReportsCommand::List { json } => {
			let ids = store.list()?;
			if json {
				let entries: Vec<_> = ids
					.iter()
					.map(|id| {
						serde_json::json!({
							"id": id,
							"created_at": id.timestamp(),
							"path": store.path_for(*id),
						})
					})
					.collect();
				println!("{}", serde_json::to_string_pretty(&entries)?);
			} else if ids.is_empty() {
				println!("No crash reports in {}", store.dir().display());
			} else {
				for id in ids {
					let created = id
						.timestamp()
						.map(|t| t.to_rfc3339())
						.unwrap_or_else(|| "-".to_string());
					println!("{id}  {created}  {}", store.path_for(id).display());
				}
			}
		}
		ReportsCommand::Show { id } => {
			print!("{}", store.load(id)?);
		}
		ReportsCommand::Prune { keep } => {
			let removed = store.prune(keep.unwrap_or(config.max_reports))?;
			println!("Removed {removed} crash report(s)");
		}
	}

	Ok(())
}
