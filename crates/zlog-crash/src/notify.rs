// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fire-and-forget crash notices for the UI layer.
//!
//! The crashing thread can't wait on the UI, so a notice is a plain channel
//! send. Nobody acknowledges it; if the process exits before the UI drains
//! the channel, the notice is lost.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::debug;

/// A short, fixed message to show the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashNotice {
	pub message: String,
	pub raised_at: DateTime<Utc>,
}

/// Receiving end, owned by the UI layer.
pub type NotificationReceiver = mpsc::UnboundedReceiver<CrashNotice>;

/// Sending end held by the interceptor.
#[derive(Debug, Clone)]
pub struct Notifier {
	tx: Option<mpsc::UnboundedSender<CrashNotice>>,
}

impl Notifier {
	/// Create a connected notifier and the receiver the UI should drain.
	pub fn channel() -> (Self, NotificationReceiver) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Self { tx: Some(tx) }, rx)
	}

	/// A notifier that drops every notice.
	pub fn disabled() -> Self {
		Self { tx: None }
	}

	/// Queue a notice without blocking. Returns whether it was queued.
	pub fn notify(&self, message: &str) -> bool {
		let Some(tx) = &self.tx else {
			return false;
		};

		let notice = CrashNotice {
			message: message.to_string(),
			raised_at: Utc::now(),
		};
		match tx.send(notice) {
			Ok(()) => true,
			Err(_) => {
				debug!("crash notice receiver closed, dropping notice");
				false
			}
		}
	}
}

impl Default for Notifier {
	fn default() -> Self {
		Self::disabled()
	}
}
