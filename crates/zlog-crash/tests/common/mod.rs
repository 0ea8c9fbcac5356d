// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#![allow(dead_code)]

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// One captured log event.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
	pub target: String,
	pub message: String,
	pub fields: Vec<(String, String)>,
}

/// Layer that records every event into a shared buffer.
#[derive(Clone, Default)]
pub struct CaptureLayer {
	events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CaptureLayer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn events(&self) -> Vec<CapturedEvent> {
		self.events.lock().unwrap().clone()
	}

	pub fn for_target(&self, target: &str) -> Vec<CapturedEvent> {
		self.events()
			.into_iter()
			.filter(|e| e.target == target)
			.collect()
	}
}

impl<S> Layer<S> for CaptureLayer
where
	S: Subscriber + for<'a> LookupSpan<'a>,
{
	fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
		let mut visitor = CaptureVisitor::default();
		event.record(&mut visitor);

		self.events.lock().unwrap().push(CapturedEvent {
			target: event.metadata().target().to_string(),
			message: visitor.message.unwrap_or_default(),
			fields: visitor.fields,
		});
	}
}

#[derive(Default)]
struct CaptureVisitor {
	message: Option<String>,
	fields: Vec<(String, String)>,
}

impl CaptureVisitor {
	fn push(&mut self, field: &Field, value: String) {
		if field.name() == "message" {
			self.message = Some(value);
		} else {
			self.fields.push((field.name().to_string(), value));
		}
	}
}

impl Visit for CaptureVisitor {
	fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
		self.push(field, format!("{value:?}"));
	}

	fn record_str(&mut self, field: &Field, value: &str) {
		self.push(field, value.to_string());
	}
}
