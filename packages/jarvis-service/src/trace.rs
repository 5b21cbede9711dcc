//! Request tracing facade.
//!
//! A [`RequestTrace`] is opened once per chat request and hands out [`SpanGuard`]s for every
//! external call. Guards close exactly once: explicitly through [`SpanGuard::end`] or
//! [`SpanGuard::fail`], or from `Drop` with a `cancelled` status when the owning future is dropped
//! or unwinds. Sinks only buffer; [`flush`] is the single suspension point.

pub mod langfuse;

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{BoxFuture, Error, Stage};

pub const CANCELLED: &str = "cancelled";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Level {
	Default,
	Warning,
	Error,
}

#[derive(Clone, Debug)]
pub struct SpanOpen {
	pub trace_id: Uuid,
	pub span_id: Uuid,
	pub name: &'static str,
	pub start_time: OffsetDateTime,
	pub input: Value,
}

#[derive(Clone, Debug)]
pub struct SpanClose {
	pub trace_id: Uuid,
	pub span_id: Uuid,
	pub name: &'static str,
	pub end_time: OffsetDateTime,
	pub output: Value,
	pub metadata: Map<String, Value>,
	pub level: Level,
	pub status_message: Option<String>,
}

#[derive(Clone, Debug)]
pub struct TraceRecord {
	pub trace_id: Uuid,
	pub name: &'static str,
	pub timestamp: OffsetDateTime,
	pub input: Value,
	pub output: Value,
	pub metadata: Map<String, Value>,
	pub tags: Vec<String>,
}

/// Backend that receives span and trace events.
///
/// `open_span`, `close_span` and `record_trace` must not block; implementations buffer and ship
/// on `flush`.
pub trait TraceSink
where
	Self: Send + Sync,
{
	fn open_span(&self, span: SpanOpen);

	fn close_span(&self, span: SpanClose);

	fn record_trace(&self, trace: TraceRecord);

	fn flush<'a>(&'a self) -> BoxFuture<'a, jarvis_providers::Result<()>>;
}

/// Sink used when request tracing is disabled. Span lifecycle only reaches the process log.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTraceSink;
impl TraceSink for NoopTraceSink {
	fn open_span(&self, span: SpanOpen) {
		tracing::debug!(trace_id = %span.trace_id, span = span.name, "Span opened.");
	}

	fn close_span(&self, span: SpanClose) {
		tracing::debug!(
			trace_id = %span.trace_id,
			span = span.name,
			level = ?span.level,
			status = span.status_message.as_deref().unwrap_or("ok"),
			"Span closed."
		);
	}

	fn record_trace(&self, trace: TraceRecord) {
		tracing::debug!(trace_id = %trace.trace_id, trace = trace.name, "Trace recorded.");
	}

	fn flush<'a>(&'a self) -> BoxFuture<'a, jarvis_providers::Result<()>> {
		Box::pin(async { Ok(()) })
	}
}

pub fn sink_from_config(cfg: &jarvis_config::Langfuse) -> Arc<dyn TraceSink> {
	if cfg.enabled {
		Arc::new(langfuse::LangfuseTraceSink::new(cfg.clone()))
	} else {
		Arc::new(NoopTraceSink)
	}
}

/// Flushes `sink`, logging instead of returning any failure.
pub async fn flush(sink: &dyn TraceSink, trace_id: Uuid) {
	if let Err(err) = sink.flush().await {
		tracing::error!(trace_id = %trace_id, error = %err, "Trace flush failed.");
	}
}

pub struct RequestTrace {
	sink: Arc<dyn TraceSink>,
	trace_id: Uuid,
	name: &'static str,
	started_at: OffsetDateTime,
	input: Value,
	metadata: Map<String, Value>,
	tags: Vec<String>,
	finished: bool,
}
impl RequestTrace {
	pub fn start(
		sink: Arc<dyn TraceSink>,
		name: &'static str,
		input: Value,
		tags: &[&str],
	) -> Self {
		Self {
			sink,
			trace_id: Uuid::new_v4(),
			name,
			started_at: OffsetDateTime::now_utc(),
			input,
			metadata: Map::new(),
			tags: tags.iter().map(|tag| (*tag).to_string()).collect(),
			finished: false,
		}
	}

	pub fn id(&self) -> Uuid {
		self.trace_id
	}

	pub fn span(&self, name: &'static str, input: Value) -> SpanGuard {
		let span_id = Uuid::new_v4();

		self.sink.open_span(SpanOpen {
			trace_id: self.trace_id,
			span_id,
			name,
			start_time: OffsetDateTime::now_utc(),
			input,
		});

		SpanGuard {
			sink: self.sink.clone(),
			trace_id: self.trace_id,
			span_id,
			name,
			metadata: Map::new(),
			closed: false,
		}
	}

	pub fn set_metadata(&mut self, key: &str, value: impl Into<Value>) {
		self.metadata.insert(key.to_string(), value.into());
	}

	/// Records that `stage` failed but the request carried on.
	pub fn mark_degraded(&mut self, stage: Stage, error: &Error) {
		self.set_metadata("degraded_stage", stage.as_str());
		self.set_metadata("degraded_error", error.kind());
	}

	/// Records the trace-level output. Flushing is left to the caller.
	pub fn finish(mut self, output: Value) {
		self.record(output);
	}

	fn record(&mut self, output: Value) {
		self.finished = true;
		self.sink.record_trace(TraceRecord {
			trace_id: self.trace_id,
			name: self.name,
			timestamp: self.started_at,
			input: std::mem::take(&mut self.input),
			output,
			metadata: std::mem::take(&mut self.metadata),
			tags: std::mem::take(&mut self.tags),
		});
	}
}
impl Drop for RequestTrace {
	fn drop(&mut self) {
		if !self.finished {
			self.set_metadata("status", CANCELLED);
			self.record(Value::Null);
		}
	}
}

pub struct SpanGuard {
	sink: Arc<dyn TraceSink>,
	trace_id: Uuid,
	span_id: Uuid,
	name: &'static str,
	metadata: Map<String, Value>,
	closed: bool,
}
impl SpanGuard {
	pub fn id(&self) -> Uuid {
		self.span_id
	}

	pub fn set_metadata(&mut self, key: &str, value: impl Into<Value>) {
		self.metadata.insert(key.to_string(), value.into());
	}

	pub fn end(mut self, output: Value) {
		self.close(output, Level::Default, None);
	}

	pub fn fail(mut self, stage: Stage, error: &Error) {
		self.set_metadata("stage", stage.as_str());
		self.set_metadata("error_kind", error.kind());
		self.close(Value::Null, Level::Error, Some(error.to_string()));
	}

	fn close(&mut self, output: Value, level: Level, status_message: Option<String>) {
		if self.closed {
			return;
		}

		self.closed = true;
		self.sink.close_span(SpanClose {
			trace_id: self.trace_id,
			span_id: self.span_id,
			name: self.name,
			end_time: OffsetDateTime::now_utc(),
			output,
			metadata: std::mem::take(&mut self.metadata),
			level,
			status_message,
		});
	}
}
impl Drop for SpanGuard {
	fn drop(&mut self) {
		self.close(Value::Null, Level::Error, Some(CANCELLED.to_string()));
	}
}
