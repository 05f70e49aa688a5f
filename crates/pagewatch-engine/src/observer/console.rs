//! Console capture with a debounced batch flush.

use super::{ObserverContext, lock};
use crate::scheduler::TimerId;
use pagewatch_common::protocol::{ConsoleOutputData, ConsoleRecord, ConsoleSeverity, EventKind, iso_timestamp};
use pagewatch_common::value::HostValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// The intercepted logging entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsoleLevel {
    Log,
    Warn,
    Error,
}

impl ConsoleLevel {
    pub fn severity(&self) -> ConsoleSeverity {
        match self {
            ConsoleLevel::Log => ConsoleSeverity::Info,
            ConsoleLevel::Warn => ConsoleSeverity::Warning,
            ConsoleLevel::Error => ConsoleSeverity::Error,
        }
    }
}

/// A logging surface that can be wrapped.
pub trait ConsoleSink: Send + Sync {
    fn log(&self, level: ConsoleLevel, args: &[HostValue]);
}

/// Forwards page console output to `tracing` under the `page_console` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingConsole;

impl ConsoleSink for TracingConsole {
    fn log(&self, level: ConsoleLevel, args: &[HostValue]) {
        let line = args
            .iter()
            .map(HostValue::display_string)
            .collect::<Vec<_>>()
            .join(" ");
        match level {
            ConsoleLevel::Log => tracing::info!(target: "page_console", "{}", line),
            ConsoleLevel::Warn => tracing::warn!(target: "page_console", "{}", line),
            ConsoleLevel::Error => tracing::error!(target: "page_console", "{}", line),
        }
    }
}

#[derive(Default)]
struct Buffer {
    records: Vec<ConsoleRecord>,
    flush_timer: Option<TimerId>,
}

struct Inner {
    ctx: ObserverContext,
    buffer: Mutex<Buffer>,
    active: AtomicBool,
}

#[derive(Clone)]
pub struct ConsoleObserver {
    inner: Arc<Inner>,
}

impl ConsoleObserver {
    pub fn install(ctx: &ObserverContext) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx: ctx.clone(),
                buffer: Mutex::new(Buffer::default()),
                active: AtomicBool::new(true),
            }),
        }
    }

    /// Wraps `sink` so every call is forwarded first and then captured.
    pub fn wrap<C: ConsoleSink>(&self, sink: C) -> InstrumentedConsole<C> {
        InstrumentedConsole {
            inner: sink,
            observer: self.clone(),
        }
    }

    /// Buffers one console call and arms the flush timer if none is pending.
    pub fn record(&self, level: ConsoleLevel, args: &[HostValue]) {
        if !self.inner.active.load(Ordering::SeqCst) {
            return;
        }
        let ctx = &self.inner.ctx;

        let raw: Vec<serde_json::Value> = args.iter().map(|a| ctx.serializer.serialize(a)).collect();
        let text = args
            .iter()
            .zip(&raw)
            .map(|(arg, serialized)| match arg {
                HostValue::String(s) => s.clone(),
                _ => serde_json::to_string_pretty(serialized).unwrap_or_default(),
            })
            .collect::<Vec<_>>()
            .join(" ");

        let record = ConsoleRecord {
            level: level.severity(),
            message: ctx.serializer.cap(&text),
            logged_at: iso_timestamp(ctx.clock.now()),
            raw,
        };

        let mut buffer = lock(&self.inner.buffer);
        buffer.records.push(record);
        if buffer.flush_timer.is_none() {
            let weak = Arc::downgrade(&self.inner);
            let timer = ctx.scheduler.schedule(
                ctx.config.debounce(),
                Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        ConsoleObserver { inner }.flush();
                    }
                }),
            );
            buffer.flush_timer = Some(timer);
        }
    }

    /// Publishes everything buffered as one batch and clears the buffer.
    pub fn flush(&self) {
        let records = {
            let mut buffer = lock(&self.inner.buffer);
            if let Some(timer) = buffer.flush_timer.take() {
                self.inner.ctx.scheduler.cancel(timer);
            }
            std::mem::take(&mut buffer.records)
        };
        if records.is_empty() {
            return;
        }
        debug!("Flushing {} console records", records.len());
        self.inner.ctx.publisher.publish(
            EventKind::ConsoleOutput,
            &ConsoleOutputData { messages: records },
        );
    }

    pub fn buffered(&self) -> usize {
        lock(&self.inner.buffer).records.len()
    }

    pub fn flush_pending(&self) -> bool {
        lock(&self.inner.buffer).flush_timer.is_some()
    }

    /// Stops capturing and discards the pending batch.
    pub fn shutdown(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
        let mut buffer = lock(&self.inner.buffer);
        if let Some(timer) = buffer.flush_timer.take() {
            self.inner.ctx.scheduler.cancel(timer);
        }
        buffer.records.clear();
    }
}

/// A console whose calls are forwarded unchanged and then captured.
pub struct InstrumentedConsole<C> {
    inner: C,
    observer: ConsoleObserver,
}

impl<C> InstrumentedConsole<C> {
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: ConsoleSink> ConsoleSink for InstrumentedConsole<C> {
    fn log(&self, level: ConsoleLevel, args: &[HostValue]) {
        self.inner.log(level, args);
        self.observer.record(level, args);
    }
}
