//! Uncaught errors and unhandled rejections, deduplicated per key for a window.

use super::content::is_blank_screen;
use super::{ObserverContext, lock};
use crate::scheduler::TimerId;
use pagewatch_common::protocol::{EventKind, RejectionData, RuntimeErrorData};
use pagewatch_common::value::HostValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

const DEFAULT_REJECTION_MESSAGE: &str = "Unhandled promise rejection";

/// An uncaught synchronous error as reported by the host.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub message: String,
    pub filename: String,
    pub lineno: u32,
    pub colno: u32,
    /// The thrown value, when the host exposes it.
    pub error: Option<HostValue>,
}

impl ErrorEvent {
    fn cache_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.message, self.filename, self.lineno, self.colno
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Keyspace {
    Errors,
    Rejections,
}

#[derive(Default)]
struct DedupCache {
    entries: HashMap<(Keyspace, String), TimerId>,
}

struct Inner {
    ctx: ObserverContext,
    cache: Mutex<DedupCache>,
    active: AtomicBool,
}

#[derive(Clone)]
pub struct ErrorObserver {
    inner: Arc<Inner>,
}

impl ErrorObserver {
    pub fn install(ctx: &ObserverContext) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx: ctx.clone(),
                cache: Mutex::new(DedupCache::default()),
                active: AtomicBool::new(true),
            }),
        }
    }

    pub fn report_error(&self, event: ErrorEvent) {
        if !self.inner.active.load(Ordering::SeqCst) {
            return;
        }
        if !self.claim(Keyspace::Errors, event.cache_key()) {
            debug!("Suppressing duplicate runtime error: {}", event.message);
            return;
        }

        let ctx = &self.inner.ctx;
        let data = RuntimeErrorData {
            stack: event.error.as_ref().and_then(|e| e.string_property("stack")),
            blank_screen: is_blank_screen(ctx.document.as_ref(), &ctx.config.blank_screen_root_id),
            message: event.message,
            filename: event.filename,
            lineno: event.lineno,
            colno: event.colno,
        };
        ctx.publisher.publish(EventKind::RuntimeError, &data);
    }

    pub fn report_rejection(&self, reason: &HostValue) {
        if !self.inner.active.load(Ordering::SeqCst) {
            return;
        }
        let stack = reason
            .string_property("stack")
            .unwrap_or_else(|| reason.display_string());
        if !self.claim(Keyspace::Rejections, stack.clone()) {
            debug!("Suppressing duplicate rejection");
            return;
        }

        let data = RejectionData {
            message: reason
                .string_property("message")
                .unwrap_or_else(|| DEFAULT_REJECTION_MESSAGE.to_string()),
            stack,
        };
        self.inner
            .ctx
            .publisher
            .publish(EventKind::UnhandledPromiseRejection, &data);
    }

    /// Number of keys currently suppressed.
    pub fn cached(&self) -> usize {
        lock(&self.inner.cache).entries.len()
    }

    /// Stops reporting and drops pending evictions.
    pub fn shutdown(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
        let entries = std::mem::take(&mut lock(&self.inner.cache).entries);
        for (_, timer) in entries {
            self.inner.ctx.scheduler.cancel(timer);
        }
    }

    /// Returns false when the key is already cached; otherwise caches it and
    /// schedules its eviction.
    fn claim(&self, space: Keyspace, key: String) -> bool {
        let mut cache = lock(&self.inner.cache);
        let entry = (space, key);
        if cache.entries.contains_key(&entry) {
            return false;
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let evicted = entry.clone();
        let timer = self.inner.ctx.scheduler.schedule(
            self.inner.ctx.config.dedup_window(),
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    lock(&inner.cache).entries.remove(&evicted);
                }
            }),
        );
        cache.entries.insert(entry, timer);
        true
    }
}
