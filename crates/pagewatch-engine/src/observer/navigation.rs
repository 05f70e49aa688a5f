use super::{ObserverContext, lock};
use pagewatch_common::protocol::{EventKind, PageUrl};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

struct Inner {
    ctx: ObserverContext,
    current: Mutex<String>,
    active: AtomicBool,
}

/// Detects location changes that happen without a full reload by comparing
/// the document location on every mutation.
#[derive(Clone)]
pub struct NavigationObserver {
    inner: Arc<Inner>,
}

impl NavigationObserver {
    pub fn install(ctx: &ObserverContext) -> Self {
        Self {
            inner: Arc::new(Inner {
                current: Mutex::new(ctx.document.location()),
                ctx: ctx.clone(),
                active: AtomicBool::new(true),
            }),
        }
    }

    pub fn current(&self) -> String {
        lock(&self.inner.current).clone()
    }

    pub fn on_mutation(&self) {
        if !self.inner.active.load(Ordering::SeqCst) {
            return;
        }
        let location = self.inner.ctx.document.location();
        {
            let mut current = lock(&self.inner.current);
            if *current == location {
                return;
            }
            *current = location.clone();
        }
        tracing::debug!("Location changed to {}", location);
        self.inner
            .ctx
            .publisher
            .publish(EventKind::UrlChanged, &PageUrl { url: location });
    }

    pub fn shutdown(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
    }
}
