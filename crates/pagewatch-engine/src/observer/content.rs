//! Content-readiness and blank-screen detection.
//!
//! Readiness is re-evaluated at install, once after a short delay, on every
//! DOM mutation, and by a bounded fallback poll. Only the mutation path reports
//! regressions (`BLANK_SCREEN_DETECTED`) and advances the remembered state; timer
//! checks compare against the last state a mutation saw.

use super::{ObserverContext, lock};
use crate::host::Document;
use crate::scheduler::TimerId;
use pagewatch_common::dom::Element;
use pagewatch_common::protocol::{ContentState, EventKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

/// Decides whether the root content container has been populated by the UI
/// framework. Hosts supply their own for non-default tooling.
pub trait ReadinessProbe: Send + Sync {
    /// False while a hot-reload cycle is still in flight.
    fn reload_settled(&self, document: &dyn Document) -> bool;

    /// True when `root` shows signs of framework rendering.
    fn framework_ready(&self, root: &Element) -> bool;
}

/// Default probe: marker attributes anywhere below the root, or non-blank text.
#[derive(Debug, Clone)]
pub struct MarkupReadiness {
    markers: Vec<String>,
}

impl MarkupReadiness {
    pub fn new(markers: Vec<String>) -> Self {
        Self { markers }
    }
}

impl ReadinessProbe for MarkupReadiness {
    fn reload_settled(&self, document: &dyn Document) -> bool {
        !document.hot_reload_pending()
    }

    fn framework_ready(&self, root: &Element) -> bool {
        if root.child_element_count() == 0 {
            return false;
        }
        let marked = root
            .descendants()
            .any(|el| self.markers.iter().any(|m| el.has_attribute(m)));
        marked || !root.text_content().trim().is_empty()
    }
}

/// Finds the main content container: exact `id="root"`, then an id containing
/// `root`, then a class containing `root`, then the first child of `<body>`.
pub fn locate_root(html: &Element) -> Option<&Element> {
    let id_contains = |el: &Element| el.id.as_deref().is_some_and(|id| id.contains("root"));
    let class_contains = |el: &Element| {
        el.class_name
            .as_deref()
            .is_some_and(|class| class.contains("root"))
    };

    html.find(|el| el.id.as_deref() == Some("root"))
        .or_else(|| html.find(id_contains))
        .or_else(|| html.find(class_contains))
        .or_else(|| {
            html.find(|el| el.tag == "body")
                .and_then(|body| body.children.first())
        })
}

/// True when a `div` with the given id exists and has no child elements.
pub fn is_blank_screen(document: &dyn Document, root_id: &str) -> bool {
    document
        .document_element()
        .as_ref()
        .and_then(|html| html.find(|el| el.tag == "div" && el.id.as_deref() == Some(root_id)))
        .is_some_and(|root| root.child_element_count() == 0)
}

pub fn evaluate(document: &dyn Document, probe: &dyn ReadinessProbe) -> ContentState {
    let html = document.document_element();
    let root = html.as_ref().and_then(locate_root);

    let root_element_exists = root.is_some();
    let root_has_children = root.is_some_and(|r| r.child_element_count() > 0);
    let hmr_complete = probe.reload_settled(document);
    let react_ready = root_has_children && root.is_some_and(|r| probe.framework_ready(r));

    ContentState {
        has_content: root_element_exists && root_has_children && hmr_complete && react_ready,
        root_element_exists,
        root_has_children,
        hmr_complete,
        react_ready,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Install,
    Delayed,
    Mutation,
    Poll,
}

struct Tracker {
    last: ContentState,
    notified: bool,
    attempts: u32,
    poll_timer: Option<TimerId>,
    delay_timer: Option<TimerId>,
}

struct Inner {
    ctx: ObserverContext,
    probe: Arc<dyn ReadinessProbe>,
    tracker: Mutex<Tracker>,
    active: AtomicBool,
}

#[derive(Clone)]
pub struct ContentObserver {
    inner: Arc<Inner>,
}

impl ContentObserver {
    /// Evaluates immediately, then arms the delayed check and the fallback poll.
    pub fn install(ctx: &ObserverContext, probe: Arc<dyn ReadinessProbe>) -> Self {
        let last = evaluate(ctx.document.as_ref(), probe.as_ref());
        let observer = Self {
            inner: Arc::new(Inner {
                ctx: ctx.clone(),
                probe,
                tracker: Mutex::new(Tracker {
                    last,
                    notified: false,
                    attempts: 0,
                    poll_timer: None,
                    delay_timer: None,
                }),
                active: AtomicBool::new(true),
            }),
        };

        observer.check(Trigger::Install);

        let weak = Arc::downgrade(&observer.inner);
        let delay_timer = ctx.scheduler.schedule(
            ctx.config.initial_check_delay(),
            Box::new(move || {
                if let Some(observer) = Self::upgrade(&weak) {
                    lock(&observer.inner.tracker).delay_timer = None;
                    observer.check(Trigger::Delayed);
                }
            }),
        );
        lock(&observer.inner.tracker).delay_timer = Some(delay_timer);

        if ctx.config.poll_budget > 0 {
            observer.arm_poll();
        }
        observer
    }

    fn upgrade(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn on_mutation(&self) {
        self.check(Trigger::Mutation);
    }

    pub fn state(&self) -> ContentState {
        lock(&self.inner.tracker).last
    }

    pub fn notified(&self) -> bool {
        lock(&self.inner.tracker).notified
    }

    pub fn poll_attempts(&self) -> u32 {
        lock(&self.inner.tracker).attempts
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.inner.tracker).poll_timer.is_some()
    }

    pub fn shutdown(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
        let mut tracker = lock(&self.inner.tracker);
        for timer in [tracker.poll_timer.take(), tracker.delay_timer.take()]
            .into_iter()
            .flatten()
        {
            self.inner.ctx.scheduler.cancel(timer);
        }
    }

    fn check(&self, trigger: Trigger) {
        if !self.inner.active.load(Ordering::SeqCst) {
            return;
        }
        let ctx = &self.inner.ctx;
        let current = evaluate(ctx.document.as_ref(), self.inner.probe.as_ref());

        let mut events = Vec::new();
        {
            let mut tracker = lock(&self.inner.tracker);
            if current.has_content && !tracker.notified {
                events.push(EventKind::ContentLoaded);
                tracker.notified = true;
            }
            if trigger == Trigger::Mutation && !current.has_content && tracker.last.has_content {
                events.push(EventKind::BlankScreenDetected);
                tracker.notified = false;
            }
            if trigger == Trigger::Mutation {
                tracker.last = current;
            }
        }

        for kind in events {
            debug!("Content transition on {:?}: {}", trigger, kind);
            ctx.publisher.publish(kind, &current);
        }
    }

    fn arm_poll(&self) {
        let weak = Arc::downgrade(&self.inner);
        let ctx = &self.inner.ctx;
        let mut tracker = lock(&self.inner.tracker);
        let timer = ctx.scheduler.schedule(
            ctx.config.poll_interval(),
            Box::new(move || {
                if let Some(observer) = Self::upgrade(&weak) {
                    observer.poll();
                }
            }),
        );
        tracker.poll_timer = Some(timer);
    }

    fn poll(&self) {
        let attempts = {
            let mut tracker = lock(&self.inner.tracker);
            tracker.poll_timer = None;
            tracker.attempts += 1;
            tracker.attempts
        };
        if !self.inner.active.load(Ordering::SeqCst) {
            return;
        }

        self.check(Trigger::Poll);

        if self.notified() {
            debug!("Content poll stopping after {} attempts: notified", attempts);
            return;
        }
        if attempts >= self.inner.ctx.config.poll_budget {
            debug!("Content poll budget exhausted");
            return;
        }
        self.arm_poll();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_root_priority() {
        let html = Element::new("html").with_child(
            Element::new("body")
                .with_child(Element::new("nav"))
                .with_child(Element::new("div").with_class("app-root"))
                .with_child(Element::new("div").with_id("main-root"))
                .with_child(Element::new("div").with_id("root")),
        );
        assert_eq!(locate_root(&html).and_then(|e| e.id.as_deref()), Some("root"));

        let html = Element::new("html").with_child(
            Element::new("body")
                .with_child(Element::new("nav"))
                .with_child(Element::new("div").with_class("app-root"))
                .with_child(Element::new("div").with_id("main-root")),
        );
        assert_eq!(locate_root(&html).and_then(|e| e.id.as_deref()), Some("main-root"));

        let html = Element::new("html").with_child(
            Element::new("body")
                .with_child(Element::new("nav"))
                .with_child(Element::new("div").with_class("app-root")),
        );
        assert_eq!(
            locate_root(&html).and_then(|e| e.class_name.as_deref()),
            Some("app-root")
        );

        let html = Element::new("html")
            .with_child(Element::new("body").with_child(Element::new("main")));
        assert_eq!(locate_root(&html).map(|e| e.tag.as_str()), Some("main"));

        let html = Element::new("html").with_child(Element::new("body"));
        assert!(locate_root(&html).is_none());
    }

    #[test]
    fn test_markup_readiness_needs_markers_or_text() {
        let probe = MarkupReadiness::new(vec!["data-reactroot".into()]);
        let empty_shell = Element::new("div").with_child(Element::new("div"));
        assert!(!probe.framework_ready(&empty_shell));

        let marked = Element::new("div").with_child(Element::new("div").with_attr("data-reactroot", ""));
        assert!(probe.framework_ready(&marked));

        let texty = Element::new("div").with_child(Element::new("p").with_text("  hi "));
        assert!(probe.framework_ready(&texty));

        assert!(!probe.framework_ready(&Element::new("div").with_text("text but no children")));
    }
}
