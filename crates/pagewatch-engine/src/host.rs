//! Seams between the monitor and the page it observes.

use crate::scheduler::Scheduler;
use chrono::{DateTime, Utc};
use pagewatch_common::dom::{DocumentSnapshot, Element, ReadyState};
use pagewatch_common::error::DeliveryError;
use pagewatch_common::protocol::Envelope;
use std::sync::{Arc, RwLock};

/// Read access to the host document.
pub trait Document: Send + Sync {
    /// Current location string (`document.location.href`).
    fn location(&self) -> String;

    fn ready_state(&self) -> ReadyState;

    /// Snapshot of the `<html>` element subtree.
    fn document_element(&self) -> Option<Element>;

    /// True while a hot-reload cycle is still applying updates.
    fn hot_reload_pending(&self) -> bool {
        false
    }
}

/// Message channel to the parent context.
pub trait ParentChannel: Send + Sync {
    fn post_message(&self, envelope: &Envelope, target_origin: &str) -> Result<(), DeliveryError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Everything the monitor consumes from its environment.
#[derive(Clone)]
pub struct Host {
    pub document: Arc<dyn Document>,
    /// `None` when there is no addressable parent; publishing is then a no-op.
    pub channel: Option<Arc<dyn ParentChannel>>,
    pub clock: Arc<dyn Clock>,
    pub scheduler: Arc<dyn Scheduler>,
}

/// A [`Document`] backed by the latest snapshot pushed by the host integration.
#[derive(Debug, Default)]
pub struct SnapshotDocument {
    snapshot: RwLock<DocumentSnapshot>,
}

impl SnapshotDocument {
    pub fn new(snapshot: DocumentSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
        }
    }

    pub fn replace(&self, snapshot: DocumentSnapshot) {
        *self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = snapshot;
    }

    /// Applies an in-place edit to the current snapshot.
    pub fn update(&self, edit: impl FnOnce(&mut DocumentSnapshot)) {
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        edit(&mut guard);
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        self.read().clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, DocumentSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Document for SnapshotDocument {
    fn location(&self) -> String {
        self.read().location.clone()
    }

    fn ready_state(&self) -> ReadyState {
        self.read().ready_state
    }

    fn document_element(&self) -> Option<Element> {
        self.read().root.clone()
    }

    fn hot_reload_pending(&self) -> bool {
        self.read().hot_reload_pending
    }
}
