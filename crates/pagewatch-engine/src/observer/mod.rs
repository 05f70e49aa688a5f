//! Observers hook one host surface each and turn occurrences into events.
//!
//! Every observer is installed explicitly from an [`ObserverContext`] and can
//! be exercised on its own. Observer handles are cheap to clone; clones share
//! state.

pub mod console;
pub mod content;
pub mod error;
pub mod navigation;
pub mod network;

use crate::config::MonitorConfig;
use crate::host::{Clock, Document, Host};
use crate::publisher::Publisher;
use crate::scheduler::Scheduler;
use crate::serializer::{Serializer, SerializerLimits};
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared collaborators handed to each observer at install time.
#[derive(Clone)]
pub struct ObserverContext {
    pub config: Arc<MonitorConfig>,
    pub publisher: Arc<Publisher>,
    pub serializer: Arc<Serializer>,
    pub document: Arc<dyn Document>,
    pub clock: Arc<dyn Clock>,
    pub scheduler: Arc<dyn Scheduler>,
}

impl ObserverContext {
    pub fn new(config: MonitorConfig, host: &Host) -> Self {
        let publisher = Publisher::new(
            config.allowed_origins.clone(),
            host.channel.clone(),
            Arc::clone(&host.clock),
        );
        let serializer = Serializer::new(SerializerLimits::from(&config));
        Self {
            config: Arc::new(config),
            publisher: Arc::new(publisher),
            serializer: Arc::new(serializer),
            document: Arc::clone(&host.document),
            clock: Arc::clone(&host.clock),
            scheduler: Arc::clone(&host.scheduler),
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
