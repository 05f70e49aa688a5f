//! Parent channels that do not need a network listener.

use crate::host::ParentChannel;
use pagewatch_common::error::DeliveryError;
use pagewatch_common::protocol::{Envelope, EventKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One envelope as handed to one destination origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub origin: String,
    pub envelope: Envelope,
}

/// Records every delivery in memory. Origins can be marked as refusing to
/// simulate an unavailable target window.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    deliveries: Mutex<Vec<Delivery>>,
    refused: Mutex<HashSet<String>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse(&self, origin: impl Into<String>) {
        lock(&self.refused).insert(origin.into());
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        lock(&self.deliveries).clone()
    }

    /// Envelopes in delivery order, regardless of origin.
    pub fn envelopes(&self) -> Vec<Envelope> {
        lock(&self.deliveries)
            .iter()
            .map(|d| d.envelope.clone())
            .collect()
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<Envelope> {
        lock(&self.deliveries)
            .iter()
            .filter(|d| d.envelope.kind == kind)
            .map(|d| d.envelope.clone())
            .collect()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        lock(&self.deliveries)
            .iter()
            .map(|d| d.envelope.kind)
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.deliveries).clear();
    }
}

impl ParentChannel for MemoryChannel {
    fn post_message(&self, envelope: &Envelope, target_origin: &str) -> Result<(), DeliveryError> {
        if lock(&self.refused).contains(target_origin) {
            return Err(DeliveryError::OriginRefused(target_origin.to_string()));
        }
        lock(&self.deliveries).push(Delivery {
            origin: target_origin.to_string(),
            envelope: envelope.clone(),
        });
        Ok(())
    }
}

/// Writes one `{"origin", "envelope"}` JSON document per line.
pub struct JsonLinesChannel<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesChannel<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl JsonLinesChannel<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ParentChannel for JsonLinesChannel<W> {
    fn post_message(&self, envelope: &Envelope, target_origin: &str) -> Result<(), DeliveryError> {
        let line = serde_json::to_string(&Delivery {
            origin: target_origin.to_string(),
            envelope: envelope.clone(),
        })?;
        let mut writer = lock(&self.writer);
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}
