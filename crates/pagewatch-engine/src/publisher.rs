use crate::host::{Clock, ParentChannel};
use pagewatch_common::protocol::{Envelope, EventKind};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error};

/// Sends envelopes to every trusted destination origin.
pub struct Publisher {
    origins: Vec<String>,
    channel: Option<Arc<dyn ParentChannel>>,
    clock: Arc<dyn Clock>,
}

impl Publisher {
    pub fn new(
        origins: Vec<String>,
        channel: Option<Arc<dyn ParentChannel>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            origins,
            channel,
            clock,
        }
    }

    pub fn origins(&self) -> &[String] {
        &self.origins
    }

    /// Publishes `data` under `kind`. Never fails: encoding and delivery errors
    /// are logged and the remaining origins are still attempted.
    ///
    /// `data` has to be made of already-serialized values; host values cannot
    /// reach this point because they do not implement `Serialize`.
    pub fn publish<T: Serialize + ?Sized>(&self, kind: EventKind, data: &T) {
        let Some(channel) = &self.channel else {
            debug!("No parent channel, dropping {}", kind);
            return;
        };

        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(e) => {
                error!("Failed to encode {} payload: {}", kind, e);
                return;
            }
        };

        for origin in &self.origins {
            let envelope = Envelope::new(kind, data.clone(), self.clock.now());
            if let Err(e) = channel.post_message(&envelope, origin) {
                error!("Failed to send message to {}: {}", origin, e);
            }
        }
    }
}
