//! Page occurrences reported by the browser, and the single consumer that
//! feeds them to the monitor.

use pagewatch_engine::config::MonitorConfig;
use pagewatch_engine::dom::{DocumentSnapshot, ReadyState};
use pagewatch_engine::error::TransportError;
use pagewatch_engine::host::{Clock, Host, ParentChannel, SnapshotDocument};
use pagewatch_engine::monitor::Monitor;
use pagewatch_engine::observer::console::{
    ConsoleLevel, ConsoleSink, InstrumentedConsole, TracingConsole,
};
use pagewatch_engine::observer::error::ErrorEvent;
use pagewatch_engine::observer::network::{BodyCapture, RequestCapture};
use pagewatch_engine::scheduler::Scheduler;
use pagewatch_engine::value::HostValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug)]
pub enum PageSignal {
    /// The top-level document was replaced by a full navigation.
    DocumentReplaced { url: String },
    Snapshot(DocumentSnapshot),
    Error(ErrorEvent),
    Rejection(HostValue),
    Console(ConsoleLevel, Vec<HostValue>),
    RequestStarted {
        id: String,
        url: String,
        method: String,
        body: Option<String>,
    },
    ResponseReceived {
        id: String,
        status: u16,
        status_text: String,
    },
    RequestFinished {
        id: String,
        body: BodyCapture,
    },
    RequestFailed {
        id: String,
        error: TransportError,
    },
}

struct InFlight {
    capture: RequestCapture,
    response: Option<(u16, String)>,
}

/// Owns the monitor for the current document and applies signals in order.
pub struct SignalDispatcher {
    config: MonitorConfig,
    channel: Option<Arc<dyn ParentChannel>>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
    document: Arc<SnapshotDocument>,
    monitor: Monitor,
    console: Option<InstrumentedConsole<TracingConsole>>,
    requests: HashMap<String, InFlight>,
}

impl SignalDispatcher {
    pub fn new(
        config: MonitorConfig,
        channel: Option<Arc<dyn ParentChannel>>,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let document = Arc::new(SnapshotDocument::default());
        let monitor = Self::attach(&config, &channel, &clock, &scheduler, &document);
        Self {
            config,
            channel,
            clock,
            scheduler,
            document,
            monitor,
            console: None,
            requests: HashMap::new(),
        }
    }

    fn attach(
        config: &MonitorConfig,
        channel: &Option<Arc<dyn ParentChannel>>,
        clock: &Arc<dyn Clock>,
        scheduler: &Arc<dyn Scheduler>,
        document: &Arc<SnapshotDocument>,
    ) -> Monitor {
        let host = Host {
            document: document.clone(),
            channel: channel.clone(),
            clock: Arc::clone(clock),
            scheduler: Arc::clone(scheduler),
        };
        Monitor::attach(config.clone(), host)
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn in_flight(&self) -> usize {
        self.requests.len()
    }

    pub fn handle(&mut self, signal: PageSignal) {
        match signal {
            PageSignal::DocumentReplaced { url } => self.restart(url),
            PageSignal::Snapshot(snapshot) => self.apply_snapshot(snapshot),
            PageSignal::Error(event) => self.monitor.report_error(event),
            PageSignal::Rejection(reason) => self.monitor.report_rejection(&reason),
            PageSignal::Console(level, args) => {
                if let Some(console) = &self.console {
                    console.log(level, &args);
                }
            }
            PageSignal::RequestStarted {
                id,
                url,
                method,
                body,
            } => {
                if let Ok(observers) = self.monitor.observers() {
                    let capture = observers.network.begin_raw(Some(url), Some(&method), body);
                    self.requests.insert(
                        id,
                        InFlight {
                            capture,
                            response: None,
                        },
                    );
                }
            }
            PageSignal::ResponseReceived {
                id,
                status,
                status_text,
            } => {
                if let Some(in_flight) = self.requests.get_mut(&id) {
                    in_flight.response = Some((status, status_text));
                }
            }
            PageSignal::RequestFinished { id, body } => {
                let Some(in_flight) = self.requests.remove(&id) else {
                    return;
                };
                let (Ok(observers), Some((status, status_text))) =
                    (self.monitor.observers(), in_flight.response)
                else {
                    debug!("Request {} finished without a response", id);
                    return;
                };
                observers
                    .network
                    .complete(in_flight.capture, status, &status_text, body);
            }
            PageSignal::RequestFailed { id, error } => {
                let Some(in_flight) = self.requests.remove(&id) else {
                    return;
                };
                if let Ok(observers) = self.monitor.observers() {
                    observers.network.fail(in_flight.capture, &error);
                }
            }
        }
    }

    fn apply_snapshot(&mut self, snapshot: DocumentSnapshot) {
        let parsed = snapshot.ready_state.is_parsed();
        self.document.replace(snapshot);

        if self.monitor.is_running() {
            self.monitor.dom_mutated();
        } else if parsed {
            self.monitor.document_ready();
            self.console = self.monitor.instrument_console(TracingConsole).ok();
        }
    }

    /// A full navigation tears the monitor down; the new document gets a
    /// fresh one once it reports itself parsed.
    fn restart(&mut self, url: String) {
        info!("Document replaced, restarting monitor for {}", url);
        self.monitor.shutdown();
        self.console = None;
        self.requests.clear();
        self.document = Arc::new(SnapshotDocument::new(DocumentSnapshot::new(
            url,
            ReadyState::Loading,
        )));
        self.monitor = Self::attach(
            &self.config,
            &self.channel,
            &self.clock,
            &self.scheduler,
            &self.document,
        );
    }
}
