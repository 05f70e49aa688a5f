//! The monitor context: one value owning every observer for a page session.

use crate::config::MonitorConfig;
use crate::host::Host;
use crate::observer::ObserverContext;
use crate::observer::console::{ConsoleLevel, ConsoleObserver, ConsoleSink, InstrumentedConsole};
use crate::observer::content::{ContentObserver, MarkupReadiness, ReadinessProbe};
use crate::observer::error::{ErrorEvent, ErrorObserver};
use crate::observer::navigation::NavigationObserver;
use crate::observer::network::{NetworkObserver, ObservedTransport};
use crate::transport::Transport;
use pagewatch_common::protocol::{EventKind, PageUrl};
use pagewatch_common::value::HostValue;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MonitorError {
    #[error("Monitor is waiting for the document to finish parsing")]
    NotInitialized,
    #[error("Monitor has been shut down")]
    Stopped,
}

/// Handles to every installed observer. Clones share state, so a host can
/// hand them to its own event tasks.
#[derive(Clone)]
pub struct Observers {
    pub errors: ErrorObserver,
    pub network: NetworkObserver,
    pub console: ConsoleObserver,
    pub navigation: NavigationObserver,
    pub content: ContentObserver,
}

impl Observers {
    /// Installs all observers and announces the monitor.
    pub fn install(ctx: &ObserverContext, probe: Arc<dyn ReadinessProbe>) -> Self {
        let observers = Self {
            errors: ErrorObserver::install(ctx),
            network: NetworkObserver::install(ctx),
            console: ConsoleObserver::install(ctx),
            navigation: NavigationObserver::install(ctx),
            content: ContentObserver::install(ctx, probe),
        };
        ctx.publisher.publish(
            EventKind::MonitorInitialized,
            &PageUrl {
                url: ctx.document.location(),
            },
        );
        observers
    }

    /// Runs both DOM watchers for one mutation notification.
    pub fn dom_mutated(&self) {
        self.navigation.on_mutation();
        self.content.on_mutation();
    }

    pub fn shutdown(&self) {
        self.errors.shutdown();
        self.network.shutdown();
        self.console.shutdown();
        self.navigation.shutdown();
        self.content.shutdown();
    }
}

enum State {
    Pending,
    Running(Observers),
    Stopped,
}

pub struct Monitor {
    ctx: ObserverContext,
    probe: Arc<dyn ReadinessProbe>,
    state: State,
}

impl Monitor {
    /// Attaches with the default markup readiness probe.
    pub fn attach(config: MonitorConfig, host: Host) -> Self {
        let probe = Arc::new(MarkupReadiness::new(config.framework_markers.clone()));
        Self::attach_with_probe(config, host, probe)
    }

    /// Initializes immediately when the document is already parsed; otherwise
    /// waits for [`Monitor::document_ready`].
    pub fn attach_with_probe(
        config: MonitorConfig,
        host: Host,
        probe: Arc<dyn ReadinessProbe>,
    ) -> Self {
        let mut monitor = Self {
            ctx: ObserverContext::new(config, &host),
            probe,
            state: State::Pending,
        };
        if host.document.ready_state().is_parsed() {
            monitor.init();
        } else {
            info!("Document still loading, deferring monitor initialization");
        }
        monitor
    }

    /// Signals that the document finished initial parsing.
    pub fn document_ready(&mut self) {
        if matches!(self.state, State::Pending) {
            self.init();
        }
    }

    fn init(&mut self) {
        let observers = Observers::install(&self.ctx, Arc::clone(&self.probe));
        info!(
            "Monitor initialized for {} ({} destination origins)",
            self.ctx.document.location(),
            self.ctx.publisher.origins().len()
        );
        self.state = State::Running(observers);
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running(_))
    }

    pub fn context(&self) -> &ObserverContext {
        &self.ctx
    }

    pub fn observers(&self) -> Result<&Observers, MonitorError> {
        match &self.state {
            State::Running(observers) => Ok(observers),
            State::Pending => Err(MonitorError::NotInitialized),
            State::Stopped => Err(MonitorError::Stopped),
        }
    }

    pub fn report_error(&self, event: ErrorEvent) {
        if let Ok(observers) = self.observers() {
            observers.errors.report_error(event);
        }
    }

    pub fn report_rejection(&self, reason: &HostValue) {
        if let Ok(observers) = self.observers() {
            observers.errors.report_rejection(reason);
        }
    }

    pub fn console_call(&self, level: ConsoleLevel, args: &[HostValue]) {
        if let Ok(observers) = self.observers() {
            observers.console.record(level, args);
        }
    }

    pub fn dom_mutated(&self) {
        if let Ok(observers) = self.observers() {
            observers.dom_mutated();
        }
    }

    pub fn instrument_console<C: ConsoleSink>(
        &self,
        sink: C,
    ) -> Result<InstrumentedConsole<C>, MonitorError> {
        Ok(self.observers()?.console.wrap(sink))
    }

    pub fn instrument_transport<T: Transport>(
        &self,
        transport: T,
    ) -> Result<ObservedTransport<T>, MonitorError> {
        Ok(self.observers()?.network.wrap(transport))
    }

    /// Removes all hooks and cancels pending timers. Wrappers created earlier
    /// keep delegating but stop reporting.
    pub fn shutdown(&mut self) {
        if let State::Running(observers) = &self.state {
            observers.shutdown();
            info!("Monitor shut down");
        }
        self.state = State::Stopped;
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
