use async_trait::async_trait;
use pagewatch_engine::channel::MemoryChannel;
use pagewatch_engine::config::MonitorConfig;
use pagewatch_engine::dom::{DocumentSnapshot, Element, ReadyState};
use pagewatch_engine::error::TransportError;
use pagewatch_engine::host::{Host, ParentChannel, SnapshotDocument};
use pagewatch_engine::monitor::{Monitor, MonitorError};
use pagewatch_engine::observer::console::{ConsoleLevel, ConsoleSink};
use pagewatch_engine::observer::error::ErrorEvent;
use pagewatch_engine::protocol::EventKind;
use pagewatch_engine::scheduler::ManualScheduler;
use pagewatch_engine::transport::{Request, Response, Transport};
use pagewatch_engine::value::HostValue;
use serde_json::json;
use std::sync::Arc;

const PAGE_URL: &str = "http://localhost:5173/";

struct Harness {
    scheduler: Arc<ManualScheduler>,
    channel: Arc<MemoryChannel>,
    document: Arc<SnapshotDocument>,
    host: Host,
}

fn harness(ready_state: ReadyState) -> Harness {
    let scheduler = Arc::new(ManualScheduler::new());
    let channel = Arc::new(MemoryChannel::new());
    let document = Arc::new(SnapshotDocument::new(
        DocumentSnapshot::new(PAGE_URL, ready_state)
            .with_body(Element::new("body").with_child(Element::new("div").with_id("root"))),
    ));
    let host = Host {
        document: document.clone(),
        channel: Some(channel.clone() as Arc<dyn ParentChannel>),
        clock: scheduler.clone(),
        scheduler: scheduler.clone(),
    };
    Harness {
        scheduler,
        channel,
        document,
        host,
    }
}

fn config() -> MonitorConfig {
    MonitorConfig::for_origin("https://parent.example")
}

struct NullConsole;

impl ConsoleSink for NullConsole {
    fn log(&self, _level: ConsoleLevel, _args: &[HostValue]) {}
}

struct EchoTransport;

#[async_trait]
impl Transport for EchoTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        Ok(Response::new(200, "OK", request.url))
    }
}

#[test]
fn test_parsed_document_initializes_immediately() {
    let h = harness(ReadyState::Interactive);
    let monitor = Monitor::attach(config(), h.host.clone());

    assert!(monitor.is_running());
    let initialized = h.channel.of_kind(EventKind::MonitorInitialized);
    assert_eq!(initialized.len(), 1);
    assert_eq!(initialized[0].data, json!({"url": PAGE_URL}));
}

#[test]
fn test_loading_document_defers_initialization() {
    let h = harness(ReadyState::Loading);
    let mut monitor = Monitor::attach(config(), h.host.clone());

    assert!(!monitor.is_running());
    assert!(h.channel.envelopes().is_empty());
    assert_eq!(
        monitor.instrument_console(NullConsole).err(),
        Some(MonitorError::NotInitialized)
    );

    // occurrences before initialization are not observed
    monitor.console_call(ConsoleLevel::Log, &[HostValue::from("early")]);
    h.scheduler.advance_ms(1_000);
    assert!(h.channel.envelopes().is_empty());

    h.document.update(|s| s.ready_state = ReadyState::Interactive);
    monitor.document_ready();
    monitor.document_ready();

    assert!(monitor.is_running());
    assert_eq!(h.channel.kinds(), vec![EventKind::MonitorInitialized]);
}

#[test]
fn test_events_flow_through_monitor() {
    let h = harness(ReadyState::Complete);
    let monitor = Monitor::attach(config(), h.host.clone());

    monitor.report_error(ErrorEvent {
        message: "boom".into(),
        filename: "app.js".into(),
        lineno: 1,
        colno: 1,
        error: None,
    });
    monitor.report_rejection(&HostValue::from("nope"));
    monitor.console_call(ConsoleLevel::Warn, &[HostValue::from("slow")]);
    h.document
        .update(|s| s.location = format!("{}#/projects", PAGE_URL));
    monitor.dom_mutated();
    h.scheduler.advance_ms(250);

    assert_eq!(
        h.channel.kinds(),
        vec![
            EventKind::MonitorInitialized,
            EventKind::RuntimeError,
            EventKind::UnhandledPromiseRejection,
            EventKind::UrlChanged,
            EventKind::ConsoleOutput,
        ]
    );
    let error = &h.channel.of_kind(EventKind::RuntimeError)[0];
    assert_eq!(error.data["blankScreen"], json!(true));
    assert!(error.data.get("stack").is_none());
}

#[tokio::test]
async fn test_instrumented_transport_reports_requests() {
    let h = harness(ReadyState::Complete);
    let monitor = Monitor::attach(config(), h.host.clone());
    let transport = monitor.instrument_transport(EchoTransport).unwrap();

    let response = transport.send(Request::get("/api/ping")).await.unwrap();
    assert_eq!(response.text().unwrap(), "/api/ping");

    let events = h.channel.of_kind(EventKind::NetworkRequest);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data["responseBody"], json!("/api/ping"));
    assert_eq!(events[0].data["duration"], json!(0));
}

#[test]
fn test_shutdown_cancels_timers_and_silences_wrappers() {
    let h = harness(ReadyState::Complete);
    let mut monitor = Monitor::attach(config(), h.host.clone());
    let console = monitor.instrument_console(NullConsole).unwrap();

    console.log(ConsoleLevel::Log, &[HostValue::from("pending")]);
    assert!(h.scheduler.pending() > 0);

    monitor.shutdown();
    assert_eq!(h.scheduler.pending(), 0);
    assert!(matches!(monitor.observers(), Err(MonitorError::Stopped)));

    console.log(ConsoleLevel::Log, &[HostValue::from("after")]);
    monitor.dom_mutated();
    h.scheduler.advance_ms(10_000);
    assert_eq!(h.channel.kinds(), vec![EventKind::MonitorInitialized]);
}

#[test]
fn test_no_parent_channel_runs_silently() {
    let h = harness(ReadyState::Complete);
    let host = Host {
        channel: None,
        ..h.host.clone()
    };
    let monitor = Monitor::attach(config(), host);
    monitor.console_call(ConsoleLevel::Error, &[HostValue::from("x")]);
    h.scheduler.advance_ms(250);

    assert!(monitor.is_running());
    assert!(h.channel.envelopes().is_empty());
}
