use pagewatch_engine::channel::MemoryChannel;
use pagewatch_engine::config::MonitorConfig;
use pagewatch_engine::dom::{DocumentSnapshot, Element, ReadyState};
use pagewatch_engine::host::{Host, ParentChannel, SnapshotDocument};
use pagewatch_engine::observer::ObserverContext;
use pagewatch_engine::observer::error::{ErrorEvent, ErrorObserver};
use pagewatch_engine::protocol::EventKind;
use pagewatch_engine::scheduler::ManualScheduler;
use pagewatch_engine::value::{HostObject, HostValue};
use serde_json::json;
use std::sync::Arc;

struct Harness {
    scheduler: Arc<ManualScheduler>,
    channel: Arc<MemoryChannel>,
    document: Arc<SnapshotDocument>,
    ctx: ObserverContext,
}

fn harness(snapshot: DocumentSnapshot) -> Harness {
    let scheduler = Arc::new(ManualScheduler::new());
    let channel = Arc::new(MemoryChannel::new());
    let document = Arc::new(SnapshotDocument::new(snapshot));
    let host = Host {
        document: document.clone(),
        channel: Some(channel.clone() as Arc<dyn ParentChannel>),
        clock: scheduler.clone(),
        scheduler: scheduler.clone(),
    };
    let ctx = ObserverContext::new(MonitorConfig::for_origin("https://parent.example"), &host);
    Harness {
        scheduler,
        channel,
        document,
        ctx,
    }
}

fn page_with_root(root: Element) -> DocumentSnapshot {
    DocumentSnapshot::new("http://localhost:5173/", ReadyState::Complete)
        .with_body(Element::new("body").with_child(root))
}

fn type_error() -> ErrorEvent {
    ErrorEvent {
        message: "Uncaught TypeError: x is not a function".into(),
        filename: "http://localhost:5173/src/App.tsx".into(),
        lineno: 12,
        colno: 7,
        error: Some(HostValue::error(
            "TypeError",
            "x is not a function",
            Some("TypeError: x is not a function\n    at App (App.tsx:12:7)".into()),
        )),
    }
}

#[test]
fn test_runtime_error_payload() {
    let h = harness(page_with_root(
        Element::new("div").with_id("root").with_child(Element::new("main")),
    ));
    let observer = ErrorObserver::install(&h.ctx);

    observer.report_error(type_error());

    let events = h.channel.of_kind(EventKind::RuntimeError);
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].data,
        json!({
            "message": "Uncaught TypeError: x is not a function",
            "filename": "http://localhost:5173/src/App.tsx",
            "lineno": 12,
            "colno": 7,
            "stack": "TypeError: x is not a function\n    at App (App.tsx:12:7)",
            "blankScreen": false
        })
    );
}

#[test]
fn test_duplicate_errors_suppressed_within_window() {
    let h = harness(page_with_root(Element::new("div").with_id("root")));
    let observer = ErrorObserver::install(&h.ctx);

    observer.report_error(type_error());
    h.scheduler.advance_ms(4_999);
    observer.report_error(type_error());
    assert_eq!(h.channel.of_kind(EventKind::RuntimeError).len(), 1);

    h.scheduler.advance_ms(1);
    assert_eq!(observer.cached(), 0);
    observer.report_error(type_error());
    assert_eq!(h.channel.of_kind(EventKind::RuntimeError).len(), 2);
}

#[test]
fn test_different_locations_are_distinct_errors() {
    let h = harness(page_with_root(Element::new("div").with_id("root")));
    let observer = ErrorObserver::install(&h.ctx);

    observer.report_error(type_error());
    observer.report_error(ErrorEvent {
        colno: 8,
        ..type_error()
    });
    assert_eq!(h.channel.of_kind(EventKind::RuntimeError).len(), 2);
}

#[test]
fn test_blank_screen_flag_tracks_root_children() {
    let h = harness(page_with_root(Element::new("div").with_id("root")));
    let observer = ErrorObserver::install(&h.ctx);
    observer.report_error(type_error());
    assert_eq!(
        h.channel.of_kind(EventKind::RuntimeError)[0].data["blankScreen"],
        json!(true)
    );

    // No div#root at all is not considered blank.
    h.document.replace(page_with_root(Element::new("div").with_id("app")));
    observer.report_error(ErrorEvent {
        lineno: 99,
        ..type_error()
    });
    assert_eq!(
        h.channel.of_kind(EventKind::RuntimeError)[1].data["blankScreen"],
        json!(false)
    );
}

#[test]
fn test_rejection_uses_stack_or_string_form() {
    let h = harness(page_with_root(Element::new("div").with_id("root")));
    let observer = ErrorObserver::install(&h.ctx);

    let reason = HostValue::error("Error", "fetch failed", Some("Error: fetch failed\n    at load".into()));
    observer.report_rejection(&reason);
    observer.report_rejection(&HostValue::from("plain string reason"));

    let events = h.channel.of_kind(EventKind::UnhandledPromiseRejection);
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[0].data,
        json!({"message": "fetch failed", "stack": "Error: fetch failed\n    at load"})
    );
    assert_eq!(
        events[1].data,
        json!({"message": "Unhandled promise rejection", "stack": "plain string reason"})
    );
}

#[test]
fn test_rejection_with_object_reason() {
    let h = harness(page_with_root(Element::new("div").with_id("root")));
    let observer = ErrorObserver::install(&h.ctx);

    let reason = HostValue::Object(HostObject::from_entries([
        ("message", HostValue::from("quota exceeded")),
        ("code", HostValue::from(22i64)),
    ]));
    observer.report_rejection(&reason);
    observer.report_rejection(&reason);

    let events = h.channel.of_kind(EventKind::UnhandledPromiseRejection);
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].data,
        json!({"message": "quota exceeded", "stack": "[object Object]"})
    );
}

#[test]
fn test_error_and_rejection_keyspaces_are_independent() {
    let h = harness(page_with_root(Element::new("div").with_id("root")));
    let observer = ErrorObserver::install(&h.ctx);

    let event = type_error();
    let same_text = format!(
        "{}|{}|{}|{}",
        event.message, event.filename, event.lineno, event.colno
    );
    observer.report_error(event);
    observer.report_rejection(&HostValue::from(same_text));

    assert_eq!(
        h.channel.kinds(),
        vec![EventKind::RuntimeError, EventKind::UnhandledPromiseRejection]
    );
}

#[test]
fn test_shutdown_stops_reporting_and_cancels_evictions() {
    let h = harness(page_with_root(Element::new("div").with_id("root")));
    let observer = ErrorObserver::install(&h.ctx);

    observer.report_error(type_error());
    assert_eq!(h.scheduler.pending(), 1);

    observer.shutdown();
    assert_eq!(h.scheduler.pending(), 0);
    observer.report_error(ErrorEvent {
        lineno: 1,
        ..type_error()
    });
    assert_eq!(h.channel.of_kind(EventKind::RuntimeError).len(), 1);
}
