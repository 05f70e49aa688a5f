//! CDP subscriptions that turn browser events into [`PageSignal`]s.

use crate::error::HostBackendError;
use crate::remote_value::from_remote;
use crate::signal::PageSignal;
use base64::Engine;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::network::{
    self, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    GetResponseBodyParams, RequestId, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, EventFrameNavigated,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    AddBindingParams, ConsoleApiCalledType, EventBindingCalled, EventConsoleApiCalled,
    EventExceptionThrown, ExceptionDetails,
};
use futures::{Stream, StreamExt};
use pagewatch_engine::dom::DocumentSnapshot;
use pagewatch_engine::error::TransportError;
use pagewatch_engine::observer::console::ConsoleLevel;
use pagewatch_engine::observer::error::ErrorEvent;
use pagewatch_engine::observer::network::BodyCapture;
use pagewatch_engine::value::HostValue;
use std::collections::HashSet;
use std::pin::pin;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

pub const SNAPSHOT_BINDING: &str = "__pagewatchSnapshot";
const SNAPSHOT_JS: &str = include_str!("snapshot.js");
const REJECTION_PREFIX: &str = "Uncaught (in promise)";

/// Installs the snapshot script and subscribes to every event the monitor
/// consumes. Must run before the first navigation.
pub async fn install(page: &Page, tx: UnboundedSender<PageSignal>) -> Result<(), HostBackendError> {
    page.execute(AddBindingParams::new(SNAPSHOT_BINDING)).await?;
    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(SNAPSHOT_JS))
        .await?;
    page.execute(network::EnableParams::default()).await?;

    forward_documents(page, tx.clone()).await?;
    forward_exceptions(page, tx.clone()).await?;
    forward_console(page, tx.clone()).await?;
    forward_network(page, tx).await?;
    Ok(())
}

async fn forward_documents(page: &Page, tx: UnboundedSender<PageSignal>) -> Result<(), HostBackendError> {
    let navigations = page
        .event_listener::<EventFrameNavigated>()
        .await?
        .filter_map(|event| async move { navigation_signal(&event) });
    let snapshots = page
        .event_listener::<EventBindingCalled>()
        .await?
        .filter_map(|event| async move { snapshot_signal(&event) });
    tokio::spawn(relay_in_order(navigations, snapshots, tx));
    Ok(())
}

fn navigation_signal(event: &EventFrameNavigated) -> Option<PageSignal> {
    // Child frames don't replace the monitored document.
    if event.frame.parent_id.is_some() {
        return None;
    }
    Some(PageSignal::DocumentReplaced {
        url: event.frame.url.clone(),
    })
}

fn snapshot_signal(event: &EventBindingCalled) -> Option<PageSignal> {
    if event.name != SNAPSHOT_BINDING {
        return None;
    }
    match serde_json::from_str::<DocumentSnapshot>(&event.payload) {
        Ok(snapshot) => Some(PageSignal::Snapshot(snapshot)),
        Err(e) => {
            warn!("Discarding malformed document snapshot: {}", e);
            None
        }
    }
}

/// Relays both streams through one loop, draining `first` whenever both have
/// signals ready. Navigations go first so a snapshot of the new document
/// never overtakes the navigation that created it.
async fn relay_in_order<A, B>(first: A, second: B, tx: UnboundedSender<PageSignal>)
where
    A: Stream<Item = PageSignal>,
    B: Stream<Item = PageSignal>,
{
    let mut first = pin!(first);
    let mut second = pin!(second);
    loop {
        let signal = tokio::select! {
            biased;
            Some(signal) = first.next() => signal,
            Some(signal) = second.next() => signal,
            else => break,
        };
        if tx.send(signal).is_err() {
            break;
        }
    }
    debug!("Document forwarding ended");
}

async fn forward_exceptions(page: &Page, tx: UnboundedSender<PageSignal>) -> Result<(), HostBackendError> {
    let mut events = page.event_listener::<EventExceptionThrown>().await?;
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if tx.send(exception_signal(&event.exception_details)).is_err() {
                break;
            }
        }
    });
    Ok(())
}

fn exception_signal(details: &ExceptionDetails) -> PageSignal {
    let thrown = details.exception.as_ref().map(from_remote);
    if details.text.starts_with(REJECTION_PREFIX) {
        return PageSignal::Rejection(thrown.unwrap_or(HostValue::Undefined));
    }

    let message = match &thrown {
        Some(value) => format!("{} {}", details.text, value.display_string()),
        None => details.text.clone(),
    };
    // CDP positions are zero-based.
    let position = |n: i64| u32::try_from(n + 1).unwrap_or_default();
    PageSignal::Error(ErrorEvent {
        message,
        filename: details.url.clone().unwrap_or_default(),
        lineno: position(details.line_number),
        colno: position(details.column_number),
        error: thrown,
    })
}

async fn forward_console(page: &Page, tx: UnboundedSender<PageSignal>) -> Result<(), HostBackendError> {
    let mut events = page.event_listener::<EventConsoleApiCalled>().await?;
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let Some(level) = console_level(&event.r#type) else {
                continue;
            };
            let args = event.args.iter().map(from_remote).collect();
            if tx.send(PageSignal::Console(level, args)).is_err() {
                break;
            }
        }
    });
    Ok(())
}

fn console_level(kind: &ConsoleApiCalledType) -> Option<ConsoleLevel> {
    match kind {
        ConsoleApiCalledType::Log => Some(ConsoleLevel::Log),
        ConsoleApiCalledType::Warning => Some(ConsoleLevel::Warn),
        ConsoleApiCalledType::Error => Some(ConsoleLevel::Error),
        _ => None,
    }
}

/// Only `fetch` requests are reported. Response bodies are read once loading
/// finishes, which keeps the page's own consumption of the body untouched.
async fn forward_network(page: &Page, tx: UnboundedSender<PageSignal>) -> Result<(), HostBackendError> {
    let mut requests = page.event_listener::<EventRequestWillBeSent>().await?;
    let mut responses = page.event_listener::<EventResponseReceived>().await?;
    let mut finished = page.event_listener::<EventLoadingFinished>().await?;
    let mut failed = page.event_listener::<EventLoadingFailed>().await?;
    let page = page.clone();

    tokio::spawn(async move {
        let mut tracked: HashSet<String> = HashSet::new();
        loop {
            let signal = tokio::select! {
                // Drain in protocol order when several streams are ready.
                biased;
                Some(event) = requests.next() => {
                    if event.r#type != Some(ResourceType::Fetch) {
                        continue;
                    }
                    let id = request_key(&event.request_id);
                    tracked.insert(id.clone());
                    PageSignal::RequestStarted {
                        id,
                        url: event.request.url.clone(),
                        method: event.request.method.clone(),
                        body: event.request.post_data.clone(),
                    }
                }
                Some(event) = responses.next() => {
                    let id = request_key(&event.request_id);
                    if !tracked.contains(&id) {
                        continue;
                    }
                    PageSignal::ResponseReceived {
                        id,
                        status: u16::try_from(event.response.status).unwrap_or_default(),
                        status_text: event.response.status_text.clone(),
                    }
                }
                Some(event) = finished.next() => {
                    let id = request_key(&event.request_id);
                    if !tracked.remove(&id) {
                        continue;
                    }
                    let body = read_body(&page, &event.request_id).await;
                    PageSignal::RequestFinished { id, body }
                }
                Some(event) = failed.next() => {
                    let id = request_key(&event.request_id);
                    if !tracked.remove(&id) {
                        continue;
                    }
                    PageSignal::RequestFailed {
                        id,
                        error: TransportError::new(event.error_text.clone()),
                    }
                }
                else => break,
            };
            if tx.send(signal).is_err() {
                break;
            }
        }
        debug!("Network forwarding ended");
    });
    Ok(())
}

fn request_key(id: &RequestId) -> String {
    let key: &str = id.as_ref();
    key.to_string()
}

async fn read_body(page: &Page, request_id: &RequestId) -> BodyCapture {
    let response = match page
        .execute(GetResponseBodyParams::new(request_id.clone()))
        .await
    {
        Ok(response) => response,
        Err(e) => {
            debug!("Response body unavailable: {}", e);
            return BodyCapture::Failed;
        }
    };
    let body = &response.result;
    if !body.base64_encoded {
        return BodyCapture::Text(body.body.clone());
    }
    match base64::engine::general_purpose::STANDARD.decode(&body.body) {
        Ok(bytes) => BodyCapture::Text(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            debug!("Response body decode failed: {}", e);
            BodyCapture::Failed
        }
    }
}
