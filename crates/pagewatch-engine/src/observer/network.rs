//! Transparent observation of network requests.

use super::ObserverContext;
use crate::serializer::json_stringify;
use crate::transport::{Request, RequestBody, Response, Transport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pagewatch_common::error::TransportError;
use pagewatch_common::protocol::{EventKind, NetworkErrorData, NetworkRequestData, iso_timestamp};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub const UNSERIALIZABLE_BODY: &str = "Could not serialize request body";
pub const CLONE_FAILED: &str = "[Clone failed]";

/// Renders a request body the way it is reported in `requestBody`.
pub fn render_request_body(body: &RequestBody) -> String {
    match body {
        RequestBody::Text(text) => text.clone(),
        RequestBody::FormData(fields) => format!(
            "FormData: {}",
            fields
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&")
        ),
        RequestBody::UrlEncoded(params) => url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish(),
        RequestBody::Value(value) => match json_stringify(value) {
            Ok(Some(json)) => json,
            Ok(None) | Err(_) => UNSERIALIZABLE_BODY.to_string(),
        },
    }
}

/// What was known about a request when it was issued.
#[derive(Debug, Clone)]
pub struct RequestCapture {
    pub url: Option<String>,
    pub method: String,
    pub request_body: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Outcome of trying to read a duplicate of the response body.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyCapture {
    Text(String),
    Failed,
    /// The host offers no way to duplicate the body.
    Unavailable,
}

struct Inner {
    ctx: ObserverContext,
    active: AtomicBool,
}

#[derive(Clone)]
pub struct NetworkObserver {
    inner: Arc<Inner>,
}

impl NetworkObserver {
    pub fn install(ctx: &ObserverContext) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx: ctx.clone(),
                active: AtomicBool::new(true),
            }),
        }
    }

    pub fn wrap<T: Transport>(&self, transport: T) -> ObservedTransport<T> {
        ObservedTransport {
            inner: transport,
            observer: self.clone(),
        }
    }

    pub fn begin(&self, request: &Request) -> RequestCapture {
        let request_body = request.body.as_ref().map(render_request_body);
        self.begin_raw(
            Some(request.url.clone()),
            request.method.as_deref(),
            request_body,
        )
    }

    /// Starts a capture from already-rendered request details.
    pub fn begin_raw(
        &self,
        url: Option<String>,
        method: Option<&str>,
        request_body: Option<String>,
    ) -> RequestCapture {
        RequestCapture {
            url,
            method: method.filter(|m| !m.is_empty()).unwrap_or("GET").to_string(),
            request_body,
            started_at: self.inner.ctx.clock.now(),
        }
    }

    pub fn complete_response(&self, capture: RequestCapture, response: &Response) {
        let body = match response.clone_text() {
            Ok(text) => BodyCapture::Text(text),
            Err(e) => {
                tracing::debug!("Response body duplication failed: {}", e);
                BodyCapture::Failed
            }
        };
        self.complete(capture, response.status, &response.status_text, body);
    }

    pub fn complete(&self, capture: RequestCapture, status: u16, status_text: &str, body: BodyCapture) {
        if !self.inner.active.load(Ordering::SeqCst) {
            return;
        }
        let ctx = &self.inner.ctx;
        let now = ctx.clock.now();
        let response_body = match body {
            BodyCapture::Text(text) => Some(ctx.serializer.cap(&text)),
            BodyCapture::Failed => Some(CLONE_FAILED.to_string()),
            BodyCapture::Unavailable => None,
        };
        let data = NetworkRequestData {
            url: capture.url,
            method: capture.method,
            status: Some(status),
            status_text: Some(status_text.to_string()),
            request_body: capture.request_body,
            response_body,
            duration: (now - capture.started_at).num_milliseconds(),
            timestamp: iso_timestamp(now),
            error: None,
        };
        ctx.publisher.publish(EventKind::NetworkRequest, &data);
    }

    pub fn fail(&self, capture: RequestCapture, error: &TransportError) {
        if !self.inner.active.load(Ordering::SeqCst) {
            return;
        }
        let ctx = &self.inner.ctx;
        let now = ctx.clock.now();
        let message = if error.message.is_empty() {
            "Unknown error".to_string()
        } else {
            error.message.clone()
        };
        let data = NetworkRequestData {
            url: capture.url,
            method: capture.method,
            status: None,
            status_text: None,
            request_body: capture.request_body,
            response_body: None,
            duration: (now - capture.started_at).num_milliseconds(),
            timestamp: iso_timestamp(now),
            error: Some(NetworkErrorData {
                message,
                stack: error.stack.clone(),
            }),
        };
        ctx.publisher.publish(EventKind::NetworkRequest, &data);
    }

    pub fn shutdown(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
    }
}

/// A transport whose calls are issued unchanged and reported on completion.
pub struct ObservedTransport<T> {
    inner: T,
    observer: NetworkObserver,
}

impl<T> ObservedTransport<T> {
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: Transport> Transport for ObservedTransport<T> {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let capture = self.observer.begin(&request);
        match self.inner.send(request).await {
            Ok(response) => {
                self.observer.complete_response(capture, &response);
                Ok(response)
            }
            Err(error) => {
                self.observer.fail(capture, &error);
                Err(error)
            }
        }
    }
}
