//! The host's request-issuing primitive.

use crate::serializer::json_stringify;
use async_trait::async_trait;
use bytes::Bytes;
use pagewatch_common::error::{HostError, TransportError};
use pagewatch_common::value::HostValue;

#[derive(Debug, Clone)]
pub enum RequestBody {
    Text(String),
    /// Multipart form fields.
    FormData(Vec<(String, String)>),
    /// `application/x-www-form-urlencoded` parameters.
    UrlEncoded(Vec<(String, String)>),
    /// Any other body object supplied by the page.
    Value(HostValue),
}

#[derive(Debug, Clone)]
pub struct Request {
    pub url: String,
    /// `None` means the runtime default, `GET`.
    pub method: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: None,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            ..Self::get(url)
        }
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn method_or_default(&self) -> &str {
        self.method.as_deref().unwrap_or("GET")
    }
}

#[derive(Debug, Clone)]
enum ResponseBody {
    Buffered(Bytes),
    /// Already consumed or streaming; cannot be read a second time.
    Locked,
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    body: ResponseBody,
}

impl Response {
    pub fn new(status: u16, status_text: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers: Vec::new(),
            body: ResponseBody::Buffered(body.into()),
        }
    }

    /// A response whose body cannot be duplicated.
    pub fn locked(status: u16, status_text: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers: Vec::new(),
            body: ResponseBody::Locked,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Buffered(bytes) => Some(bytes),
            ResponseBody::Locked => None,
        }
    }

    /// Reads a duplicate of the body as text without consuming it.
    pub fn clone_text(&self) -> Result<String, HostError> {
        match &self.body {
            ResponseBody::Buffered(bytes) => Ok(String::from_utf8_lossy(bytes).into_owned()),
            ResponseBody::Locked => Err(HostError::BodyUnavailable),
        }
    }

    pub fn text(self) -> Result<String, HostError> {
        self.clone_text()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response, TransportError>;
}

/// Real HTTP transport.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let method = reqwest::Method::from_bytes(request.method_or_default().as_bytes())
            .map_err(|e| TransportError::new(format!("Invalid method: {}", e)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            None => builder,
            Some(RequestBody::Text(text)) => builder.body(text),
            // Sent url-encoded; multipart needs a reqwest feature this crate does not enable.
            Some(RequestBody::FormData(fields)) => builder.form(&fields),
            Some(RequestBody::UrlEncoded(params)) => builder.form(&params),
            Some(RequestBody::Value(value)) => {
                let json = json_stringify(&value)
                    .map_err(|e| TransportError::new(e.to_string()))?
                    .unwrap_or_default();
                builder
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(json)
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::new(format!("Failed to fetch: {}", e)))?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::new(format!("Failed to read body: {}", e)))?;

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body: ResponseBody::Buffered(body),
        })
    }
}
