//! Reverse proxy against a single origin, with buffered response capture and
//! an ordered interceptor chain that may replace the response before any
//! byte reaches the caller.

use actix_web::http::header::HeaderMap;
use actix_web::http::{Method, StatusCode};
use actix_web::{HttpRequest, HttpResponse};
use async_trait::async_trait;
use bytes::Bytes;

use crate::error::error_body;

/// Request headers never forwarded to the origin. `x-payment` is stripped on
/// the first pass and re-added explicitly by a payment retry.
const HEADERS_TO_STRIP: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "content-length",
    "x-payment",
];

/// Response headers not copied back from the origin; the buffered body is
/// re-framed by the gateway.
const RESPONSE_HEADERS_TO_STRIP: &[&str] =
    &["connection", "keep-alive", "transfer-encoding", "content-length"];

/// A buffered response. Records the first status set, collects body bytes
/// and headers in memory; nothing reaches the client until
/// [`CapturedResponse::into_response`].
#[derive(Debug, Default)]
pub struct CapturedResponse {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl CapturedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the response status. Only the first call takes effect.
    pub fn set_status(&mut self, code: StatusCode) {
        if self.status.is_none() {
            self.status = Some(code);
        }
    }

    /// Append body bytes to the buffer.
    pub fn write(&mut self, chunk: &[u8]) {
        self.body.extend_from_slice(chunk);
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The recorded status, or 200 when only body bytes were written.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Flush: emit the recorded status, headers and buffered body. Consumes
    /// the capture, so a response can only be flushed once.
    pub fn into_response(self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status());
        for (name, value) in self.headers.iter() {
            builder.append_header((name.clone(), value.clone()));
        }
        builder.body(self.body)
    }
}

/// Everything a proxy pass or interceptor needs from the inbound request,
/// detached from the actix request so retries can rebuild it freely.
pub struct ProxyContext {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: Option<String>,
    pub body: Bytes,
    pub target: url::Url,
    pub client: reqwest::Client,
}

impl ProxyContext {
    pub fn from_request(
        req: &HttpRequest,
        body: Bytes,
        target: url::Url,
        client: reqwest::Client,
    ) -> Self {
        Self {
            method: req.method().clone(),
            headers: req.headers().clone(),
            query: req.uri().query().map(str::to_string),
            body,
            target,
            client,
        }
    }
}

/// What an interceptor did with the captured response.
pub enum InterceptOutcome {
    /// Not handled; the capture continues down the chain and is flushed
    /// after it.
    Passthrough(CapturedResponse),
    /// The interceptor produced the final response; the chain halts.
    Handled(HttpResponse),
}

/// Inspects a captured origin response and may replace it.
#[async_trait(?Send)]
pub trait ProxyInterceptor {
    async fn intercept(
        &self,
        captured: CapturedResponse,
        cx: &ProxyContext,
    ) -> InterceptOutcome;
}

/// Single-origin reverse proxy. The forwarded path is the target URL's own
/// path (the caller's path is replaced, not appended); the raw query string
/// is carried over verbatim.
pub struct ResourceProxy {
    interceptors: Vec<Box<dyn ProxyInterceptor>>,
}

impl ResourceProxy {
    pub fn new() -> Self {
        Self {
            interceptors: Vec::new(),
        }
    }

    pub fn add_interceptor(&mut self, interceptor: Box<dyn ProxyInterceptor>) {
        self.interceptors.push(interceptor);
    }

    /// Proxy the request and run the interceptor chain over the captured
    /// response. Without interceptors the captured response is flushed
    /// directly.
    pub async fn serve(&self, cx: &ProxyContext) -> HttpResponse {
        let mut captured = forward(cx, None).await;
        if self.interceptors.is_empty() {
            return captured.into_response();
        }

        for interceptor in &self.interceptors {
            match interceptor.intercept(captured, cx).await {
                InterceptOutcome::Handled(response) => return response,
                InterceptOutcome::Passthrough(next) => captured = next,
            }
        }
        captured.into_response()
    }
}

impl Default for ResourceProxy {
    fn default() -> Self {
        Self::new()
    }
}

/// One origin pass. Transport failures surface as a captured 502 so they
/// flow through the interceptor chain like any other origin response.
pub async fn forward(cx: &ProxyContext, payment_header: Option<&str>) -> CapturedResponse {
    let mut url = cx.target.clone();
    url.set_query(cx.query.as_deref());

    let method = match reqwest::Method::from_bytes(cx.method.as_str().as_bytes()) {
        Ok(method) => method,
        Err(_) => {
            return bad_gateway(format!("unsupported HTTP method: {}", cx.method));
        }
    };

    let mut request = cx.client.request(method, url);
    for (name, value) in cx.headers.iter() {
        if HEADERS_TO_STRIP.contains(&name.as_str().to_lowercase().as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            request = request.header(name.as_str(), value);
        }
    }
    if let Some(payment) = payment_header {
        request = request.header("X-Payment", payment);
    }
    if !cx.body.is_empty() {
        request = request.body(cx.body.clone());
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "proxy request failed");
            return bad_gateway(e.to_string());
        }
    };

    let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::OK);
    let headers = response.headers().clone();
    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "failed to read origin response body");
            return bad_gateway(e.to_string());
        }
    };

    let mut captured = CapturedResponse::new();
    captured.set_status(status);
    for (name, value) in headers.iter() {
        if RESPONSE_HEADERS_TO_STRIP.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            actix_web::http::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            actix_web::http::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            captured.headers_mut().append(name, value);
        }
    }
    captured.write(&body);
    captured
}

fn bad_gateway(message: String) -> CapturedResponse {
    let mut captured = CapturedResponse::new();
    captured.set_status(StatusCode::BAD_GATEWAY);
    captured.headers_mut().insert(
        actix_web::http::header::CONTENT_TYPE,
        actix_web::http::header::HeaderValue::from_static("application/json"),
    );
    let body = error_body(
        StatusCode::BAD_GATEWAY,
        "bad_gateway",
        &format!("Failed to proxy request: {message}"),
    );
    captured.write(body.to_string().as_bytes());
    captured
}
