use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, Url};

use crate::config::ChatApiConfig;
use crate::error::{parse_error_message, ChatApiError, FALLBACK_RESPONSE_ERROR};
use crate::events::StreamEvent;
use crate::handler::StreamHandler;
use crate::headers::build_headers;
use crate::payload::ChatRequest;
use crate::sse::StreamDecoder;
use crate::url::normalize_chat_url;

/// Optional cancellation signal shared between the caller and the stream loop.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How a decoded stream ended when no error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Upstream sent `[DONE]`.
    Terminal,
    /// The transport closed without a terminal marker.
    Closed,
}

#[derive(Debug)]
pub struct ChatApiClient {
    http: Client,
    config: ChatApiConfig,
}

impl ChatApiClient {
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ChatApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ChatApiConfig {
        &self.config
    }

    pub fn normalized_endpoint(&self) -> String {
        normalize_chat_url(&self.config.base_url, &self.config.chat_path)
    }

    pub fn build_headers(&self) -> Result<HeaderMap, ChatApiError> {
        let headers = build_headers(&self.config, None);
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                    ChatApiError::InvalidHeader(format!("invalid header key: {key}"))
                })?,
                HeaderValue::from_str(&value).map_err(|_| {
                    ChatApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    pub fn build_request(
        &self,
        request: &ChatRequest,
    ) -> Result<reqwest::RequestBuilder, ChatApiError> {
        let endpoint = self.normalized_endpoint();
        let url = Url::parse(&endpoint)
            .map_err(|error| ChatApiError::InvalidBaseUrl(format!("{endpoint}: {error}")))?;
        let headers = self.build_headers()?;
        let payload = self.request_with_transport_defaults(request);

        Ok(self.http.post(url).headers(headers).json(&payload))
    }

    fn request_with_transport_defaults(&self, request: &ChatRequest) -> ChatRequest {
        let mut payload = request.clone();
        if payload.model.is_none() {
            payload.model = self
                .config
                .model
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToString::to_string);
        }
        payload
    }

    /// Sends the request and returns the response once a success status arrives.
    pub async fn send(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, ChatApiError> {
        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        tracing::info!(
            endpoint = %self.normalized_endpoint(),
            messages = request.messages.len(),
            "sending chat request"
        );

        let response = self.build_request(request)?.send();
        let response = await_or_cancel(response, cancellation).await??;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = await_or_cancel(response.text(), cancellation)
            .await?
            .unwrap_or_default();
        let message = parse_error_message(status, &body);
        let message = if message.trim().is_empty() {
            FALLBACK_RESPONSE_ERROR.to_string()
        } else {
            message
        };

        Err(ChatApiError::Status(status, message))
    }

    /// Streams one response into `handler`.
    ///
    /// The handler contract holds on every path: `on_error` fires at most once
    /// and `on_done` fires exactly once, last. The returned value repeats the
    /// outcome for callers that want it.
    pub async fn stream_chat<H>(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
        mut handler: H,
    ) -> Result<StreamEnd, ChatApiError>
    where
        H: StreamHandler,
    {
        let response = match self.send(request, cancellation).await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(%error, "chat request failed");
                handler.on_error(&error.to_string());
                handler.on_done();
                return Err(error);
            }
        };

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ChatApiError::from));
        decode_stream(chunks, cancellation, &mut handler).await
    }
}

/// Drives a chunk stream through a fresh [`StreamDecoder`] into `handler`.
///
/// Decoding stops at `[DONE]`, at transport close, at the first transport
/// error, or on cancellation. Transport close and cancellation run the
/// decoder's end-of-stream flush before the handler is closed out.
pub async fn decode_stream<S, B, H>(
    chunks: S,
    cancellation: Option<&CancellationSignal>,
    handler: &mut H,
) -> Result<StreamEnd, ChatApiError>
where
    S: Stream<Item = Result<B, ChatApiError>>,
    B: AsRef<[u8]>,
    H: StreamHandler + ?Sized,
{
    let mut chunks = std::pin::pin!(chunks);
    let mut decoder = StreamDecoder::new();

    let outcome = loop {
        let next = match await_or_cancel(chunks.next(), cancellation).await {
            Ok(next) => next,
            Err(error) => break Err(error),
        };
        let Some(chunk) = next else {
            break Ok(StreamEnd::Closed);
        };
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(error) => break Err(error),
        };

        if dispatch_events(decoder.feed(chunk.as_ref()), handler) {
            break Ok(StreamEnd::Terminal);
        }
    };

    if matches!(outcome, Ok(StreamEnd::Closed) | Err(ChatApiError::Cancelled)) {
        dispatch_events(decoder.finish(), handler);
    }

    match &outcome {
        Ok(end) => tracing::debug!(?end, "chat stream ended"),
        Err(error) => {
            tracing::warn!(%error, "chat stream failed");
            handler.on_error(&error.to_string());
        }
    }
    handler.on_done();

    outcome
}

// Returns true once the terminal marker has been seen.
fn dispatch_events<H>(events: Vec<StreamEvent>, handler: &mut H) -> bool
where
    H: StreamHandler + ?Sized,
{
    for event in events {
        match event {
            StreamEvent::Delta { content } => handler.on_delta(&content),
            StreamEvent::Done => return true,
        }
    }
    false
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, ChatApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = std::pin::pin!(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(ChatApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
