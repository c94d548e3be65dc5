use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

pub type BodyStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to read response body: {0}")]
    Body(String),
}

/// A JSON POST request as built by a provider adapter.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl HttpRequest {
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub struct HttpResponse {
    pub status: u16,
    pub body: BodyStream,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain the body into a string, keeping whatever arrived before a read
    /// error.
    pub async fn text(mut self) -> String {
        let mut bytes = Vec::new();
        while let Some(chunk) = self.body.next().await {
            match chunk {
                Ok(chunk) => bytes.extend_from_slice(&chunk),
                Err(_) => break,
            }
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Production transport backed by a shared `reqwest` client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// `timeout` bounds connecting and receiving response headers. The body
    /// itself may stream for longer.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = tokio::time::timeout(self.timeout, builder.send())
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
            .map_err(|err| TransportError::Network(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|err| TransportError::Body(err.to_string()))
            })
            .boxed();
        Ok(HttpResponse { status, body })
    }
}

/// Canned reply for [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Respond {
        status: u16,
        chunks: Vec<Result<Vec<u8>, TransportError>>,
    },
    Fail(TransportError),
}

impl ScriptedReply {
    /// 200 response whose body arrives as the given chunks.
    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Respond {
            status: 200,
            chunks: chunks
                .into_iter()
                .map(|chunk| Ok(chunk.into().into_bytes()))
                .collect(),
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Respond {
            status,
            chunks: vec![Ok(body.into().into_bytes())],
        }
    }

    /// 200 response that breaks with `error` after the given chunks.
    pub fn interrupted<I, S>(chunks: I, error: TransportError) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut reply = Self::chunks(chunks);
        if let Self::Respond { chunks, .. } = &mut reply {
            chunks.push(Err(error));
        }
        reply
    }

    pub fn fail(error: TransportError) -> Self {
        Self::Fail(error)
    }
}

#[derive(Default)]
struct ScriptedState {
    replies: VecDeque<ScriptedReply>,
    requests: Vec<HttpRequest>,
}

/// In-process transport that records every request and replays queued
/// replies in order. Clones share the same script.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, reply: ScriptedReply) -> Self {
        self.push(reply);
        self
    }

    pub fn push(&self, reply: ScriptedReply) {
        self.state.lock().replies.push_back(reply);
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.lock().requests.clone()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.state.lock().requests.last().cloned()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let reply = {
            let mut state = self.state.lock();
            state.requests.push(request);
            state.replies.pop_front()
        };
        match reply {
            Some(ScriptedReply::Respond { status, chunks }) => Ok(HttpResponse {
                status,
                body: futures::stream::iter(chunks).boxed(),
            }),
            Some(ScriptedReply::Fail(error)) => Err(error),
            None => Err(TransportError::Network(
                "no scripted reply queued".to_string(),
            )),
        }
    }
}
