//! HTTP request/response types and the executor that sends them.
//!
//! The transfer engine only builds [`Request`]s and interprets
//! [`Response`]s; actually putting bytes on the wire is the job of an
//! [`HttpExecutor`]. [`UreqExecutor`] is the stock implementation.

use std::fmt;
use std::io::Read;
use thiserror::Error;
use url::Url;

/// HTTP methods used by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header list with case-insensitive names, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Headers::default()
    }

    /// Set a header, replacing any existing value with the same name.
    pub fn set(&mut self, name: &str, value: &str) {
        match self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Redirect limit for requests that follow redirects.
pub const MAX_REDIRECTS: u32 = 5;

/// Whether the executor may follow redirects for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectPolicy {
    /// Follow up to [`MAX_REDIRECTS`] redirects.
    Follow,
    /// Hand any 3xx back to the caller as [`TransportError::Redirected`].
    Never,
}

/// Everything about a request except its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: Method,
    pub url: Url,
    pub headers: Headers,
}

/// Request payload.
pub enum Body {
    Empty,
    Bytes(Vec<u8>),
    /// A stream of exactly `len` bytes.
    Stream {
        reader: Box<dyn Read + Send>,
        len: u64,
    },
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Body::Stream { len, .. } => write!(f, "Stream({} bytes)", len),
        }
    }
}

/// An outgoing request.
#[derive(Debug)]
pub struct Request {
    pub head: RequestHead,
    pub body: Body,
    pub redirects: RedirectPolicy,
}

impl Request {
    /// A body-less request. GETs follow redirects, everything else does not.
    pub fn new(method: Method, url: Url) -> Self {
        let redirects = match method {
            Method::Get => RedirectPolicy::Follow,
            _ => RedirectPolicy::Never,
        };
        Request {
            head: RequestHead {
                method,
                url,
                headers: Headers::new(),
            },
            body: Body::Empty,
            redirects,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.head.headers.set(name, value);
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn method(&self) -> Method {
        self.head.method
    }

    pub fn url(&self) -> &Url {
        &self.head.url
    }

    pub fn headers(&self) -> &Headers {
        &self.head.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.head.headers
    }
}

/// Status line and headers of a response, plus the request that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub request: RequestHead,
}

impl ResponseHead {
    /// `"404 Not Found"`.
    pub fn status_line(&self) -> String {
        if self.reason.is_empty() {
            self.status.to_string()
        } else {
            format!("{} {}", self.status, self.reason)
        }
    }

    /// The declared `Content-Length`, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get("Content-Length")
            .and_then(|v| v.trim().parse().ok())
    }
}

/// An incoming response with an unread body.
pub struct Response {
    pub head: ResponseHead,
    pub body: Box<dyn Read + Send>,
}

impl Response {
    pub fn status(&self) -> u16 {
        self.head.status
    }

    pub fn headers(&self) -> &Headers {
        &self.head.headers
    }

    pub fn request(&self) -> &RequestHead {
        &self.head.request
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("head", &self.head)
            .finish_non_exhaustive()
    }
}

/// Why an executor did not return a plain response.
#[derive(Error, Debug)]
pub enum TransportError {
    /// A redirect came back and was not followed. The caller decides what it means.
    #[error("redirect not followed (status {})", .0.status())]
    Redirected(Box<Response>),

    /// No response was received.
    #[error("{0}")]
    Failed(String),
}

/// Sends requests. Implementations must be safe to share across threads.
pub trait HttpExecutor: Send + Sync {
    fn execute(&self, request: Request) -> Result<Response, TransportError>;
}

/// [`HttpExecutor`] backed by a pair of `ureq` agents.
#[derive(Clone)]
pub struct UreqExecutor {
    following: ureq::Agent,
    direct: ureq::Agent,
}

impl UreqExecutor {
    pub fn new() -> Self {
        UreqExecutor {
            following: ureq::AgentBuilder::new().redirects(MAX_REDIRECTS).build(),
            direct: ureq::AgentBuilder::new().redirects(0).build(),
        }
    }

    fn agent(&self, policy: RedirectPolicy) -> &ureq::Agent {
        match policy {
            RedirectPolicy::Follow => &self.following,
            RedirectPolicy::Never => &self.direct,
        }
    }
}

impl Default for UreqExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpExecutor for UreqExecutor {
    fn execute(&self, request: Request) -> Result<Response, TransportError> {
        let Request {
            head,
            body,
            redirects,
        } = request;

        let mut req = self
            .agent(redirects)
            .request(head.method.as_str(), head.url.as_str());
        for (name, value) in head.headers.iter() {
            req = req.set(name, value);
        }

        let result = match body {
            Body::Empty => req.call(),
            Body::Bytes(bytes) => req.send_bytes(&bytes),
            Body::Stream { reader, len } => req
                .set("Content-Length", &len.to_string())
                .send(reader.take(len)),
        };

        // 4xx/5xx are ordinary responses to us.
        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(err) => return Err(TransportError::Failed(err.to_string())),
        };

        let mut headers = Headers::new();
        for name in response.headers_names() {
            if let Some(value) = response.header(&name) {
                headers.set(&name, value);
            }
        }

        let status = response.status();
        let response = Response {
            head: ResponseHead {
                status,
                reason: response.status_text().to_string(),
                headers,
                request: head,
            },
            body: Box::new(response.into_reader()),
        };

        if redirects == RedirectPolicy::Never && (300..400).contains(&status) {
            return Err(TransportError::Redirected(Box::new(response)));
        }
        Ok(response)
    }
}
