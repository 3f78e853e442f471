//! Transfer engine: download and upload of single objects.

use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

use crate::classify::classify;
use crate::context::{request_context, response_context};
use crate::credentials::{CredentialProvider, GitCredentialHelper};
use crate::http::{
    Body, HttpExecutor, Method, Request, Response, ResponseHead, TransportError, UreqExecutor,
};
use crate::links::{Link, LinkMetadata, ObjectSpec};
use crate::media::{validate_media_header, MEDIA_TYPE, META_MEDIA_TYPE};
use crate::progress::{ProgressObserver, ProgressReader};
use crate::request::{attach_credentials, settle_credentials};
use crate::store::ObjectStore;
use crate::{DiagnosticError, EndpointConfig, Error, Oid, Result};

/// What the server said to an upload negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Negotiation {
    /// 200: the server already has the object.
    AlreadyStored,
    /// 302 or 405: the server predates hypermedia; use OPTIONS + PUT.
    LegacyFallback,
    /// 202: upload (and maybe verify) through the returned links.
    Hypermedia(LinkMetadata),
    /// Anything else.
    Unexpected(u16),
}

/// How a response status is checked once credentials are settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    /// Error statuses fail, see [`classify`].
    Classify,
    /// As `Classify`, and anything else outside 2xx fails too.
    Success,
    /// Every status is an answer.
    Probe,
}

/// One upload: which local object, what to call it, who to tell about progress.
#[derive(Clone)]
pub struct TransferDescriptor {
    path: PathBuf,
    display_name: Option<String>,
    progress: Option<Arc<dyn ProgressObserver>>,
}

impl TransferDescriptor {
    /// Upload the object at `path`; its file name is the OID.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        TransferDescriptor {
            path: path.as_ref().to_path_buf(),
            display_name: None,
            progress: None,
        }
    }

    /// Name shown in logs and error messages, usually the working tree path.
    pub fn with_display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_string());
        self
    }

    pub fn with_progress<P: ProgressObserver + 'static>(mut self, observer: P) -> Self {
        self.progress = Some(Arc::new(observer));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The display name, falling back to the object path.
    pub fn display_name(&self) -> String {
        match &self.display_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => self.path.display().to_string(),
        }
    }
}

impl fmt::Debug for TransferDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferDescriptor")
            .field("path", &self.path)
            .field("display_name", &self.display_name)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// A downloaded object, positioned at the first payload byte.
pub struct Download {
    reader: Box<dyn Read + Send>,
    size: Option<u64>,
    content_type: String,
}

impl Download {
    /// Payload size: `Content-Length` minus the boundary marker.
    ///
    /// `None` when the server did not declare a length.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

impl Read for Download {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for Download {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Download")
            .field("size", &self.size)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Client for the git-media transfer protocol.
///
/// This type is cheaply cloneable - clones share the configuration,
/// executor, credential provider and object store. Transfers of different
/// objects may run on different threads at the same time.
#[derive(Clone)]
pub struct TransferClient {
    inner: Arc<TransferClientInner>,
}

struct TransferClientInner {
    config: EndpointConfig,
    executor: Arc<dyn HttpExecutor>,
    credentials: Arc<dyn CredentialProvider>,
    store: Arc<dyn ObjectStore>,
}

impl TransferClient {
    /// Create a client that sends requests with `ureq` and asks
    /// `git credential` for credentials.
    pub fn new<S: ObjectStore + 'static>(config: EndpointConfig, store: S) -> Self {
        TransferClient {
            inner: Arc::new(TransferClientInner {
                config,
                executor: Arc::new(UreqExecutor::new()),
                credentials: Arc::new(GitCredentialHelper::new()),
                store: Arc::new(store),
            }),
        }
    }

    /// Send requests through a different executor.
    pub fn with_executor<E: HttpExecutor + 'static>(self, executor: E) -> Self {
        TransferClient {
            inner: Arc::new(TransferClientInner {
                config: self.inner.config.clone(),
                executor: Arc::new(executor),
                credentials: self.inner.credentials.clone(),
                store: self.inner.store.clone(),
            }),
        }
    }

    /// Get credentials from a different provider.
    pub fn with_credentials<C: CredentialProvider + 'static>(self, credentials: C) -> Self {
        TransferClient {
            inner: Arc::new(TransferClientInner {
                config: self.inner.config.clone(),
                executor: self.inner.executor.clone(),
                credentials: Arc::new(credentials),
                store: self.inner.store.clone(),
            }),
        }
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.inner.config
    }

    /// Download the object named by the final component of `oid_path`.
    pub fn download<P: AsRef<Path>>(&self, oid_path: P) -> Result<Download> {
        let oid = Oid::from_path(oid_path)?;
        let endpoint = self.inner.config.endpoint();

        let request = self
            .object_request(Method::Get, &oid)
            .header("Accept", MEDIA_TYPE);
        tracing::debug!(%oid, "api_get");
        let mut response = self.send(request, Check::Classify)?;
        tracing::debug!(%oid, status = response.status(), "api_get_status");

        let content_type = match response.headers().get("Content-Type") {
            Some(value) if !value.trim().is_empty() => value.to_string(),
            _ => {
                let err = DiagnosticError::new(Error::Protocol("Empty Content-Type".into()));
                return Err(response_context(err, endpoint, &response.head));
            }
        };

        let marker_len = match validate_media_header(&content_type, &mut response.body) {
            Ok(len) => len as u64,
            Err(err) => return Err(response_context(err.into(), endpoint, &response.head)),
        };

        let size = response
            .head
            .content_length()
            .map(|len| len.saturating_sub(marker_len));
        tracing::trace!(%oid, ?size, marker_len, "download ready");

        Ok(Download {
            reader: response.body,
            size,
            content_type,
        })
    }

    /// Upload a local object, negotiating how with the server first.
    ///
    /// Nothing is retried: the first failing step ends the upload.
    pub fn upload(&self, transfer: &TransferDescriptor) -> Result<()> {
        let oid = Oid::from_path(transfer.path())?;
        let name = transfer.display_name();

        let size = self.inner.store.size(&oid).map_err(|e| {
            DiagnosticError::wrap(Error::Io(e), format!("Local object does not exist: {}", oid))
        })?;

        let (negotiation, head) = self
            .exchange_negotiation(&oid, size)
            .map_err(|e| e.with_message(format!("Error starting file upload of {}", name)))?;

        match negotiation {
            Negotiation::AlreadyStored => {
                tracing::debug!(%oid, "object already stored");
                Ok(())
            }
            Negotiation::LegacyFallback => {
                if self.probe(&oid)? == 200 {
                    tracing::debug!(%oid, "object already stored");
                    return Ok(());
                }
                self.put_legacy(&oid, transfer)
                    .map_err(|e| e.with_message(format!("Error uploading file {} ({})", name, oid)))
            }
            Negotiation::Hypermedia(links) => self.put_external(&oid, transfer, &links, &head),
            Negotiation::Unexpected(status) => {
                let err = DiagnosticError::new(Error::Protocol(format!(
                    "Unexpected HTTP response: {}",
                    status
                )));
                Err(response_context(err, self.inner.config.endpoint(), &head))
            }
        }
    }

    /// POST `{"oid", "size"}` and interpret the answer.
    pub fn negotiate(&self, oid: &Oid, size: u64) -> Result<Negotiation> {
        Ok(self.exchange_negotiation(oid, size)?.0)
    }

    /// As [`negotiate`](Self::negotiate), also returning the response head
    /// so later failures can report the negotiation exchange.
    fn exchange_negotiation(&self, oid: &Oid, size: u64) -> Result<(Negotiation, ResponseHead)> {
        let body = serde_json::to_vec(&ObjectSpec {
            oid: oid.as_str(),
            size,
        })
        .map_err(Error::Json)?;

        let request = Request::new(Method::Post, self.inner.config.negotiation_url())
            .header("Accept", META_MEDIA_TYPE)
            .header("Content-Type", META_MEDIA_TYPE)
            .body(Body::Bytes(body));

        tracing::debug!(%oid, size, "api_post");
        let mut response = self.send(request, Check::Classify)?;
        let status = response.status();
        tracing::debug!(%oid, status, "api_post_status");

        let negotiation = match status {
            200 => Negotiation::AlreadyStored,
            302 | 405 => Negotiation::LegacyFallback,
            202 => match serde_json::from_reader::<_, LinkMetadata>(&mut response.body) {
                Ok(links) => Negotiation::Hypermedia(links),
                Err(err) => {
                    let err = DiagnosticError::wrap(
                        Error::Json(err),
                        format!("Error decoding JSON from POST {}", response.request().url),
                    );
                    return Err(response_context(err, self.inner.config.endpoint(), &response.head));
                }
            },
            other => Negotiation::Unexpected(other),
        };
        Ok((negotiation, response.head))
    }

    /// OPTIONS on the object URL; 200 means the legacy server has it.
    fn probe(&self, oid: &Oid) -> Result<u16> {
        tracing::debug!(%oid, "api_options");
        let response = self.send(self.object_request(Method::Options, oid), Check::Probe)?;
        tracing::debug!(%oid, status = response.status(), "api_options_status");
        Ok(response.status())
    }

    fn put_legacy(&self, oid: &Oid, transfer: &TransferDescriptor) -> Result<()> {
        let (body, size) = self.stream_body(oid, transfer)?;
        let request = self
            .object_request(Method::Put, oid)
            .header("Content-Type", MEDIA_TYPE)
            .header("Accept", META_MEDIA_TYPE)
            .header("Content-Length", &size.to_string())
            .body(body);

        tracing::info!(%oid, name = %transfer.display_name(), "sending");
        tracing::debug!(%oid, size, "api_put");
        let response = self.send(request, Check::Success)?;
        tracing::debug!(%oid, status = response.status(), "api_put_status");
        Ok(())
    }

    fn put_external(
        &self,
        oid: &Oid,
        transfer: &TransferDescriptor,
        links: &LinkMetadata,
        negotiation: &ResponseHead,
    ) -> Result<()> {
        let name = transfer.display_name();
        let link = match links.upload() {
            Some(link) => link,
            None => {
                let why = if links.has_links() {
                    "No upload link provided"
                } else {
                    "No hypermedia links provided"
                };
                let err = DiagnosticError::wrap(
                    Error::Protocol(why.into()),
                    format!("Error attempting to PUT {}", name),
                );
                return Err(response_context(err, self.inner.config.endpoint(), negotiation));
            }
        };

        let (body, size) = self.stream_body(oid, transfer)?;
        let request = link_request(Method::Put, link)?
            .header("Content-Length", &size.to_string())
            .body(body);

        tracing::info!(%oid, name = %name, "sending");
        tracing::debug!(%oid, url = %request.url(), "external_put");
        let response = self
            .send(request, Check::Success)
            .map_err(|e| e.with_message(format!("Error uploading file {} ({})", name, oid)))?;
        tracing::debug!(%oid, status = response.status(), "external_put_status");

        if let Some(verify) = links.verify() {
            self.verify(oid, size, verify)
                .map_err(|e| e.with_message(format!("Error verifying {} ({})", name, oid)))?;
        }
        Ok(())
    }

    /// POST `{"oid", "size"}` to the `verify` relation.
    fn verify(&self, oid: &Oid, size: u64, link: &Link) -> Result<()> {
        let body = serde_json::to_vec(&ObjectSpec {
            oid: oid.as_str(),
            size,
        })
        .map_err(Error::Json)?;

        let mut request = link_request(Method::Post, link)?;
        for (name, value) in [("Accept", META_MEDIA_TYPE), ("Content-Type", META_MEDIA_TYPE)] {
            if !request.headers().contains(name) {
                request.headers_mut().set(name, value);
            }
        }
        let request = request.body(Body::Bytes(body));

        tracing::debug!(%oid, url = %link.href, "verify");
        let response = self.send(request, Check::Success)?;
        tracing::debug!(%oid, status = response.status(), "verify_status");
        Ok(())
    }

    fn object_request(&self, method: Method, oid: &Oid) -> Request {
        Request::new(method, self.inner.config.object_url(oid))
    }

    /// Open the local object as a sized body, reporting progress if asked to.
    fn stream_body(&self, oid: &Oid, transfer: &TransferDescriptor) -> Result<(Body, u64)> {
        let object = self.inner.store.open(oid).map_err(|e| {
            DiagnosticError::wrap(Error::Io(e), format!("Local object does not exist: {}", oid))
        })?;
        let size = object.size;

        let reader: Box<dyn Read + Send> = match &transfer.progress {
            Some(observer) => Box::new(ProgressReader::new(object.reader, size, observer.clone())),
            None => object.reader,
        };
        Ok((Body::Stream { reader, len: size }, size))
    }

    /// Authorize, send, settle credentials and check the status.
    ///
    /// Every error that leaves here carries request or response context.
    fn send(&self, mut request: Request, check: Check) -> Result<Response> {
        let inner = &self.inner;
        let endpoint = inner.config.endpoint();

        let credential = match attach_credentials(
            &mut request,
            inner.credentials.as_ref(),
            inner.config.user_agent(),
        ) {
            Ok(credential) => credential,
            Err(err) => {
                let err = DiagnosticError::wrap(
                    err,
                    format!("Unable to get credentials for {}", request.url()),
                );
                return Err(request_context(err, endpoint, &request.head));
            }
        };

        let head = request.head.clone();
        let mut response = match inner.executor.execute(request) {
            Ok(response) => response,
            Err(TransportError::Redirected(response)) => {
                tracing::debug!(url = %head.url, status = response.status(), "redirect not followed");
                *response
            }
            Err(TransportError::Failed(message)) => {
                let err = DiagnosticError::wrap(
                    Error::Transport(message),
                    format!("Error sending HTTP request to {}", head.url),
                );
                return Err(request_context(err, endpoint, &head));
            }
        };

        settle_credentials(inner.credentials.as_ref(), credential.as_ref(), response.status());

        let err = match check {
            Check::Probe => None,
            Check::Classify => classify(&mut response),
            Check::Success => {
                classify(&mut response).or_else(|| unexpected_status(response.status()))
            }
        };
        match err {
            Some(err) => Err(response_context(err, endpoint, &response.head)),
            None => Ok(response),
        }
    }
}

/// A request to a hypermedia link, carrying the link's headers.
fn link_request(method: Method, link: &Link) -> Result<Request> {
    let url = Url::parse(&link.href).map_err(|e| {
        DiagnosticError::wrap(Error::from(e), format!("Invalid link: {}", link.href))
    })?;
    let mut request = Request::new(method, url);
    for (name, value) in &link.header {
        request.headers_mut().set(name, value);
    }
    Ok(request)
}

fn unexpected_status(status: u16) -> Option<DiagnosticError> {
    if (200..300).contains(&status) {
        return None;
    }
    let err = DiagnosticError::new(Error::Protocol(format!(
        "Unexpected HTTP response: {}",
        status
    )));
    Some(if status < 500 { err.non_fatal() } else { err })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credential;
    use crate::http::{Headers, ResponseHead};
    use crate::store::StoredObject;
    use crate::ErrorKind;
    use std::collections::{HashMap, VecDeque};
    use std::io::Cursor;
    use std::sync::Mutex;

    const OID: &str = "4d7a214614ab2935c943f9e0ff69d22eadbb8f32b1258daaa5e2ca24d17e2393";

    #[derive(Debug)]
    struct Seen {
        method: Method,
        url: String,
        headers: Headers,
        body: Vec<u8>,
    }

    enum Reply {
        Status(u16, Vec<(&'static str, String)>, Vec<u8>),
        Redirect(u16),
        Fail(&'static str),
    }

    fn reply(status: u16) -> Reply {
        Reply::Status(status, vec![], vec![])
    }

    fn json_reply(status: u16, body: &str) -> Reply {
        Reply::Status(
            status,
            vec![("Content-Type", META_MEDIA_TYPE.to_string())],
            body.as_bytes().to_vec(),
        )
    }

    /// Answers requests from a script, in order, and records them.
    #[derive(Clone, Default)]
    struct FakeServer {
        seen: Arc<Mutex<Vec<Seen>>>,
        replies: Arc<Mutex<VecDeque<Reply>>>,
    }

    impl FakeServer {
        fn new(replies: Vec<Reply>) -> Self {
            FakeServer {
                seen: Arc::default(),
                replies: Arc::new(Mutex::new(replies.into())),
            }
        }

        fn seen(&self) -> std::sync::MutexGuard<'_, Vec<Seen>> {
            self.seen.lock().unwrap()
        }
    }

    impl HttpExecutor for FakeServer {
        fn execute(&self, request: Request) -> std::result::Result<Response, TransportError> {
            let Request { head, body, .. } = request;
            let body = match body {
                Body::Empty => Vec::new(),
                Body::Bytes(bytes) => bytes,
                Body::Stream { mut reader, .. } => {
                    let mut buf = Vec::new();
                    reader.read_to_end(&mut buf).unwrap();
                    buf
                }
            };
            self.seen.lock().unwrap().push(Seen {
                method: head.method,
                url: head.url.to_string(),
                headers: head.headers.clone(),
                body,
            });

            let next = self.replies.lock().unwrap().pop_front();
            let (status, headers, body, redirected) = match next {
                Some(Reply::Status(status, headers, body)) => (status, headers, body, false),
                Some(Reply::Redirect(status)) => (status, vec![], vec![], true),
                Some(Reply::Fail(message)) => {
                    return Err(TransportError::Failed(message.to_string()))
                }
                None => panic!("unexpected request {} {}", head.method, head.url),
            };

            let mut response_headers = Headers::new();
            for (name, value) in headers {
                response_headers.set(name, &value);
            }
            let response = Response {
                head: ResponseHead {
                    status,
                    reason: String::new(),
                    headers: response_headers,
                    request: head,
                },
                body: Box::new(Cursor::new(body)),
            };
            if redirected {
                return Err(TransportError::Redirected(Box::new(response)));
            }
            Ok(response)
        }
    }

    #[derive(Clone, Default)]
    struct Counter {
        fetched: Arc<Mutex<usize>>,
        approved: Arc<Mutex<usize>>,
        rejected: Arc<Mutex<usize>>,
    }

    impl CredentialProvider for Counter {
        fn fetch(&self, _url: &Url) -> std::result::Result<Credential, Error> {
            *self.fetched.lock().unwrap() += 1;
            Ok(Credential::new("user", "pass"))
        }

        fn approve(&self, _credential: &Credential) {
            *self.approved.lock().unwrap() += 1;
        }

        fn reject(&self, _credential: &Credential) {
            *self.rejected.lock().unwrap() += 1;
        }
    }

    struct MemoryStore(HashMap<String, Vec<u8>>);

    impl ObjectStore for MemoryStore {
        fn open(&self, oid: &Oid) -> io::Result<StoredObject> {
            let content = self
                .0
                .get(oid.as_str())
                .cloned()
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
            Ok(StoredObject {
                size: content.len() as u64,
                reader: Box::new(Cursor::new(content)),
            })
        }
    }

    fn client(server: &FakeServer, creds: &Counter) -> TransferClient {
        let config = EndpointConfig::new("https://git.example.com/repo.git/info/media").unwrap();
        let mut objects = HashMap::new();
        objects.insert(OID.to_string(), vec![b'x'; 100]);
        TransferClient::new(config, MemoryStore(objects))
            .with_executor(server.clone())
            .with_credentials(creds.clone())
    }

    fn object_url() -> String {
        format!("https://git.example.com/repo.git/info/media/objects/{}", OID)
    }

    fn transfer() -> TransferDescriptor {
        TransferDescriptor::new(format!(".git/media/objects/4d/7a/{}", OID))
            .with_display_name("big.bin")
    }

    fn object_body() -> Reply {
        let mut body = b"--abc123\n".to_vec();
        body.extend(vec![b'x'; 100]);
        Reply::Status(
            200,
            vec![
                ("Content-Type", "application/vnd.git-media; header=\"abc123\"".to_string()),
                ("Content-Length", "109".to_string()),
            ],
            body,
        )
    }

    #[test]
    fn test_download() {
        let server = FakeServer::new(vec![object_body()]);
        let creds = Counter::default();
        let mut download = client(&server, &creds).download(OID).unwrap();

        assert_eq!(download.size(), Some(100));
        let mut content = Vec::new();
        download.read_to_end(&mut content).unwrap();
        assert_eq!(content, vec![b'x'; 100]);

        let seen = server.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, Method::Get);
        assert_eq!(seen[0].url, object_url());
        assert_eq!(seen[0].headers.get("Accept"), Some(MEDIA_TYPE));
        assert_eq!(seen[0].headers.get("Authorization"), Some("Basic dXNlcjpwYXNz"));
        assert!(seen[0].headers.get("User-Agent").unwrap().starts_with("hawser/"));
        assert_eq!(*creds.approved.lock().unwrap(), 1);
        assert_eq!(*creds.rejected.lock().unwrap(), 0);
    }

    #[test]
    fn test_download_plain_content_type() {
        let server = FakeServer::new(vec![Reply::Status(
            200,
            vec![
                ("Content-Type", "application/octet-stream".to_string()),
                ("Content-Length", "5".to_string()),
            ],
            b"hello".to_vec(),
        )]);
        let mut download = client(&server, &Counter::default()).download(OID).unwrap();
        assert_eq!(download.size(), Some(5));
        let mut content = String::new();
        download.read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello");
    }

    #[test]
    fn test_download_requires_content_type() {
        let server = FakeServer::new(vec![Reply::Status(200, vec![], b"data".to_vec())]);
        let err = client(&server, &Counter::default()).download(OID).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.get("Status"), Some("200"));
        assert_eq!(err.get("URL"), Some(format!("GET {}", object_url()).as_str()));
    }

    #[test]
    fn test_download_bad_marker() {
        let server = FakeServer::new(vec![Reply::Status(
            200,
            vec![("Content-Type", "application/vnd.git-media; header=\"abc123\"".to_string())],
            b"--abc124\npayload".to_vec(),
        )]);
        let err = client(&server, &Counter::default()).download(OID).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Framing);
        assert_eq!(
            err.get("Response:Content-Type"),
            Some("application/vnd.git-media; header=\"abc123\"")
        );
        assert_eq!(err.get("Request:Authorization"), Some("--"));
    }

    #[test]
    fn test_download_not_found() {
        let server = FakeServer::new(vec![json_reply(404, r#"{"message":"not here"}"#)]);
        let creds = Counter::default();
        let err = client(&server, &creds).download(OID).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!err.is_fatal());
        assert_eq!(*creds.rejected.lock().unwrap(), 1);
        assert_eq!(*creds.approved.lock().unwrap(), 0);
    }

    #[test]
    fn test_download_transport_failure() {
        let server = FakeServer::new(vec![Reply::Fail("connection refused")]);
        let creds = Counter::default();
        let err = client(&server, &creds).download(OID).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.is_fatal());
        assert_eq!(err.get("Endpoint"), Some("https://git.example.com/repo.git/info/media/"));
        assert_eq!(err.get("URL"), Some(format!("GET {}", object_url()).as_str()));
        assert_eq!(err.get("Request:Authorization"), Some("--"));
        assert!(err.get("Status").is_none());
        assert_eq!(*creds.approved.lock().unwrap() + *creds.rejected.lock().unwrap(), 0);
    }

    #[test]
    fn test_upload_already_stored() {
        let server = FakeServer::new(vec![reply(200)]);
        client(&server, &Counter::default()).upload(&transfer()).unwrap();

        let seen = server.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, Method::Post);
        assert_eq!(seen[0].url, "https://git.example.com/repo.git/info/media/objects");
        assert_eq!(seen[0].headers.get("Accept"), Some(META_MEDIA_TYPE));
        let body: serde_json::Value = serde_json::from_slice(&seen[0].body).unwrap();
        assert_eq!(body, serde_json::json!({"oid": OID, "size": 100}));
    }

    #[test]
    fn test_upload_hypermedia() {
        let links = r#"{"_links": {
            "upload": {"href": "https://store/x", "header": {"x-amz-meta": "1"}},
            "verify": {"href": "https://api/verify"}
        }}"#;
        let server = FakeServer::new(vec![json_reply(202, links), reply(200), reply(200)]);

        let progress = Arc::new(Mutex::new(Vec::new()));
        let sink = progress.clone();
        let transfer = transfer()
            .with_progress(move |total: u64, so_far: u64| sink.lock().unwrap().push((total, so_far)));
        client(&server, &Counter::default()).upload(&transfer).unwrap();

        let seen = server.seen();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[1].method, Method::Put);
        assert_eq!(seen[1].url, "https://store/x");
        assert_eq!(seen[1].headers.get("x-amz-meta"), Some("1"));
        assert_eq!(seen[1].headers.get("Content-Length"), Some("100"));
        assert_eq!(seen[1].body, vec![b'x'; 100]);

        assert_eq!(seen[2].method, Method::Post);
        assert_eq!(seen[2].url, "https://api/verify");
        let body: serde_json::Value = serde_json::from_slice(&seen[2].body).unwrap();
        assert_eq!(body, serde_json::json!({"oid": OID, "size": 100}));

        assert_eq!(progress.lock().unwrap().last(), Some(&(100, 100)));
    }

    #[test]
    fn test_upload_link_authorization_skips_credentials() {
        let links = r#"{"_links": {"upload": {"href": "https://store/x", "header": {"Authorization": "RemoteAuth t"}}}}"#;
        let server = FakeServer::new(vec![json_reply(202, links), reply(200)]);
        let creds = Counter::default();
        client(&server, &creds).upload(&transfer()).unwrap();

        let seen = server.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].headers.get("Authorization"), Some("RemoteAuth t"));
        // Only the negotiation asked for credentials.
        assert_eq!(*creds.fetched.lock().unwrap(), 1);
    }

    fn negotiation_url() -> String {
        "POST https://git.example.com/repo.git/info/media/objects".to_string()
    }

    #[test]
    fn test_upload_missing_upload_link() {
        let links = r#"{"_links": {"verify": {"href": "https://api/verify"}}}"#;
        let server = FakeServer::new(vec![json_reply(202, links)]);
        let err = client(&server, &Counter::default()).upload(&transfer()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.cause().to_string(), "No upload link provided");
        assert_eq!(server.seen().len(), 1);

        // The negotiation exchange is what went wrong, so it is recorded.
        assert_eq!(err.get("URL"), Some(negotiation_url().as_str()));
        assert_eq!(err.get("Status"), Some("202"));
        assert_eq!(err.get("Response:Content-Type"), Some(META_MEDIA_TYPE));
        assert_eq!(err.get("Request:Accept"), Some(META_MEDIA_TYPE));
        assert_eq!(err.get("Request:Authorization"), Some("--"));
    }

    #[test]
    fn test_upload_without_links() {
        let server = FakeServer::new(vec![json_reply(202, "{}")]);
        let err = client(&server, &Counter::default()).upload(&transfer()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.cause().to_string(), "No hypermedia links provided");
        assert_eq!(err.get("URL"), Some(negotiation_url().as_str()));
        assert_eq!(err.get("Response:Content-Type"), Some(META_MEDIA_TYPE));
    }

    #[test]
    fn test_upload_undecodable_links() {
        let server = FakeServer::new(vec![json_reply(202, "not json")]);
        let err = client(&server, &Counter::default()).upload(&transfer()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(err.get("Status"), Some("202"));
    }

    #[test]
    fn test_upload_legacy_already_present() {
        let server = FakeServer::new(vec![reply(405), reply(200)]);
        client(&server, &Counter::default()).upload(&transfer()).unwrap();

        let seen = server.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].method, Method::Options);
        assert_eq!(seen[1].url, object_url());
    }

    #[test]
    fn test_upload_legacy_put() {
        let server = FakeServer::new(vec![reply(405), reply(404), reply(200)]);
        let creds = Counter::default();
        client(&server, &creds).upload(&transfer()).unwrap();

        let seen = server.seen();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[1].method, Method::Options);
        assert_eq!(seen[2].method, Method::Put);
        assert_eq!(seen[2].url, object_url());
        assert_eq!(seen[2].headers.get("Content-Type"), Some(MEDIA_TYPE));
        assert_eq!(seen[2].headers.get("Accept"), Some(META_MEDIA_TYPE));
        assert_eq!(seen[2].headers.get("Content-Length"), Some("100"));
        assert_eq!(seen[2].body, vec![b'x'; 100]);

        // 405 says nothing, 404 rejects, 200 approves.
        assert_eq!(*creds.rejected.lock().unwrap(), 1);
        assert_eq!(*creds.approved.lock().unwrap(), 1);
    }

    #[test]
    fn test_upload_redirect_is_legacy() {
        let server = FakeServer::new(vec![Reply::Redirect(302), reply(204), reply(201)]);
        client(&server, &Counter::default()).upload(&transfer()).unwrap();

        let methods: Vec<_> = server.seen().iter().map(|s| s.method).collect();
        assert_eq!(methods, vec![Method::Post, Method::Options, Method::Put]);
    }

    #[test]
    fn test_upload_unexpected_status() {
        let server = FakeServer::new(vec![Reply::Status(
            201,
            vec![("X-Trace", "t-1".to_string())],
            vec![],
        )]);
        let err = client(&server, &Counter::default()).upload(&transfer()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(err.message().contains("201"));
        assert_eq!(server.seen().len(), 1);

        assert_eq!(
            err.get("Endpoint"),
            Some("https://git.example.com/repo.git/info/media/")
        );
        assert_eq!(err.get("URL"), Some(negotiation_url().as_str()));
        assert_eq!(err.get("Status"), Some("201"));
        assert_eq!(err.get("Response:X-Trace"), Some("t-1"));
        assert_eq!(err.get("Request:Authorization"), Some("--"));
    }

    #[test]
    fn test_upload_negotiation_server_error() {
        let server = FakeServer::new(vec![json_reply(500, r#"{"message":"boom"}"#)]);
        let err = client(&server, &Counter::default()).upload(&transfer()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServerFault);
        assert!(err.is_fatal());
        assert_eq!(err.message(), "Error starting file upload of big.bin");
        assert_eq!(err.get("Detail"), Some("Invalid response: 500"));
    }

    #[test]
    fn test_upload_storage_failure_skips_verify() {
        let links = r#"{"_links": {
            "upload": {"href": "https://store/x"},
            "verify": {"href": "https://api/verify"}
        }}"#;
        let server = FakeServer::new(vec![
            json_reply(202, links),
            json_reply(403, r#"{"message":"expired"}"#),
        ]);
        let err = client(&server, &Counter::default()).upload(&transfer()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(!err.is_fatal());
        assert!(err.message().starts_with("Error uploading file big.bin"));
        assert_eq!(server.seen().len(), 2);
    }

    #[test]
    fn test_upload_missing_local_object() {
        let server = FakeServer::new(vec![]);
        let err = client(&server, &Counter::default())
            .upload(&TransferDescriptor::new(".git/media/objects/deadbeef"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(server.seen().is_empty());
    }

    #[test]
    fn test_client_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TransferClient>();

        let server = FakeServer::new(vec![]);
        let a = client(&server, &Counter::default());
        let b = a.clone();
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
    }
}
