//! # hawser
//!
//! Client for the git-media object transfer protocol.
//!
//! Large files live outside the Git object store and are addressed by a
//! content hash (OID). This crate moves them between a local object store
//! and a media endpoint:
//! - Download with validation of the boundary marker that prefixes bodies
//! - Upload through negotiation, either straight to the endpoint (legacy
//!   OPTIONS + PUT) or through hypermedia `upload`/`verify` links
//! - Credential lookup, approval and rejection via `git credential`
//! - Errors that carry the request and response details needed to
//!   diagnose them
//!
//! ## Example
//!
//! ```no_run
//! use hawser::{EndpointConfig, LocalObjectStore, TransferClient, TransferDescriptor};
//! use std::io::Read;
//!
//! let config = EndpointConfig::from_remote("https://github.com/owner/repo.git").unwrap();
//! let store = LocalObjectStore::for_repo(".git");
//! let client = TransferClient::new(config, store.clone());
//!
//! // Upload a stored object
//! let oid = store.put(b"a large file").unwrap();
//! let transfer = TransferDescriptor::new(store.object_path(&oid)).with_display_name("big.bin");
//! client.upload(&transfer).unwrap();
//!
//! // Download it again
//! let mut download = client.download(store.object_path(&oid)).unwrap();
//! let mut content = Vec::new();
//! download.read_to_end(&mut content).unwrap();
//! ```

mod classify;
mod client;
mod config;
mod context;
mod credentials;
mod error;
mod http;
mod links;
mod media;
mod oid;
mod progress;
mod request;
mod store;

pub use classify::classify;
pub use client::{Download, Negotiation, TransferClient, TransferDescriptor};
pub use config::{EndpointConfig, USER_AGENT};
pub use context::{request_context, response_context};
pub use credentials::{Credential, CredentialProvider, GitCredentialHelper, StaticCredentials};
pub use error::{DiagnosticError, Error, ErrorKind, Result, ServerError};
pub use http::{
    Body, Headers, HttpExecutor, Method, RedirectPolicy, Request, RequestHead, Response,
    ResponseHead, TransportError, UreqExecutor, MAX_REDIRECTS,
};
pub use links::{Link, LinkMetadata, ObjectSpec, REL_UPLOAD, REL_VERIFY};
pub use media::{validate_media_header, MediaType, MEDIA_TYPE, META_MEDIA_TYPE};
pub use oid::Oid;
pub use progress::{ProgressObserver, ProgressReader};
pub use request::{attach_credentials, settle_credentials, Verdict};
pub use store::{LocalObjectStore, ObjectStore, StoredObject};
