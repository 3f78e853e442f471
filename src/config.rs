//! Endpoint configuration.

use url::Url;

use crate::{Error, Oid};

/// Default `User-Agent` sent with every request.
pub const USER_AGENT: &str = concat!("hawser/", env!("CARGO_PKG_VERSION"));

/// Where objects live on the remote, built once before any transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// The media endpoint, always with a trailing slash.
    endpoint: Url,
    user_agent: String,
}

impl EndpointConfig {
    /// Use `endpoint` as the media endpoint.
    pub fn new(endpoint: &str) -> Result<Self, Error> {
        let mut url = Url::parse(endpoint.trim())?;
        if url.cannot_be_a_base() {
            return Err(Error::InvalidUrl(format!(
                "{} cannot be used as an endpoint",
                endpoint
            )));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(EndpointConfig {
            endpoint: url,
            user_agent: USER_AGENT.to_string(),
        })
    }

    /// Derive the media endpoint from a Git remote URL.
    ///
    /// `https://host/owner/repo` and `git@host:owner/repo` both become
    /// `https://host/owner/repo.git/info/media/`.
    pub fn from_remote(remote: &str) -> Result<Self, Error> {
        let remote = remote.trim();

        // git@github.com:owner/repo.git
        if let Some(rest) = remote.strip_prefix("git@") {
            let (host, path) = rest
                .split_once(':')
                .ok_or_else(|| Error::InvalidUrl(format!("malformed SSH remote: {}", remote)))?;
            let path = path.trim_start_matches('/');
            return Self::new(&format!("https://{}/{}/info/media", host, with_git_suffix(path)));
        }

        let mut url = Url::parse(remote)?;
        let path = with_git_suffix(url.path().trim_end_matches('/'));
        url.set_path(&format!("{}/info/media", path));
        Self::new(url.as_str())
    }

    /// Override the `User-Agent` header.
    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    /// The endpoint as recorded in error context.
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// URL of a single object: `<endpoint>/objects/<oid>`.
    pub fn object_url(&self, oid: &Oid) -> Url {
        self.objects_url(Some(oid))
    }

    /// URL upload negotiations are posted to: `<endpoint>/objects`.
    pub fn negotiation_url(&self) -> Url {
        self.objects_url(None)
    }

    fn objects_url(&self, oid: Option<&Oid>) -> Url {
        let mut url = self.endpoint.clone();
        // Checked in `new`, the endpoint is always hierarchical.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("objects");
            if let Some(oid) = oid {
                segments.push(oid.as_str());
            }
        }
        url
    }
}

fn with_git_suffix(path: &str) -> String {
    if path.ends_with(".git") {
        path.to_string()
    } else {
        format!("{}.git", path)
    }
}
