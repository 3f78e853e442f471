//! Identification and authorization headers, and what happens to the
//! credential once the response is in.

use base64::Engine;

use crate::credentials::{Credential, CredentialProvider};
use crate::http::Request;
use crate::Error;

/// Set `User-Agent` and, unless the request already carries one,
/// an `Authorization: Basic` header.
///
/// Returns the credential that was attached so it can be settled after the
/// response arrives, or `None` when the caller supplied its own
/// authorization.
pub fn attach_credentials(
    request: &mut Request,
    provider: &dyn CredentialProvider,
    user_agent: &str,
) -> Result<Option<Credential>, Error> {
    request.headers_mut().set("User-Agent", user_agent);

    if request.headers().contains("Authorization") {
        return Ok(None);
    }

    let credential = provider.fetch(request.url())?;
    let token = format!("{}:{}", credential.username(), credential.password());
    let encoded = base64::engine::general_purpose::STANDARD.encode(token.as_bytes());
    request
        .headers_mut()
        .set("Authorization", &format!("Basic {}", encoded));
    Ok(Some(credential))
}

/// What to tell the credential provider about a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approve,
    Reject,
}

impl Verdict {
    /// `< 300` approves, `300..405` rejects, anything from 405 up says nothing.
    ///
    /// 405 is how legacy servers decline upload negotiation, so it cannot be
    /// read as a credential failure.
    pub fn for_status(status: u16) -> Option<Verdict> {
        match status {
            0..=299 => Some(Verdict::Approve),
            300..=404 => Some(Verdict::Reject),
            _ => None,
        }
    }
}

/// Report a response status back to the provider of `credential`.
pub fn settle_credentials(
    provider: &dyn CredentialProvider,
    credential: Option<&Credential>,
    status: u16,
) {
    let Some(credential) = credential else {
        return;
    };
    match Verdict::for_status(status) {
        Some(Verdict::Approve) => provider.approve(credential),
        Some(Verdict::Reject) => provider.reject(credential),
        None => {}
    }
}
