//! Attach request/response details to a [`DiagnosticError`].

use crate::http::{Headers, RequestHead, ResponseHead};
use crate::DiagnosticError;

/// Headers whose values never end up in error context.
const HIDDEN_HEADERS: &[&str] = &["Authorization"];

/// Placeholder recorded instead of a hidden header's value.
const REDACTED: &str = "--";

/// Record the endpoint, `"<method> <url>"` and every request header.
pub fn request_context(
    err: DiagnosticError,
    endpoint: &str,
    request: &RequestHead,
) -> DiagnosticError {
    let err = err
        .with_context("Endpoint", endpoint)
        .with_context("URL", format!("{} {}", request.method, request.url));
    header_context(err, "Request", &request.headers)
}

/// Record the status line and response headers, then everything
/// [`request_context`] records for the originating request.
pub fn response_context(
    err: DiagnosticError,
    endpoint: &str,
    response: &ResponseHead,
) -> DiagnosticError {
    let err = err.with_context("Status", response.status_line());
    let err = header_context(err, "Response", &response.headers);
    request_context(err, endpoint, &response.request)
}

fn header_context(mut err: DiagnosticError, prefix: &str, headers: &Headers) -> DiagnosticError {
    for (name, value) in headers.iter() {
        let hidden = HIDDEN_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name));
        let value = if hidden { REDACTED } else { value };
        err = err.with_context(format!("{}:{}", prefix, name), value);
    }
    err
}
