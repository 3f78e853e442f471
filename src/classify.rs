//! Turn error statuses into [`DiagnosticError`]s.

use crate::error::{Error, ServerError};
use crate::http::Response;
use crate::DiagnosticError;

/// Classify a response by status.
///
/// Statuses below 400 are not errors, and neither is 405, which legacy
/// servers use to decline upload negotiation. Anything else reads the
/// JSON error body. Errors for statuses below 500 are non-fatal.
pub fn classify(response: &mut Response) -> Option<DiagnosticError> {
    let status = response.status();
    if status < 400 || status == 405 {
        return None;
    }

    let err = match serde_json::from_reader::<_, ServerError>(&mut response.body) {
        Err(err) => DiagnosticError::wrap(Error::Json(err), "Error decoding JSON from response"),
        Ok(server_error) => {
            let url = &response.request().url;
            match status {
                401 | 403 => DiagnosticError::wrap(
                    Error::Auth(server_error),
                    format!(
                        "Authorization error: {}\nCheck that you have access to the repository.",
                        url
                    ),
                ),
                404 => DiagnosticError::wrap(
                    Error::NotFound(server_error),
                    format!(
                        "Repository not found: {}\nCheck that it exists and that you have access to it.",
                        url
                    ),
                ),
                _ if status >= 500 => DiagnosticError::wrap(
                    Error::ServerFault {
                        status,
                        source: server_error,
                    },
                    format!("Invalid response: {}", status),
                ),
                _ => DiagnosticError::wrap(
                    Error::ClientFault {
                        status,
                        source: server_error,
                    },
                    format!("Invalid response: {}", status),
                ),
            }
        }
    };

    let err = match err_request_id(&err) {
        Some(request_id) => err.with_context("Request-Id", request_id),
        None => err,
    };
    Some(mark_fatality(err, status))
}

fn err_request_id(err: &DiagnosticError) -> Option<String> {
    let server_error = match err.cause() {
        Error::Auth(e) | Error::NotFound(e) => e,
        Error::ClientFault { source, .. } | Error::ServerFault { source, .. } => source,
        _ => return None,
    };
    server_error.request_id.clone()
}

fn mark_fatality(err: DiagnosticError, status: u16) -> DiagnosticError {
    if status < 500 {
        err.non_fatal()
    } else {
        err
    }
}
