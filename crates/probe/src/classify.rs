//! Classification of non-success usage-endpoint responses
//!
//! Only authentication rejections mark a credential invalid. Everything else,
//! including rate limits and gateway timeouts, is a transient read failure
//! that leaves the credential's state untouched.

use crate::ProbeError;

/// Maximum number of body characters carried into an error message.
const BODY_EXCERPT_CHARS: usize = 200;

/// Classify a non-success HTTP status (and body) from the usage endpoint.
///
/// 401/403 are `Auth` (credential revoked or wrong). 408/504 and all other
/// statuses are `Network`: the read failed, but says nothing about the key.
pub fn classify_status(status: u16, body: &str) -> ProbeError {
    let excerpt = excerpt(body);
    match status {
        401 | 403 => ProbeError::Auth(format!("usage endpoint returned {status}: {excerpt}")),
        408 | 504 => ProbeError::Network(format!("usage endpoint timed out ({status}): {excerpt}")),
        _ => ProbeError::Network(format!("usage endpoint returned {status}: {excerpt}")),
    }
}

/// Truncate a response body on a char boundary for inclusion in errors.
pub(crate) fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return String::from("<no body>");
    }
    match trimmed.char_indices().nth(BODY_EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
