use kiln::{ErrorBody, ErrorKind};
use thiserror::Error;

/// A failed render as shown to the user.
///
/// `details` is a short line such as `Error on line 4`; `raw` holds the
/// template lines around the failure when the engine could locate it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PreviewError {
    pub message: String,
    pub details: Option<String>,
    /// Absent when the failure never reached the engine
    pub kind: Option<ErrorKind>,
    /// Template lines around the failure, as produced by the engine
    pub raw: Option<String>,
}

impl PreviewError {
    pub fn new(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            message: message.into(),
            details,
            kind: None,
            raw: None,
        }
    }

    /// The render call itself failed, so no response body was received.
    pub fn network(details: impl Into<String>) -> Self {
        Self::new("Network error", Some(details.into()))
    }
}

impl From<ErrorBody> for PreviewError {
    fn from(body: ErrorBody) -> Self {
        Self {
            message: body.error,
            // an empty detail string means there is nothing to show
            details: body.details.filter(|details| !details.is_empty()),
            kind: body.kind,
            raw: body.raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_failures_keep_their_context() {
        let body = ErrorBody {
            error: "ReferenceError: user is not defined".to_string(),
            details: Some(String::new()),
            kind: Some(ErrorKind::Runtime),
            line: Some(2),
            raw: Some("template:2\n >> 2| <%= user %>".to_string()),
        };
        let error = PreviewError::from(body);
        assert_eq!(error.details, None);
        assert_eq!(error.raw.as_deref(), Some("template:2\n >> 2| <%= user %>"));

        let network = PreviewError::network("connection refused");
        assert_eq!(network.message, "Network error");
        assert_eq!(network.raw, None);
    }
}
