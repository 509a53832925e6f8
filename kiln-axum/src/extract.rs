//! Request and response types for the render endpoint.

use std::fmt;

use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use kiln::{ErrorBody, ErrorKind, RenderResponse};

/// A request body that is some JSON value.
///
/// The shape is not checked here: [`kiln::RenderRequest::from_body`] does
/// that, so every shape problem gets the same validation message whether
/// it came over HTTP or not. Unlike `axum::Json` no content type is
/// required.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderBody(pub serde_json::Value);

impl RenderBody {
    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }
}

/// Why a request body could not be read as JSON.
#[derive(Debug)]
pub struct BodyRejection {
    kind: BodyRejectionKind,
}

#[derive(Debug)]
enum BodyRejectionKind {
    /// The body could not be read
    Body(axum::Error),
    /// The body is not JSON at all
    NotJson(serde_json::Error),
}

impl BodyRejection {
    pub fn status(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    pub fn is_body_error(&self) -> bool {
        matches!(self.kind, BodyRejectionKind::Body(_))
    }

    pub fn is_not_json(&self) -> bool {
        matches!(self.kind, BodyRejectionKind::NotJson(_))
    }

    /// The wire-format error this rejection is answered with.
    pub fn error_body(&self) -> ErrorBody {
        let (error, details) = match &self.kind {
            BodyRejectionKind::Body(err) => ("Failed to read request body", err.to_string()),
            BodyRejectionKind::NotJson(err) => {
                ("Request body must be a JSON object", err.to_string())
            }
        };
        ErrorBody {
            error: error.to_string(),
            details: Some(details),
            kind: Some(ErrorKind::Validation),
            line: None,
            raw: None,
        }
    }
}

impl fmt::Display for BodyRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            BodyRejectionKind::Body(err) => write!(f, "Failed to read request body: {err}"),
            BodyRejectionKind::NotJson(err) => write!(f, "Request body is not JSON: {err}"),
        }
    }
}

impl std::error::Error for BodyRejection {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            BodyRejectionKind::Body(err) => Some(err),
            BodyRejectionKind::NotJson(err) => Some(err),
        }
    }
}

impl IntoResponse for BodyRejection {
    fn into_response(self) -> Response {
        tracing::debug!(rejection = %self, "rejected render request");
        (self.status(), Json(self.error_body())).into_response()
    }
}

impl<S> FromRequest<S> for RenderBody
where
    S: Send + Sync,
{
    type Rejection = BodyRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|err| BodyRejection {
                kind: BodyRejectionKind::Body(axum::Error::new(err)),
            })?;
        let value = serde_json::from_slice(&bytes).map_err(|err| BodyRejection {
            kind: BodyRejectionKind::NotJson(err),
        })?;
        Ok(RenderBody(value))
    }
}

/// A [`RenderResponse`] sent with the status code it calls for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderReply(pub RenderResponse);

impl IntoResponse for RenderReply {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}

impl From<RenderResponse> for RenderReply {
    fn from(response: RenderResponse) -> Self {
        Self(response)
    }
}
