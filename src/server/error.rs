use crate::operation::OperationError;
use http_body_util::Full;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Method, Response, StatusCode, body::Bytes};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no route for {0}")]
    NotFound(String),

    #[error("method {method} is not allowed for {path}")]
    MethodNotAllowed { method: Method, path: String },

    #[error("invalid request body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid query string: {0}")]
    Query(#[from] serde_urlencoded::de::Error),

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    kind: &'a str,
    message: String,
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::MethodNotAllowed { .. } => "method_not_allowed",
            ApiError::Json(_) | ApiError::Query(_) => "bad_request",
            ApiError::Operation(e) => e.kind(),
            ApiError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Json(_) | ApiError::Query(_) => StatusCode::BAD_REQUEST,
            ApiError::Operation(e) => {
                StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn into_response(self) -> Response<Full<Bytes>> {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(error = %message, "api request failed");
        } else {
            tracing::warn!(error = %message, "api request rejected");
        }

        let body = ErrorResponse {
            kind: self.kind(),
            message,
        };
        let json = serde_json::to_vec(&body).unwrap_or_else(|_| {
            b"{\"kind\":\"internal\",\"message\":\"serialization error\"}".to_vec()
        });

        let mut resp = Response::new(Full::new(Bytes::from(json)));
        *resp.status_mut() = status;
        resp.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImageRef, OperationKind, VolumeName};
    use crate::progress::VolumeBusy;

    #[test]
    fn test_status_mapping() {
        let busy = ApiError::from(OperationError::from(VolumeBusy {
            volume: VolumeName::new("data").unwrap(),
            active: OperationKind::Export,
        }));
        assert_eq!(busy.status(), StatusCode::CONFLICT);
        assert_eq!(busy.kind(), "busy");

        let auth = ApiError::from(OperationError::RegistryAuth {
            image: ImageRef::new("ghcr.io/acme/data").unwrap(),
            message: "denied".into(),
        });
        assert_eq!(auth.status(), StatusCode::UNAUTHORIZED);

        let invalid = ApiError::from(OperationError::validation("path", "missing value"));
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(invalid.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
