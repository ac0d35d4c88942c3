use axum::{
    http,
    response::{IntoResponse, Response},
};
pub type WebResult<T> = std::result::Result<T, WebError>;

#[derive(thiserror::Error, Debug)]
pub enum WebError {
    #[error("Internal Server Error: {0}")]
    Internal(#[from] anyhow::Error),
    #[error("Templating error: {0:#}")]
    Template(#[from] minijinja::Error),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unsupported upload: {0}")]
    UnsupportedMedia(String),
    #[error("Upload too large: {0}")]
    PayloadTooLarge(String),
    #[error("Not found")]
    NotFound,
}

impl From<axum::extract::multipart::MultipartError> for WebError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        if err.status() == http::StatusCode::PAYLOAD_TOO_LARGE {
            WebError::PayloadTooLarge(err.body_text())
        } else {
            WebError::BadRequest(err.body_text())
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let display = self.to_string();
        match self {
            WebError::Internal(ref err) => {
                tracing::error!(error = ?err, "Request failed");
                (http::StatusCode::INTERNAL_SERVER_ERROR, display).into_response()
            }
            WebError::Template(ref err) => {
                tracing::error!(error = %err, "Template rendering failed");
                (http::StatusCode::INTERNAL_SERVER_ERROR, display).into_response()
            }
            // Upload problems are always explained
            WebError::BadRequest(_) => (http::StatusCode::BAD_REQUEST, display).into_response(),
            WebError::UnsupportedMedia(_) => {
                (http::StatusCode::UNSUPPORTED_MEDIA_TYPE, display).into_response()
            }
            WebError::PayloadTooLarge(_) => {
                (http::StatusCode::PAYLOAD_TOO_LARGE, display).into_response()
            }
            WebError::NotFound => (http::StatusCode::NOT_FOUND, "Not Found").into_response(),
        }
    }
}
