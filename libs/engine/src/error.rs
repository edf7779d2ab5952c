use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to load configuration: {0}")]
    ConfigLoad(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("failed to persist configuration: {0}")]
    ConfigPersist(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("{0} {1} already exists")]
    Conflict(&'static str, String),

    #[error("{0} {1} not found")]
    NotFound(&'static str, String),

    #[error("invalid {0}: {1}")]
    BadRequest(&'static str, String),

    #[error("failed to parse template {0}: {1}")]
    TemplateParse(String, String),

    #[error("failed to decode rendered manifest for template {0}: {1}")]
    ManifestDecode(String, String),

    #[error(transparent)]
    OrchestratorCall(#[from] fleetctl_k8s_util::Error),

    #[error("{0} \"{1}\" referenced by {2} not found")]
    Missing(&'static str, String, String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Error::Conflict(..) => StatusCode::CONFLICT,
            Error::NotFound(..) => StatusCode::NOT_FOUND,
            Error::BadRequest(..) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
