use axum::{
    body::Body,
    http::{Response, StatusCode},
    response::IntoResponse,
};

use crate::ports::provider::ProviderError;
use crate::services::error::ServiceError;

// A generic error report
// Produced via `Err(some_err).wrap_err("Some context")`
// or `Err(color_eyre::eyre::Report::new(SomeError))`
pub struct Report(color_eyre::Report);

impl std::fmt::Debug for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl<E> From<E> for Report
where
    E: Into<color_eyre::Report>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

// Tell axum how to convert `Report` into a response.
impl IntoResponse for Report {
    fn into_response(self) -> Response<Body> {
        let err = self.0;

        if let Some(service_err) = err.downcast_ref::<ServiceError>() {
            let status = match service_err {
                ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
                ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
                // Connection state the caller has to repair first
                ServiceError::ServiceNotConnected { .. } | ServiceError::TokenExpired { .. } => {
                    StatusCode::CONFLICT
                }
                ServiceError::Provider(ProviderError::RateLimited { .. }) => {
                    StatusCode::TOO_MANY_REQUESTS
                }
                ServiceError::Provider(_) => StatusCode::BAD_GATEWAY,
            };
            log::warn!("Request failed ({status}): {service_err}");
            return (status, service_err.to_string()).into_response();
        }

        let err_string = format!("{err:?}");
        log::error!("{err_string}");

        // Fallback
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Something went wrong".to_string(),
        )
            .into_response()
    }
}
