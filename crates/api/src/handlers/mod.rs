pub mod delay;

pub use delay::delay_handler;

use actix_web::{
    error::PathError, http::StatusCode, web, HttpRequest, HttpResponse, ResponseError,
};
use delay_echo_domain::services::delay::DelayError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use self::delay::{record_outcome, DelayOutcome};

/// Mounts the single `/delay/{millis}` resource.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/delay/{millis}")
            .app_data(web::PathConfig::default().error_handler(reject_path))
            .route(web::get().to(delay_handler)),
    );
}

/// Rejects malformed delay segments before the handler runs.
fn reject_path(err: PathError, _req: &HttpRequest) -> actix_web::Error {
    record_outcome(DelayOutcome::Rejected);
    ApiError::InvalidDelay(err.to_string()).into()
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid delay: {0}")]
    InvalidDelay(String),
    #[error(transparent)]
    Delay(#[from] DelayError),
    #[error("blocking worker pool unavailable")]
    WorkerPool,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidDelay(_) => StatusCode::BAD_REQUEST,
            ApiError::Delay(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::WorkerPool => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
