use actix_web::{http::header::ContentType, web, HttpResponse};
use metrics::{counter, histogram};
use strum_macros::IntoStaticStr;
use tracing::error;

use crate::state::AppState;

use super::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum DelayOutcome {
    Completed,
    Interrupted,
    Rejected,
    PoolUnavailable,
}

pub fn record_outcome(outcome: DelayOutcome) {
    let label: &'static str = outcome.into();
    counter!("delay_requests_total", "outcome" => label).increment(1);
}

/// `GET /delay/{millis}`: waits on the blocking pool, then answers with the
/// timing line.
pub async fn delay_handler(
    state: web::Data<AppState>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let requested_millis = path.into_inner();
    histogram!("delay_requested_millis").record(requested_millis as f64);

    let responder = state.responder().clone();
    let outcome = web::block(move || responder.handle_delay(requested_millis))
        .await
        .map_err(|err| {
            error!(%err, requested_millis, "blocking pool rejected delay");
            record_outcome(DelayOutcome::PoolUnavailable);
            ApiError::WorkerPool
        })?;
    let report = outcome.inspect_err(|_| record_outcome(DelayOutcome::Interrupted))?;

    record_outcome(DelayOutcome::Completed);
    Ok(HttpResponse::Ok()
        .content_type(ContentType::plaintext())
        .body(report.to_line()))
}
