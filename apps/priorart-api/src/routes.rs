use axum::{
	Json, Router,
	extract::{Path, Query, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;
use uuid::Uuid;

use crate::state::AppState;
use priorart_service::{
	Error as ServiceError, JobStatus, ReportFlagRequest, ReportFlagResponse, ResultsResponse,
	StatusQuery, TriggerRequest, TriggerResponse,
};

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/search/trigger", post(trigger))
		.route("/v1/search/jobs/{job_token}", get(job_status))
		.route("/v1/search/status", get(latest_status))
		.route("/v1/results/report_flag", post(report_flag))
		.route("/v1/results/{disclosure_id}", get(results))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn trigger(
	State(state): State<AppState>,
	Json(payload): Json<TriggerRequest>,
) -> Result<Json<TriggerResponse>, ApiError> {
	let response = state.service.trigger(payload).await?;

	Ok(Json(response))
}

async fn job_status(
	State(state): State<AppState>,
	Path(job_token): Path<Uuid>,
) -> Result<Json<JobStatus>, ApiError> {
	let response = state.service.job_status(job_token).await?;

	Ok(Json(response))
}

async fn latest_status(
	State(state): State<AppState>,
	Query(query): Query<StatusQuery>,
) -> Result<Json<JobStatus>, ApiError> {
	let response = state.service.latest_status(query).await?;

	Ok(Json(response))
}

async fn results(
	State(state): State<AppState>,
	Path(disclosure_id): Path<String>,
) -> Result<Json<ResultsResponse>, ApiError> {
	let response = state.service.results(&disclosure_id).await?;

	Ok(Json(response))
}

async fn report_flag(
	State(state): State<AppState>,
	Json(payload): Json<ReportFlagRequest>,
) -> Result<Json<ReportFlagResponse>, ApiError> {
	let response = state.service.set_report_flag(payload).await?;

	Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}
impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into() }
	}

	pub fn status(&self) -> StatusCode {
		self.status
	}

	pub fn error_code(&self) -> &str {
		&self.error_code
	}
}
impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::InvalidRequest { message } =>
				ApiError::new(StatusCode::BAD_REQUEST, "invalid_request", message),
			ServiceError::NotFound { message } =>
				ApiError::new(StatusCode::NOT_FOUND, "not_found", message),
			ServiceError::Provider(err) => {
				tracing::error!(error = %err, "Provider call failed.");

				ApiError::new(StatusCode::BAD_GATEWAY, "provider_error", err.to_string())
			},
			ServiceError::Storage { message } => {
				tracing::error!(error = %message, "Storage call failed.");

				ApiError::new(
					StatusCode::INTERNAL_SERVER_ERROR,
					"storage_error",
					"Storage request failed.",
				)
			},
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn service_errors_map_to_statuses() {
		let cases = [
			(
				ServiceError::InvalidRequest { message: "bad".to_string() },
				StatusCode::BAD_REQUEST,
				"invalid_request",
			),
			(
				ServiceError::NotFound { message: "gone".to_string() },
				StatusCode::NOT_FOUND,
				"not_found",
			),
			(
				ServiceError::Provider(priorart_providers::Error::Auth {
					message: "denied".to_string(),
				}),
				StatusCode::BAD_GATEWAY,
				"provider_error",
			),
			(
				ServiceError::Storage { message: "pool timed out".to_string() },
				StatusCode::INTERNAL_SERVER_ERROR,
				"storage_error",
			),
		];

		for (err, status, code) in cases {
			let api = ApiError::from(err);

			assert_eq!(api.status(), status);
			assert_eq!(api.error_code(), code);
		}
	}

	#[test]
	fn storage_details_stay_out_of_the_response() {
		let api = ApiError::from(ServiceError::Storage { message: "password=hunter2".to_string() });

		assert!(!api.message.contains("hunter2"));
	}
}
