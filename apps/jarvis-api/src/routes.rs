use axum::{
	Json, Router,
	extract::{
		Path, State,
		rejection::{JsonRejection, PathRejection},
	},
	http::{HeaderValue, StatusCode},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;
use time::OffsetDateTime;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use uuid::Uuid;

use jarvis_domain::query::CandidateQuery;
use jarvis_service::{Branch, ChatFailure, ChatRequest, Error, HistoryMessage};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	let cors = cors_layer(&state.service.cfg.service.cors_allowed_origins);

	Router::new()
		.route("/api/health", get(health))
		.route("/api/chat", post(chat))
		.route("/api/conversations/{conversation_id}/messages", get(conversation_messages))
		.layer(cors)
		.with_state(state)
}

/// Credentialed CORS for the configured origins. Methods and headers mirror the preflight.
fn cors_layer(origins: &[String]) -> CorsLayer {
	let origins = origins
		.iter()
		.filter_map(|origin| match HeaderValue::from_str(origin) {
			Ok(value) => Some(value),
			Err(err) => {
				tracing::warn!(%origin, error = %err, "Skipping unusable CORS origin.");

				None
			},
		})
		.collect::<Vec<_>>();

	CorsLayer::new()
		.allow_origin(AllowOrigin::list(origins))
		.allow_methods(AllowMethods::mirror_request())
		.allow_headers(AllowHeaders::mirror_request())
		.allow_credentials(true)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
	pub status: &'static str,
	pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
	pub message: String,
	pub conversation_id: Uuid,
	pub message_id: Option<Uuid>,
	pub user_message_id: Uuid,
	#[serde(with = "jarvis_service::time_serde")]
	pub timestamp: OffsetDateTime,
	pub search_used: bool,
	pub queries_used: Vec<CandidateQuery>,
	pub branch: Branch,
	pub persisted: bool,
	pub truncated: bool,
	pub trace_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ConversationMessagesResponse {
	pub conversation_id: Uuid,
	pub messages: Vec<HistoryMessage>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
	let status = match state.service.health().await {
		Ok(()) => "healthy",
		Err(err) => {
			tracing::warn!(error = %err, "Health probe failed.");

			"unhealthy"
		},
	};

	Json(HealthResponse { status, version: jarvis_cli::VERSION })
}

async fn chat(
	State(state): State<AppState>,
	payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
	let Json(request) = payload.map_err(|err| {
		json_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.body_text())
	})?;
	let outcome = state.service.handle(request).await?;

	Ok(Json(ChatResponse {
		message: outcome.text,
		conversation_id: outcome.conversation_id,
		message_id: outcome.message_id,
		user_message_id: outcome.user_message_id,
		timestamp: outcome.created_at,
		search_used: outcome.search_used,
		queries_used: outcome.queries_used,
		branch: outcome.branch,
		persisted: outcome.persisted,
		truncated: outcome.truncated,
		trace_id: outcome.trace_id,
	}))
}

async fn conversation_messages(
	State(state): State<AppState>,
	conversation_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ConversationMessagesResponse>, ApiError> {
	let Path(conversation_id) = conversation_id.map_err(|err| {
		json_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.body_text())
	})?;
	let messages = state.service.history(conversation_id).await?;

	Ok(Json(ConversationMessagesResponse { conversation_id, messages }))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	stage: Option<&'static str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	trace_id: Option<Uuid>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	stage: Option<&'static str>,
	trace_id: Option<Uuid>,
}
impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			status,
			error_code: error_code.into(),
			message: message.into(),
			stage: None,
			trace_id: None,
		}
	}
}

pub fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
	ApiError::new(status, code, message)
}

fn status_for(err: &Error) -> StatusCode {
	match err {
		Error::Validation { .. } => StatusCode::BAD_REQUEST,
		Error::Provider { .. } | Error::MalformedResponse { .. } => StatusCode::BAD_GATEWAY,
		Error::Persistence { .. } => StatusCode::SERVICE_UNAVAILABLE,
	}
}

impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		json_error(status_for(&err), err.kind(), err.to_string())
	}
}

impl From<ChatFailure> for ApiError {
	fn from(failure: ChatFailure) -> Self {
		let mut api = ApiError::from(failure.error);

		api.stage = Some(failure.stage.as_str());
		api.trace_id = Some(failure.trace_id);

		api
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody {
			error_code: self.error_code,
			message: self.message,
			stage: self.stage,
			trace_id: self.trace_id,
		};

		(self.status, Json(body)).into_response()
	}
}
