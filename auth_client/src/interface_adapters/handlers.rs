use crate::domain::entities::InboundMessage;
use crate::domain::ports::{CodeExchange, HostEnvironment};
use crate::interface_adapters::protocol::{CallbackQuery, ErrorResponse, MessageDelivered};
use crate::interface_adapters::state::AppState;
use crate::use_cases::handshake_message::{AUTH_ERROR, AUTH_SUCCESS};
use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header::ORIGIN},
};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

const CALLBACK_DONE_PAGE: &str = "Sign-in finished. You can close this window.";
const CALLBACK_FAILED_PAGE: &str = "Sign-in failed. You can close this window and try again.";

// Handler for cross-context messages posted by the sign-in window's page.
pub async fn post_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MessageDelivered>, (StatusCode, Json<ErrorResponse>)> {
    let data: Value = serde_json::from_slice(&body)
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "message body must be JSON"))?;
    // Browsers always send Origin on cross-origin POSTs; a missing one never matches.
    let origin = headers
        .get(ORIGIN)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let delivered = state.host.deliver(InboundMessage { origin, data });
    debug!(delivered, "message delivered");

    Ok(Json(MessageDelivered { delivered }))
}

// Handler for the provider redirect target. The outcome is delivered to the
// pending attempt under the host's own origin.
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> &'static str {
    if let Some(error) = query.error {
        let message = query.error_description.unwrap_or(error);
        info!(error = %message, "provider redirected with an error");
        deliver_error(&state, message);
        return CALLBACK_FAILED_PAGE;
    }

    let Some(code) = query.code else {
        debug!("callback without code or error");
        return CALLBACK_FAILED_PAGE;
    };

    debug!(state = ?query.state, "authorization code received");
    match state.exchange.exchange(&code).await {
        Ok(user) => {
            let delivered = state.host.deliver(InboundMessage {
                origin: state.host.origin(),
                data: json!({ "type": AUTH_SUCCESS, "user": user }),
            });
            debug!(delivered, "identity delivered");
            CALLBACK_DONE_PAGE
        }
        Err(reason) => {
            warn!(error = %reason, "authorization code exchange failed");
            deliver_error(&state, reason);
            CALLBACK_FAILED_PAGE
        }
    }
}

fn deliver_error(state: &AppState, message: String) {
    state.host.deliver(InboundMessage {
        origin: state.host.origin(),
        data: json!({ "type": AUTH_ERROR, "error": message }),
    });
}

pub async fn health() -> &'static str {
    "ok"
}

// Helper to build a JSON error response.
fn error_response(status: StatusCode, message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            message: message.to_string(),
        }),
    )
}
