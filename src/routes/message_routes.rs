// src/routes/message_routes.rs

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    campaigns::Recipient,
    error::ApiError,
    middleware::api_access::ApiAccess,
    models::{AppState, Channel, Message, Patient},
};

pub const FEEDBACK_SUBJECT: &str = "We value your feedback";
pub const FEEDBACK_BODY: &str = "Please rate your recent experience with us: [feedback link]";

/// How many log entries `GET /communications` returns.
const RECENT_LIMIT: usize = 100;

// --------------------------
// Router
// --------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages", post(send_message))
        .route("/feedback/request", post(request_feedback))
        .route("/feedback/bulk-request", post(bulk_request_feedback))
        .route("/communications", get(recent_communications))
}

// --------------------------
// DTOs
// --------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum RecipientRef {
    Owner(String),
    Patient(String),
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub recipient: RecipientRef,
    pub channel: Channel,
    pub subject: Option<String>,
    pub content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSentResponse {
    pub success: bool,
    pub message_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub patient_id: String,
}

#[derive(Debug, Serialize)]
pub struct BulkFeedbackResponse {
    pub success: bool,
    pub sent: usize,
    pub failed: usize,
}

// --------------------------
// POST /messages
// --------------------------

pub async fn send_message(
    State(state): State<AppState>,
    _access: ApiAccess,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<MessageSentResponse>, ApiError> {
    if req.content.trim().is_empty() {
        return Err(ApiError::validation("content is required"));
    }

    let recipient = match &req.recipient {
        RecipientRef::Owner(id) => state
            .repos
            .owners
            .get(id)
            .await?
            .map(Recipient::Owner)
            .ok_or_else(|| ApiError::not_found("owner"))?,
        RecipientRef::Patient(id) => state
            .repos
            .patients
            .get(id)
            .await?
            .map(Recipient::Patient)
            .ok_or_else(|| ApiError::not_found("patient"))?,
    };

    let subject = req
        .subject
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| format!("Message from {}", state.sender_name));

    let message = state
        .dispatcher
        .send_to(&recipient, req.channel, &req.content, &subject, None)
        .await?;

    if let Recipient::Owner(owner) = &recipient {
        state
            .repos
            .owners
            .touch_last_communication(&owner.id, message.queued_at)
            .await?;
    }

    tracing::info!(recipient = recipient.id(), channel = %req.channel, message_id = %message.id, "direct message queued");

    Ok(Json(MessageSentResponse {
        success: true,
        message_id: message.id,
    }))
}

// --------------------------
// Feedback requests
// --------------------------

async fn send_feedback_request(state: &AppState, patient: &Patient) -> Result<Message, ApiError> {
    let channel = patient.notification_channel();
    let message = state
        .dispatcher
        .send_to(patient, channel, FEEDBACK_BODY, FEEDBACK_SUBJECT, None)
        .await?;
    Ok(message)
}

pub async fn request_feedback(
    State(state): State<AppState>,
    _access: ApiAccess,
    Json(req): Json<FeedbackRequest>,
) -> Result<Json<MessageSentResponse>, ApiError> {
    let patient = state
        .repos
        .patients
        .get(&req.patient_id)
        .await?
        .ok_or_else(|| ApiError::not_found("patient"))?;

    let message = send_feedback_request(&state, &patient).await?;

    Ok(Json(MessageSentResponse {
        success: true,
        message_id: message.id,
    }))
}

pub async fn bulk_request_feedback(
    State(state): State<AppState>,
    _access: ApiAccess,
) -> Result<Json<BulkFeedbackResponse>, ApiError> {
    let patients = state.repos.patients.list().await?;

    let mut sent = 0;
    let mut failed = 0;
    for patient in &patients {
        match send_feedback_request(&state, patient).await {
            Ok(_) => sent += 1,
            Err(e) => {
                failed += 1;
                tracing::warn!(patient_id = %patient.id, "feedback request not sent: {e:?}");
            }
        }
    }

    tracing::info!(sent, failed, "bulk feedback request finished");

    Ok(Json(BulkFeedbackResponse {
        success: true,
        sent,
        failed,
    }))
}

// --------------------------
// GET /communications
// --------------------------

pub async fn recent_communications(
    State(state): State<AppState>,
    _access: ApiAccess,
) -> Result<Json<Vec<Message>>, ApiError> {
    Ok(Json(state.repos.communications.recent(RECENT_LIMIT).await?))
}
