// src/routes/appointment_routes.rs

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch, post},
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::api_access::ApiAccess,
    models::{AppState, Appointment, AppointmentStatus, new_id, parse_clock_time},
    reminders::{ScanMode, ScanReport},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments).post(create_appointment))
        .route("/appointments/{appointment_id}", patch(update_appointment_status))
        .route("/appointments/{appointment_id}/remind", post(remind_appointment))
        .route("/reminders/send", post(send_reminders))
}

/* ============================================================
   DTOs
   ============================================================ */

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentRequest {
    pub patient_id: String,
    pub doctor: String,
    /// YYYY-MM-DD, clinic-local
    pub date: String,
    /// "14:30" or "02:30 PM", clinic-local
    pub time: String,
    #[serde(rename = "type")]
    pub appointment_type: Option<String>,
    pub notes: Option<String>,
    /// Accepted for front-end compatibility; every confirmed appointment is scanned.
    pub send_reminder: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentResponse {
    pub success: bool,
    pub appointment_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemindResponse {
    pub success: bool,
    pub message_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRemindersQuery {
    /// Restrict the manual run to the reminder window, like the periodic scan.
    pub windowed: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SendRemindersResponse {
    pub success: bool,
    pub sent: usize,
    pub report: ScanReport,
}

/* ============================================================
   GET/POST /appointments
   ============================================================ */

pub async fn list_appointments(
    State(state): State<AppState>,
    _access: ApiAccess,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    Ok(Json(state.repos.appointments.list().await?))
}

pub async fn create_appointment(
    State(state): State<AppState>,
    _access: ApiAccess,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<Json<CreateAppointmentResponse>, ApiError> {
    let patient_id = req.patient_id.trim();
    if patient_id.is_empty() {
        return Err(ApiError::validation("patientId is required"));
    }

    let doctor = req.doctor.trim();
    if doctor.is_empty() {
        return Err(ApiError::validation("doctor is required"));
    }

    let date = NaiveDate::parse_from_str(req.date.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::validation("date must be YYYY-MM-DD"))?;

    let time = parse_clock_time(&req.time)
        .ok_or_else(|| ApiError::validation("time must be HH:MM or HH:MM AM/PM"))?;

    let appointment = Appointment {
        id: new_id("APT"),
        patient_id: patient_id.to_string(),
        doctor: doctor.to_string(),
        date,
        time,
        appointment_type: req.appointment_type.filter(|s| !s.trim().is_empty()),
        notes: req.notes.filter(|s| !s.trim().is_empty()),
        status: AppointmentStatus::Confirmed,
        reminder_sent: false,
        created_at: Utc::now(),
    };

    state.repos.appointments.insert(&appointment).await?;

    tracing::info!(appointment_id = %appointment.id, patient_id, "appointment booked");

    Ok(Json(CreateAppointmentResponse {
        success: true,
        appointment_id: appointment.id,
    }))
}

/* ============================================================
   PATCH /appointments/{id}
   ============================================================ */

pub async fn update_appointment_status(
    State(state): State<AppState>,
    _access: ApiAccess,
    Path(appointment_id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    // A reminder already dispatched is not withdrawn by cancelling.
    let updated = state
        .repos
        .appointments
        .set_status(&appointment_id, req.status)
        .await?;

    if !updated {
        return Err(ApiError::not_found("appointment"));
    }

    Ok(Json(SuccessResponse { success: true }))
}

/* ============================================================
   Reminders
   ============================================================ */

pub async fn remind_appointment(
    State(state): State<AppState>,
    _access: ApiAccess,
    Path(appointment_id): Path<String>,
) -> Result<Json<RemindResponse>, ApiError> {
    let message = state.scanner.remind(&appointment_id).await?;

    Ok(Json(RemindResponse {
        success: true,
        message_id: message.id,
    }))
}

pub async fn send_reminders(
    State(state): State<AppState>,
    _access: ApiAccess,
    Query(q): Query<SendRemindersQuery>,
) -> Result<Json<SendRemindersResponse>, ApiError> {
    let mode = if q.windowed.unwrap_or(false) {
        ScanMode::Windowed
    } else {
        ScanMode::AllPending
    };

    let report = state.scanner.scan(mode).await?;

    Ok(Json(SendRemindersResponse {
        success: true,
        sent: report.dispatched,
        report,
    }))
}
