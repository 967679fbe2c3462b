// src/routes/patient_routes.rs

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiError,
    middleware::api_access::ApiAccess,
    models::{AppState, Channel, LoyaltyTier, Patient, new_id},
    routes::contact::{optional_email, optional_phone},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/patients", get(list_patients).post(create_patient))
        .route("/patients/{patient_id}", get(get_patient))
        .route("/patients/{patient_id}/points", post(add_points))
        .route("/patient-stats", get(patient_stats))
}

/// Patient as the CRM front-end renders it: the stored record plus its tier.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientView {
    #[serde(flatten)]
    pub patient: Patient,
    pub loyalty_tier: LoyaltyTier,
}

impl From<Patient> for PatientView {
    fn from(patient: Patient) -> Self {
        let loyalty_tier = patient.loyalty_tier();
        Self { patient, loyalty_tier }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePatientRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub preferred_channel: Option<Channel>,
    pub loyalty_points: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePatientResponse {
    pub success: bool,
    pub patient_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AddPointsRequest {
    pub points: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPointsResponse {
    pub success: bool,
    pub new_points: i64,
    pub new_tier: LoyaltyTier,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct PatientStats {
    pub patients: usize,
    pub appointments: usize,
    pub loyalty: usize,
    /// Mean feedback score over patients that have one, to one decimal.
    pub feedback: Option<f64>,
}

pub async fn list_patients(
    State(state): State<AppState>,
    _access: ApiAccess,
) -> Result<Json<Vec<PatientView>>, ApiError> {
    let patients = state.repos.patients.list().await?;
    Ok(Json(patients.into_iter().map(PatientView::from).collect()))
}

pub async fn get_patient(
    State(state): State<AppState>,
    _access: ApiAccess,
    Path(patient_id): Path<String>,
) -> Result<Json<PatientView>, ApiError> {
    let patient = state
        .repos
        .patients
        .get(&patient_id)
        .await?
        .ok_or_else(|| ApiError::not_found("patient"))?;

    Ok(Json(patient.into()))
}

pub async fn create_patient(
    State(state): State<AppState>,
    _access: ApiAccess,
    Json(req): Json<CreatePatientRequest>,
) -> Result<Json<CreatePatientResponse>, ApiError> {
    let first_name = req.first_name.trim();
    let last_name = req.last_name.trim();
    if first_name.is_empty() || last_name.is_empty() {
        return Err(ApiError::validation("firstName and lastName are required"));
    }

    let email = optional_email(req.email)?;
    let phone = optional_phone(req.phone)?;
    if email.is_none() && phone.is_none() {
        return Err(ApiError::validation("an email or phone number is required"));
    }

    let loyalty_points = req.loyalty_points.unwrap_or(0);
    if loyalty_points < 0 {
        return Err(ApiError::validation("loyaltyPoints cannot be negative"));
    }

    let patient = Patient {
        id: new_id("PAT"),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email,
        phone,
        preferred_channel: req.preferred_channel,
        loyalty_points,
        feedback_score: None,
        created_at: Utc::now(),
    };

    state.repos.patients.insert(&patient).await?;
    tracing::info!(patient_id = %patient.id, "patient registered");

    Ok(Json(CreatePatientResponse {
        success: true,
        patient_id: patient.id,
    }))
}

pub async fn add_points(
    State(state): State<AppState>,
    _access: ApiAccess,
    Path(patient_id): Path<String>,
    Json(req): Json<AddPointsRequest>,
) -> Result<Json<AddPointsResponse>, ApiError> {
    if req.points < 0 {
        return Err(ApiError::validation("points cannot be negative"));
    }

    let patient = state
        .repos
        .patients
        .add_loyalty_points(&patient_id, req.points)
        .await?
        .ok_or_else(|| ApiError::not_found("patient"))?;

    Ok(Json(AddPointsResponse {
        success: true,
        new_points: patient.loyalty_points,
        new_tier: patient.loyalty_tier(),
    }))
}

pub async fn patient_stats(
    State(state): State<AppState>,
    _access: ApiAccess,
) -> Result<Json<PatientStats>, ApiError> {
    let patients = state.repos.patients.list().await?;
    let appointments = state.repos.appointments.count().await?;
    Ok(Json(summarize(&patients, appointments)))
}

fn summarize(patients: &[Patient], appointments: usize) -> PatientStats {
    let scores: Vec<f64> = patients.iter().filter_map(|p| p.feedback_score).collect();
    let feedback = (!scores.is_empty()).then(|| {
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        (mean * 10.0).round() / 10.0
    });

    PatientStats {
        patients: patients.len(),
        appointments,
        loyalty: patients.iter().filter(|p| p.is_loyalty_member()).count(),
        feedback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::patient;

    #[test]
    fn stats_average_only_scored_patients() {
        let mut a = patient("PAT1", None);
        a.feedback_score = Some(4.5);
        a.loyalty_points = 100;
        let mut b = patient("PAT2", None);
        b.feedback_score = Some(4.8);
        let c = patient("PAT3", None);

        let stats = summarize(&[a, b, c], 7);
        assert_eq!(
            stats,
            PatientStats { patients: 3, appointments: 7, loyalty: 1, feedback: Some(4.7) }
        );
    }

    #[test]
    fn stats_without_patients_have_no_feedback() {
        assert_eq!(summarize(&[], 0).feedback, None);
    }

    #[test]
    fn view_carries_tier_alongside_patient_fields() {
        let mut p = patient("PAT1", Some(Channel::Sms));
        p.loyalty_points = 1200;
        let json = serde_json::to_value(PatientView::from(p)).unwrap();
        assert_eq!(json["loyaltyTier"], "Gold");
        assert_eq!(json["loyaltyPoints"], 1200);
        assert_eq!(json["preferredChannel"], "SMS");
    }
}
