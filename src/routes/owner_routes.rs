// src/routes/owner_routes.rs

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
    models::{AppState, Owner, new_id},
    routes::contact::{optional_email, optional_phone},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/owners", get(list_owners).post(create_owner))
        .route("/owners/{owner_id}/payout", post(record_payout))
        .route("/owners/{owner_id}/satisfaction", post(set_satisfaction))
        .route("/owner-stats", get(owner_stats))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOwnerRequest {
    pub hospital_name: String,
    pub owner_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub contract_status: Option<String>,
    pub monthly_payout: Option<i64>,
    pub satisfaction: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOwnerResponse {
    pub success: bool,
    pub owner_id: String,
}

#[derive(Debug, Serialize)]
pub struct PayoutResponse {
    pub success: bool,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct SatisfactionRequest {
    pub satisfaction: i32,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct OwnerStats {
    pub hospitals: usize,
    pub contracts: usize,
    /// Sum of monthly payouts.
    pub revenue: i64,
    /// Mean satisfaction, rounded; 0 with no owners.
    pub satisfaction: i64,
}

fn check_satisfaction(value: i32) -> Result<i32, ApiError> {
    if (0..=100).contains(&value) {
        Ok(value)
    } else {
        Err(ApiError::validation("satisfaction must be between 0 and 100"))
    }
}

pub async fn list_owners(
    State(state): State<AppState>,
    _access: ApiAccess,
) -> Result<Json<Vec<Owner>>, ApiError> {
    Ok(Json(state.repos.owners.list().await?))
}

pub async fn create_owner(
    State(state): State<AppState>,
    _access: ApiAccess,
    Json(req): Json<CreateOwnerRequest>,
) -> Result<Json<CreateOwnerResponse>, ApiError> {
    let hospital_name = req.hospital_name.trim();
    let owner_name = req.owner_name.trim();
    if hospital_name.is_empty() || owner_name.is_empty() {
        return Err(ApiError::validation("hospitalName and ownerName are required"));
    }

    let monthly_payout = req.monthly_payout.unwrap_or(0);
    if monthly_payout < 0 {
        return Err(ApiError::validation("monthlyPayout cannot be negative"));
    }

    let contract_status = req
        .contract_status
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Active".to_string());

    let owner = Owner {
        id: new_id("OWN"),
        hospital_name: hospital_name.to_string(),
        owner_name: owner_name.to_string(),
        email: optional_email(req.email)?,
        phone: optional_phone(req.phone)?,
        contract_status,
        monthly_payout,
        total_payouts: 0,
        satisfaction: check_satisfaction(req.satisfaction.unwrap_or(0))?,
        last_communication: None,
        created_at: Utc::now(),
    };

    state.repos.owners.insert(&owner).await?;
    tracing::info!(owner_id = %owner.id, hospital = %owner.hospital_name, "hospital owner added");

    Ok(Json(CreateOwnerResponse {
        success: true,
        owner_id: owner.id,
    }))
}

pub async fn record_payout(
    State(state): State<AppState>,
    _access: ApiAccess,
    Path(owner_id): Path<String>,
) -> Result<Json<PayoutResponse>, ApiError> {
    let owner = state
        .repos
        .owners
        .record_payout(&owner_id)
        .await?
        .ok_or_else(|| ApiError::not_found("owner"))?;

    tracing::info!(owner_id = %owner.id, amount = owner.monthly_payout, total = owner.total_payouts, "payout recorded");

    Ok(Json(PayoutResponse {
        success: true,
        amount: owner.monthly_payout,
    }))
}

pub async fn set_satisfaction(
    State(state): State<AppState>,
    _access: ApiAccess,
    Path(owner_id): Path<String>,
    Json(req): Json<SatisfactionRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let satisfaction = check_satisfaction(req.satisfaction)?;

    if !state.repos.owners.set_satisfaction(&owner_id, satisfaction).await? {
        return Err(ApiError::not_found("owner"));
    }

    Ok(Json(SuccessResponse { success: true }))
}

pub async fn owner_stats(
    State(state): State<AppState>,
    _access: ApiAccess,
) -> Result<Json<OwnerStats>, ApiError> {
    let owners = state.repos.owners.list().await?;
    Ok(Json(summarize(&owners)))
}

fn summarize(owners: &[Owner]) -> OwnerStats {
    let satisfaction = if owners.is_empty() {
        0
    } else {
        let total: i64 = owners.iter().map(|o| i64::from(o.satisfaction)).sum();
        (total as f64 / owners.len() as f64).round() as i64
    };

    OwnerStats {
        hospitals: owners.len(),
        contracts: owners.iter().filter(|o| o.has_active_contract()).count(),
        revenue: owners.iter().map(|o| o.monthly_payout).sum(),
        satisfaction,
    }
}
