// src/routes/campaign_routes.rs

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::{
    campaigns::NewCampaign,
    error::ApiError,
    middleware::api_access::ApiAccess,
    models::{AppState, Campaign, CampaignResults},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/campaigns", get(list_campaigns).post(launch_campaign))
        .route("/campaign-stats", get(campaign_stats))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchCampaignResponse {
    pub success: bool,
    pub campaign_id: String,
    pub results: CampaignResults,
}

/// Campaign count plus how many messages went out per channel.
#[derive(Debug, Serialize)]
pub struct CampaignStats {
    pub campaigns: usize,
    pub whatsapp: i64,
    pub sms: i64,
    pub email: i64,
}

pub async fn launch_campaign(
    State(state): State<AppState>,
    _access: ApiAccess,
    Json(req): Json<NewCampaign>,
) -> Result<Json<LaunchCampaignResponse>, ApiError> {
    let (campaign, results) = state.campaigns.launch(req).await?;

    Ok(Json(LaunchCampaignResponse {
        success: true,
        campaign_id: campaign.id,
        results,
    }))
}

pub async fn list_campaigns(
    State(state): State<AppState>,
    _access: ApiAccess,
) -> Result<Json<Vec<Campaign>>, ApiError> {
    Ok(Json(state.repos.campaigns.list().await?))
}

pub async fn campaign_stats(
    State(state): State<AppState>,
    _access: ApiAccess,
) -> Result<Json<CampaignStats>, ApiError> {
    let campaigns = state.repos.campaigns.count().await?;
    let counts = state.repos.communications.channel_counts().await?;

    Ok(Json(CampaignStats {
        campaigns,
        whatsapp: counts.whatsapp,
        sms: counts.sms,
        email: counts.email,
    }))
}
