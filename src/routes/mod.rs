use crate::models::AppState;
use axum::Router;

pub mod appointment_routes;
pub mod campaign_routes;
pub mod contact;
pub mod health_routes;
pub mod message_routes;
pub mod owner_routes;
pub mod patient_routes;

pub fn router(state: AppState) -> Router {
    let crm = Router::new()
        .merge(appointment_routes::router())
        .merge(campaign_routes::router())
        .merge(message_routes::router())
        .merge(owner_routes::router())
        .merge(patient_routes::router());

    Router::new()
        .nest("/api/crm", crm)
        .merge(health_routes::router())
        .with_state(state)
}
