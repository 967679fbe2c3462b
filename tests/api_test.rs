//! Router-level tests: the full `/api/crm` surface against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use chrono::{Duration as ChronoDuration, FixedOffset, Utc};
use serde_json::{Value, json};
use tower::ServiceExt;

use crm_server::{
    auth::hash_access_token,
    campaigns::CampaignRunner,
    comms::{DeliveryEvent, Dispatcher, SimulatedGateway},
    models::{AppState, ChannelLatencies},
    reminders::ReminderScanner,
    routes,
    store::{MemoryStore, Repositories},
};

const TOKEN: &str = "test-token";

struct TestApp {
    router: Router,
    state: AppState,
    token: Option<&'static str>,
}

impl TestApp {
    fn new() -> Self {
        Self::build(None)
    }

    fn with_token() -> Self {
        Self::build(Some(TOKEN))
    }

    fn build(token: Option<&'static str>) -> Self {
        let repos = Repositories::in_memory(Arc::new(MemoryStore::new()));
        let gateway = Arc::new(SimulatedGateway::new(ChannelLatencies::uniform(Duration::ZERO)));
        let dispatcher = Dispatcher::spawn(repos.communications.clone(), gateway);
        let sender_name: Arc<str> = Arc::from("GrandPro HMSO");
        let utc = FixedOffset::east_opt(0).unwrap();

        let state = AppState {
            scanner: Arc::new(ReminderScanner::new(
                repos.appointments.clone(),
                repos.patients.clone(),
                dispatcher.clone(),
                24,
                utc,
            )),
            campaigns: Arc::new(CampaignRunner::new(
                repos.patients.clone(),
                repos.owners.clone(),
                repos.campaigns.clone(),
                dispatcher.clone(),
                sender_name.clone(),
            )),
            repos,
            dispatcher,
            sender_name,
            api_token_sha256: token.map(|t| Arc::from(hash_access_token(t).as_str())),
        };

        Self {
            router: routes::router(state.clone()),
            state,
            token,
        }
    }

    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = self.token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(b) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.request(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, path, Some(body)).await
    }

    async fn add_patient(&self, first: &str, channel: &str, points: i64) -> String {
        let (status, body) = self
            .post(
                "/api/crm/patients",
                json!({
                    "firstName": first,
                    "lastName": "Doe",
                    "email": format!("{}@email.com", first.to_lowercase()),
                    "phone": "+1-555-1001",
                    "preferredChannel": channel,
                    "loyaltyPoints": points,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["patientId"].as_str().unwrap().to_string()
    }

    /// Books an appointment `hours` from now on the UTC clinic clock.
    async fn book(&self, patient_id: &str, hours: i64) -> String {
        let at = Utc::now() + ChronoDuration::hours(hours);
        let (status, body) = self
            .post(
                "/api/crm/appointments",
                json!({
                    "patientId": patient_id,
                    "doctor": "Dr. Smith",
                    "date": at.format("%Y-%m-%d").to_string(),
                    "time": at.format("%H:%M").to_string(),
                    "type": "Follow-up",
                    "sendReminder": true,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["appointmentId"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::with_token();
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn reminder_run_sends_once_inside_window() {
    let app = TestApp::new();
    let patient = app.add_patient("Robert", "SMS", 0).await;
    let soon = app.book(&patient, 20).await;
    let later = app.book(&patient, 48).await;

    let (status, body) = app.post("/api/crm/reminders/send?windowed=true", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sent"], 1);
    assert_eq!(body["report"]["outsideWindow"], 1);

    let (_, body) = app.post("/api/crm/reminders/send?windowed=true", json!({})).await;
    assert_eq!(body["sent"], 0);

    let (_, appointments) = app.get("/api/crm/appointments").await;
    let flags: Vec<(String, bool)> = appointments
        .as_array()
        .unwrap()
        .iter()
        .map(|a| (a["id"].as_str().unwrap().to_string(), a["reminderSent"].as_bool().unwrap()))
        .collect();
    assert_eq!(flags, vec![(soon, true), (later, false)]);

    let (_, log) = app.get("/api/crm/communications").await;
    let log = log.as_array().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0]["channel"], "SMS");
    assert_eq!(log[0]["recipient"], "+15551001");
}

#[tokio::test]
async fn manual_run_sends_every_pending_reminder_by_default() {
    let app = TestApp::new();
    let patient = app.add_patient("Jane", "Email", 0).await;
    app.book(&patient, 48).await;
    app.book(&patient, 100).await;

    let (_, body) = app.post("/api/crm/reminders/send", json!({})).await;
    assert_eq!(body["sent"], 2);

    let (_, body) = app.post("/api/crm/reminders/send", json!({})).await;
    assert_eq!(body["sent"], 0);
}

#[tokio::test]
async fn cancelled_appointments_get_no_reminder() {
    let app = TestApp::new();
    let patient = app.add_patient("Jane", "WhatsApp", 0).await;
    let id = app.book(&patient, 5).await;

    let (status, _) = app
        .request(
            Method::PATCH,
            &format!("/api/crm/appointments/{id}"),
            Some(json!({ "status": "Cancelled" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.post("/api/crm/reminders/send", json!({})).await;
    assert_eq!(body["sent"], 0);
}

#[tokio::test]
async fn force_remind_ignores_window_and_unknown_ids_are_404() {
    let app = TestApp::new();
    let patient = app.add_patient("Jane", "WhatsApp", 0).await;
    let id = app.book(&patient, 72).await;

    let (status, body) = app.post(&format!("/api/crm/appointments/{id}/remind"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["messageId"].is_string());

    let (status, body) = app.post("/api/crm/appointments/APT404/remind", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn loyalty_campaign_reaches_members_only() {
    let app = TestApp::new();
    app.add_patient("Jane", "WhatsApp", 2500).await;
    app.add_patient("Robert", "SMS", 5200).await;
    app.add_patient("Newcomer", "Email", 0).await;

    let (status, body) = app
        .post(
            "/api/crm/campaigns",
            json!({
                "name": "Loyalty Rewards",
                "target": "Loyalty Members",
                "channels": ["Email"],
                "message": "Double points this month",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["results"], json!({ "total": 2, "sent": 2, "failed": 0 }));

    let (_, campaigns) = app.get("/api/crm/campaigns").await;
    assert_eq!(campaigns[0]["id"], body["campaignId"]);
    assert_eq!(campaigns[0]["sent"], 2);

    let (_, stats) = app.get("/api/crm/campaign-stats").await;
    assert_eq!(stats, json!({ "campaigns": 1, "whatsapp": 0, "sms": 0, "email": 2 }));
}

#[tokio::test]
async fn unknown_campaign_target_is_rejected() {
    let app = TestApp::new();
    let (status, body) = app
        .post(
            "/api/crm/campaigns",
            json!({
                "name": "VIP",
                "target": "VIP Patients",
                "channels": ["SMS"],
                "message": "hello",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn owner_message_updates_last_communication() {
    let app = TestApp::new();
    let (status, body) = app
        .post(
            "/api/crm/owners",
            json!({
                "hospitalName": "City General Hospital",
                "ownerName": "Dr. John Smith",
                "email": "john.smith@citygeneral.com",
                "monthlyPayout": 15000,
                "satisfaction": 85,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let owner_id = body["ownerId"].as_str().unwrap().to_string();

    let (status, body) = app
        .post(
            "/api/crm/messages",
            json!({
                "recipient": { "type": "owner", "id": owner_id },
                "channel": "email",
                "content": "Quarterly review next week",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (_, owners) = app.get("/api/crm/owners").await;
    assert!(owners[0]["lastCommunication"].is_string());

    let (_, log) = app.get("/api/crm/communications").await;
    assert_eq!(log[0]["subject"], "Message from GrandPro HMSO");

    // No phone on file.
    let (status, body) = app
        .post(
            "/api/crm/messages",
            json!({
                "recipient": { "type": "owner", "id": owner_id },
                "channel": "sms",
                "content": "hello",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "NO_CONTACT");

    let (status, _) = app.post(&format!("/api/crm/owners/{owner_id}/payout"), json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (_, stats) = app.get("/api/crm/owner-stats").await;
    assert_eq!(
        stats,
        json!({ "hospitals": 1, "contracts": 1, "revenue": 15000, "satisfaction": 85 })
    );
}

#[tokio::test]
async fn loyalty_points_move_patients_between_tiers() {
    let app = TestApp::new();
    let id = app.add_patient("Jane", "WhatsApp", 900).await;

    let (status, body) = app
        .post(&format!("/api/crm/patients/{id}/points"), json!({ "points": 2200 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["newPoints"], 3100);
    assert_eq!(body["newTier"], "Platinum");

    let (status, _) = app
        .post("/api/crm/patients/PAT404/points", json!({ "points": 1 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .post(&format!("/api/crm/patients/{id}/points"), json!({ "points": -5000 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (_, patient) = app.get(&format!("/api/crm/patients/{id}")).await;
    assert_eq!(patient["loyaltyPoints"], 3100);
}

#[tokio::test]
async fn bulk_feedback_counts_unreachable_patients_as_failed() {
    let app = TestApp::new();
    app.add_patient("Jane", "SMS", 0).await;

    // No preference falls back to email, and there is no email on file.
    let (status, body) = app
        .post(
            "/api/crm/patients",
            json!({ "firstName": "Phone", "lastName": "Only", "phone": "+1-555-2002" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = app.post("/api/crm/feedback/bulk-request", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "sent": 1, "failed": 1 }));

    let (_, log) = app.get("/api/crm/communications").await;
    let log = log.as_array().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0]["channel"], "SMS");
    assert_eq!(log[0]["body"], "Please rate your recent experience with us: [feedback link]");
}

#[tokio::test]
async fn queued_messages_become_sent_after_delivery() {
    let app = TestApp::new();
    let mut events = app.state.dispatcher.subscribe();
    let id = app.add_patient("Jane", "SMS", 0).await;

    let (status, body) = app
        .post("/api/crm/feedback/request", json!({ "patientId": id }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, DeliveryEvent::Sent { .. }));
    assert_eq!(event.message_id().to_string(), body["messageId"].as_str().unwrap());

    let (_, log) = app.get("/api/crm/communications").await;
    assert_eq!(log[0]["status"], "sent");
    assert_eq!(log[0]["body"], "Please rate your recent experience with us: [feedback link]");
}

#[tokio::test]
async fn configured_token_is_required() {
    let app = TestApp::with_token();
    let (status, _) = app.get("/api/crm/patients").await;
    assert_eq!(status, StatusCode::OK);

    let anonymous = TestApp { token: None, ..TestApp::with_token() };
    let (status, body) = anonymous.get("/api/crm/patients").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let wrong = TestApp { token: Some("nope"), ..TestApp::with_token() };
    let (status, _) = wrong.get("/api/crm/patients").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_input_is_a_validation_error() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/api/crm/appointments",
            json!({ "patientId": "PAT001", "doctor": "Dr. Smith", "date": "10/01/2025", "time": "10:00" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = app
        .post(
            "/api/crm/patients",
            json!({ "firstName": "Jane", "lastName": "Doe", "phone": "555-0100" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
