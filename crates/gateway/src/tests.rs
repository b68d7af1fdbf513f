//! Route tests over the in-memory store

use super::*;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
};
use casedesk_common::{
    clock::ManualClock,
    db::{models::CaseStatus, MemoryStore},
    relay::MockRelay,
};
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
    clock: ManualClock,
    jwt: Arc<JwtManager>,
}

fn harness_with(relay: Option<MockRelay>) -> Harness {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = Some("route-test-secret".to_string());
    config.rate_limit.enabled = false;
    config.portal.base_url = "https://portal.example.com".to_string();

    let store = Arc::new(MemoryStore::new());
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap());
    let relay = relay.map(|r| Arc::new(r) as Arc<dyn ChatRelay>);

    let state = tokio_test::assert_ok!(AppState::new(
        Arc::new(config),
        store.clone(),
        Arc::new(clock.clone()),
        relay
    ));
    let jwt = state.jwt.clone();

    Harness {
        app: create_router(state),
        store,
        clock,
        jwt,
    }
}

fn harness() -> Harness {
    harness_with(Some(MockRelay::new()))
}

impl Harness {
    fn bearer(&self, owner: Uuid) -> String {
        format!("Bearer {}", self.jwt.generate_token(owner).unwrap())
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn owner_call(&self, owner: Uuid, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, self.bearer(owner));
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        };
        self.send(request.unwrap()).await
    }

    async fn portal(&self, token: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .uri(format!("/v1/portal?token={}", token))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn portal_post(&self, token: &str, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(Method::POST)
            .uri(format!("{}?token={}", path, token));
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        };
        self.send(request.unwrap()).await
    }

    async fn issue_token(&self, owner: Uuid, client: Uuid) -> String {
        let (status, body) = self
            .issue_grant(owner, client, json!({ "email": "client@example.com" }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["token"].as_str().unwrap().to_string()
    }

    async fn issue_grant(&self, owner: Uuid, client: Uuid, body: Value) -> (StatusCode, Value) {
        self.owner_call(
            owner,
            Method::POST,
            &format!("/v1/clients/{}/portal-grants", client),
            Some(body),
        )
        .await
    }
}

fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn test_health() {
    let h = harness();
    let (status, body) = h
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = h
        .send(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_owner_routes_require_session() {
    let h = harness();
    let (status, _) = h
        .send(Request::builder().uri("/v1/me/entitlements").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/v1/me/entitlements")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let (status, body) = h.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "INVALID_TOKEN");
}

#[tokio::test]
async fn test_new_owner_gets_solo_snapshot() {
    let h = harness();
    let owner = Uuid::new_v4();

    let (status, body) = h.owner_call(owner, Method::GET, "/v1/me/entitlements", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tier"], "solo");
    assert_eq!(body["limits"]["max_active_cases"], 25);
    assert_eq!(body["limits"]["has_client_portal"], false);
    assert_eq!(body["active_case_count"], 0);
    assert_eq!(body["can_create_case"], true);
}

#[tokio::test]
async fn test_case_quota_and_closing_frees_slot() {
    let h = harness();
    let owner = Uuid::new_v4();
    let first = h.store.seed_case(owner, None, CaseStatus::Active);
    for _ in 0..24 {
        h.store.seed_case(owner, None, CaseStatus::Pending);
    }

    let new_case = json!({ "title": "Lease dispute" });
    let (status, body) = h
        .owner_call(owner, Method::POST, "/v1/cases", Some(new_case.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "UPGRADE_REQUIRED");
    assert_eq!(body["error"]["details"]["tier"], "solo");
    assert_eq!(body["error"]["details"]["limit"], "25 active cases");

    let (status, body) = h
        .owner_call(
            owner,
            Method::PATCH,
            &format!("/v1/cases/{}/status", first.id),
            Some(json!({ "status": "closed" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "closed");

    let (status, body) = h
        .owner_call(owner, Method::POST, "/v1/cases", Some(new_case))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "intake");
    assert_eq!(body["priority"], "medium");
}

#[tokio::test]
async fn test_reopening_a_case_counts_against_quota() {
    let h = harness();
    let owner = Uuid::new_v4();
    let closed = h.store.seed_case(owner, None, CaseStatus::Closed);
    let archived = h.store.seed_case(owner, None, CaseStatus::Archived);
    for _ in 0..24 {
        h.store.seed_case(owner, None, CaseStatus::Active);
    }

    let (status, body) = h
        .owner_call(
            owner,
            Method::PATCH,
            &format!("/v1/cases/{}/status", archived.id),
            Some(json!({ "status": "pending" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");

    let (status, body) = h
        .owner_call(
            owner,
            Method::PATCH,
            &format!("/v1/cases/{}/status", closed.id),
            Some(json!({ "status": "active" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "UPGRADE_REQUIRED");
    assert_eq!(h.store.case(closed.id).unwrap().case_status(), CaseStatus::Closed);

    let (_, body) = h.owner_call(owner, Method::GET, "/v1/me/entitlements", None).await;
    assert_eq!(body["active_case_count"], 25);

    // Moving between open statuses and closing stay allowed at the limit
    for next in ["active", "closed"] {
        let (status, _) = h
            .owner_call(
                owner,
                Method::PATCH,
                &format!("/v1/cases/{}/status", archived.id),
                Some(json!({ "status": next })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_create_case_rejects_foreign_client_and_bad_input() {
    let h = harness();
    let owner = Uuid::new_v4();
    let foreign = h.store.seed_client(Uuid::new_v4(), "Someone Else");

    let (status, body) = h
        .owner_call(
            owner,
            Method::POST,
            "/v1/cases",
            Some(json!({ "title": "Probate", "client_id": foreign.id })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "CLIENT_NOT_FOUND");

    let (status, _) = h
        .owner_call(owner, Method::POST, "/v1/cases", Some(json!({ "title": "" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .owner_call(
            owner,
            Method::POST,
            "/v1/cases",
            Some(json!({ "title": "Probate", "priority": "whenever" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_change_is_owner_scoped() {
    let h = harness();
    let case = h.store.seed_case(Uuid::new_v4(), None, CaseStatus::Active);

    let (status, _) = h
        .owner_call(
            Uuid::new_v4(),
            Method::PATCH,
            &format!("/v1/cases/{}/status", case.id),
            Some(json!({ "status": "archived" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(h.store.case(case.id).unwrap().case_status(), CaseStatus::Active);
}

#[tokio::test]
async fn test_portal_issue_requires_plan_and_owned_client() {
    let h = harness();
    let owner = Uuid::new_v4();
    let client = h.store.seed_client(owner, "Ada Client");
    let invite = json!({ "email": "ada@example.com", "mode": "chat" });

    let (status, body) = h.issue_grant(owner, client.id, invite.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["details"]["limit"], "client portal access");

    let (status, body) = h
        .owner_call(owner, Method::PUT, "/v1/me/tier", Some(json!({ "tier": "professional" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["limits"]["has_client_portal"], true);

    let other_client = h.store.seed_client(Uuid::new_v4(), "Not Yours");
    let (status, _) = h.issue_grant(owner, other_client.id, invite.clone()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = h.issue_grant(owner, client.id, invite).await;
    assert_eq!(status, StatusCode::CREATED);
    let token = body["token"].as_str().unwrap();
    assert_eq!(token.len(), 64);
    assert_eq!(
        body["link"],
        format!("https://portal.example.com/client-portal?token={}&type=chat", token)
    );
    assert_eq!(body["grant"]["status"], "active");
    assert!(body["grant"].get("token").is_none());
}

#[tokio::test]
async fn test_portal_view_is_scoped_to_one_client() {
    let h = harness();
    let owner = Uuid::new_v4();
    h.store.seed_profile(owner, Some("professional"), None);
    let client = h.store.seed_client(owner, "Ada Client");
    let sibling = h.store.seed_client(owner, "Other Client");

    let mine = h.store.seed_case(owner, Some(client.id), CaseStatus::Active);
    let theirs = h.store.seed_case(owner, Some(sibling.id), CaseStatus::Active);
    h.store.seed_case(Uuid::new_v4(), Some(client.id), CaseStatus::Active);
    h.store.seed_document(owner, mine.id);
    h.store.seed_document(owner, theirs.id);
    h.store.seed_reminder(owner, mine.id);

    let (_, body) = h.issue_grant(owner, client.id, json!({ "email": "ada@example.com" })).await;
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = h.portal(&token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["client_name"], "Ada Client");
    let cases = body["cases"].as_array().unwrap();
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0]["id"], mine.id.to_string());
    assert_eq!(body["documents"].as_array().unwrap().len(), 1);
    assert_eq!(body["reminders"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_portal_denials() {
    let h = harness();
    let owner = Uuid::new_v4();
    h.store.seed_profile(owner, Some("firm"), None);
    let client = h.store.seed_client(owner, "Ada Client");

    let (status, body) = h.portal("").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Invalid or missing access token");
    assert_eq!(h.store.grant_lookups(), 0);

    let (status, body) = h.portal("abc123").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "ACCESS_DENIED");

    let (_, body) = h
        .issue_grant(owner, client.id, json!({ "email": "ada@example.com", "ttl_days": 7 }))
        .await;
    let token = body["token"].as_str().unwrap().to_string();
    let grant_id = body["grant"]["id"].as_str().unwrap().to_string();

    h.clock.advance(Duration::days(8));
    let (status, body) = h.portal(&token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "ACCESS_EXPIRED");

    let (status, body) = h
        .owner_call(owner, Method::GET, &format!("/v1/clients/{}/portal-grants", client.id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["grants"][0]["status"], "expired");

    let (status, _) = h
        .owner_call(owner, Method::DELETE, &format!("/v1/portal-grants/{}", grant_id), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = h.portal(&token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "ACCESS_DENIED");
}

#[tokio::test]
async fn test_portal_outage_is_503() {
    let h = harness();
    let owner = Uuid::new_v4();
    h.store.seed_profile(owner, Some("professional"), None);
    let client = h.store.seed_client(owner, "Ada Client");
    let (_, body) = h.issue_grant(owner, client.id, json!({ "email": "ada@example.com" })).await;
    let token = body["token"].as_str().unwrap().to_string();

    h.store.fail_reads(true);
    let (status, body) = h.portal(&token).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_code(&body), "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_entitlement_outage_fails_closed() {
    let h = harness();
    let owner = Uuid::new_v4();
    h.store.fail_reads(true);

    let (status, _) = h
        .owner_call(owner, Method::POST, "/v1/cases", Some(json!({ "title": "Probate" })))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_intake_form_writes_only_to_the_grant_client() {
    let h = harness();
    let owner = Uuid::new_v4();
    h.store.seed_profile(owner, Some("professional"), None);
    let client = h.store.seed_client(owner, "Ada Client");
    let sibling = h.store.seed_client(owner, "Other Client");
    let token = h.issue_token(owner, client.id).await;

    let form = json!({
        "client_id": sibling.id,
        "full_name": "Ada Q. Client",
        "email": "ada@example.com",
        "phone": "555-0100",
        "address": "1 Main St",
        "case_type": "family-law",
        "description": "Custody schedule"
    });
    let (status, body) = h.portal_post(&token, "/v1/portal/intake", Some(form.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["client_id"], client.id.to_string());
    assert_eq!(body["user_id"], owner.to_string());
    assert!(body["summary"].as_str().unwrap().contains("- **Case Type:** Family Law"));

    let updated = h.store.client(client.id).unwrap();
    assert_eq!(updated.full_name, "Ada Q. Client");
    assert_eq!(updated.email.as_deref(), Some("ada@example.com"));
    assert_eq!(updated.address.as_deref(), Some("1 Main St"));

    let untouched = h.store.client(sibling.id).unwrap();
    assert_eq!(untouched.full_name, "Other Client");
    assert_eq!(untouched.email, None);
    assert!(h.store.client_conversations(sibling.id).is_empty());

    let conversation_id: Uuid = body["id"].as_str().unwrap().parse().unwrap();
    let messages = h.store.messages(conversation_id);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, "user");
    assert!(messages[0]
        .content
        .starts_with("CLIENT INTAKE FORM SUBMISSION\n\n## Client Information"));

    let (status, _) = h.portal_post("", "/v1/portal/intake", Some(form)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(h.store.client_conversations(client.id).len(), 1);
}

#[tokio::test]
async fn test_intake_chat_is_scoped_to_the_grant() {
    let h = harness();
    let owner = Uuid::new_v4();
    h.store.seed_profile(owner, Some("professional"), None);
    let client = h.store.seed_client(owner, "Ada Client");
    let sibling = h.store.seed_client(owner, "Other Client");
    let token = h.issue_token(owner, client.id).await;
    let sibling_token = h.issue_token(owner, sibling.id).await;

    let (status, body) = h.portal_post(&token, "/v1/portal/intake/conversations", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "active");
    let id: Uuid = body["id"].as_str().unwrap().parse().unwrap();
    let messages_path = format!("/v1/portal/intake/conversations/{}/messages", id);
    let complete_path = format!("/v1/portal/intake/conversations/{}/complete", id);

    let turn = json!({ "role": "user", "content": "I was rear-ended on Monday." });
    let (status, _) = h.portal_post(&token, &messages_path, Some(turn.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = h.portal_post(&sibling_token, &messages_path, Some(turn.clone())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "CONVERSATION_NOT_FOUND");
    let (status, _) = h
        .portal_post(&sibling_token, &complete_path, Some(json!({ "summary": "hijacked" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(h.store.messages(id).len(), 1);
    assert_eq!(h.store.conversation(id).unwrap().summary, None);

    let (status, _) = h
        .portal_post(&token, &messages_path, Some(json!({ "role": "system", "content": "x" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = h
        .portal_post(&token, &complete_path, Some(json!({ "summary": "Rear-end collision." })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["summary"], "Rear-end collision.");

    let (status, body) = h.portal_post(&token, &messages_path, Some(turn)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "CONVERSATION_CLOSED");
    assert_eq!(h.store.messages(id).len(), 1);
}

fn chat_request(auth: Option<String>, uri: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder
        .body(Body::from(
            json!({ "messages": [
                { "role": "system", "content": "Be brief." },
                { "role": "user", "content": "When is my hearing?" }
            ] })
            .to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn test_chat_requires_session_or_grant() {
    let h = harness();

    let (status, _) = h.send(chat_request(None, "/v1/ai/chat")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = h
        .send(chat_request(Some(h.bearer(Uuid::new_v4())), "/v1/ai/chat"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "echo: When is my hearing?");

    let owner = Uuid::new_v4();
    h.store.seed_profile(owner, Some("professional"), None);
    let client = h.store.seed_client(owner, "Ada Client");
    let (_, body) = h.issue_grant(owner, client.id, json!({ "email": "ada@example.com" })).await;
    let token = body["token"].as_str().unwrap();

    let (status, _) = h
        .send(chat_request(None, &format!("/v1/ai/chat?token={}", token)))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_chat_upstream_errors() {
    for (upstream, expected) in [
        (429, StatusCode::TOO_MANY_REQUESTS),
        (402, StatusCode::PAYMENT_REQUIRED),
        (500, StatusCode::BAD_GATEWAY),
    ] {
        let h = harness_with(Some(MockRelay::failing(upstream)));
        let (status, body) = h
            .send(chat_request(Some(h.bearer(Uuid::new_v4())), "/v1/ai/chat"))
            .await;
        assert_eq!(status, expected);
        assert!(body["error"]["message"].is_string());
    }

    let h = harness_with(None);
    let (status, _) = h
        .send(chat_request(Some(h.bearer(Uuid::new_v4())), "/v1/ai/chat"))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_rate_limit_layer() {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = Some("route-test-secret".to_string());
    config.rate_limit.requests_per_second = 1;
    config.rate_limit.burst = 1;

    let state = AppState::new(
        Arc::new(config),
        Arc::new(MemoryStore::new()),
        Arc::new(SystemClock),
        None,
    )
    .unwrap();
    let app = create_router(state);

    let first = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[test]
fn test_missing_jwt_secret_is_a_config_error() {
    let result = AppState::new(
        Arc::new(AppConfig::default()),
        Arc::new(MemoryStore::new()),
        Arc::new(SystemClock),
        None,
    );
    assert!(matches!(result, Err(AppError::Configuration { .. })));
}
