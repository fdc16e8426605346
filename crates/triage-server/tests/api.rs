use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::util::ServiceExt;
use triage_config::{Config, Store};
use triage_contracts::{
    ExtractedInfo, Priority, Sentiment, SentimentLabel, Ticket, TicketStatus,
};
use triage_server::{build_app, build_app_with_store, TicketStore};

fn test_config() -> Config {
    Config {
        store: Store {
            kind: "memory".to_string(),
            builtin_seed: false,
            seed_path: None,
        },
        ..Config::default()
    }
}

fn seeded_config() -> Config {
    let mut cfg = test_config();
    cfg.store.builtin_seed = true;
    cfg
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let payload = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, payload)
}

fn hours_ago(hours: i64) -> String {
    (Utc::now() - Duration::hours(hours)).to_rfc3339()
}

#[tokio::test]
async fn healthz_ok() {
    let app = build_app(test_config()).await.unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn dashboard_page_has_api_base_filled_in() {
    let app = build_app(test_config()).await.unwrap();
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.contains("/api/emails"));
    assert!(!html.contains("__TRIAGE_API_BASE__"));
}

#[tokio::test]
async fn ingested_email_is_listed_pending_with_draft() {
    let app = build_app(test_config()).await.unwrap();
    let (status, payload) = call(
        &app,
        "POST",
        "/api/ingest",
        Some(json!([{
            "sender": "alice@example.com",
            "subject": "Support request",
            "body": "Our servers are down, and we need immediate support.",
            "sent_date": hours_ago(1)
        }])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["added"], 1);

    let (status, items) = call(&app, "GET", "/api/emails", None).await;
    assert_eq!(status, StatusCode::OK);
    let items = items.as_array().unwrap();
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item["id"], 1);
    assert_eq!(item["status"], "pending");
    assert_eq!(item["priority"], "urgent");
    assert_eq!(item["sentiment"]["label"], "neutral");
    assert_eq!(item["reply"], "");
    assert!(item.get("resolved_at").is_none());
    let draft = item["draft"].as_str().unwrap();
    assert!(draft.starts_with("Hi alice,"));
    assert!(draft.contains("within the hour"));
}

#[tokio::test]
async fn list_keeps_support_subjects_and_applies_query() {
    let app = build_app(test_config()).await.unwrap();
    let (status, _) = call(
        &app,
        "POST",
        "/api/ingest",
        Some(json!([
            {"sender": "a@x.com", "subject": "Help with pricing", "body": "What are your pricing tiers?", "sent_date": hours_ago(2)},
            {"sender": "b@x.com", "subject": "Support: site down", "body": "Everything is down", "sent_date": hours_ago(10)},
            {"sender": "c@x.com", "subject": "Query on invoice", "body": "Please resend my invoice.", "sent_date": hours_ago(1)},
            {"sender": "d@x.com", "subject": "Weekly newsletter", "body": "Need help? Read on.", "sent_date": hours_ago(1)}
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, items) = call(&app, "GET", "/api/emails", None).await;
    let ids: Vec<u64> = items
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_u64().unwrap())
        .collect();
    // urgent first, then newest first; the newsletter subject is not a support mail
    assert_eq!(ids, vec![2, 3, 1]);

    let (_, items) = call(&app, "GET", "/api/emails?q=INVOICE", None).await;
    let items = items.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], 3);
}

#[tokio::test]
async fn respond_resolves_with_submitted_reply() {
    let app = build_app(seeded_config()).await.unwrap();
    let (status, payload) = call(
        &app,
        "POST",
        "/api/respond/1",
        Some(json!({"reply": "We have resent the verification email."})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["ok"], true);
    assert_eq!(payload["item"]["status"], "resolved");
    assert_eq!(
        payload["item"]["reply"],
        "We have resent the verification email."
    );
    assert!(payload["item"]["resolved_at"].is_string());

    let (status, item) = call(&app, "GET", "/api/emails/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(item["status"], "resolved");
}

#[tokio::test]
async fn respond_with_empty_reply_sends_draft() {
    let app = build_app(seeded_config()).await.unwrap();
    let (status, payload) = call(&app, "POST", "/api/respond/2", Some(json!({"reply": ""}))).await;
    assert_eq!(status, StatusCode::OK);
    let item = &payload["item"];
    assert_eq!(item["reply"], item["draft"]);
    assert!(!item["reply"].as_str().unwrap().is_empty());

    let (status, payload) = call(&app, "POST", "/api/respond/3", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["item"]["reply"], payload["item"]["draft"]);
}

#[tokio::test]
async fn unparseable_respond_body_is_rejected_without_resolving() {
    let app = build_app(seeded_config()).await.unwrap();
    for body in [json!({"reply": 123}), json!("send it")] {
        let (status, payload) = call(&app, "POST", "/api/respond/1", Some(body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(payload["error"].as_str().unwrap().starts_with("invalid respond body"));
    }
    let (_, item) = call(&app, "GET", "/api/emails/1", None).await;
    assert_eq!(item["status"], "pending");
    assert_eq!(item["reply"], "");
    assert!(item.get("resolved_at").is_none());

    let (status, _) = call(&app, "POST", "/api/respond/abc", Some(json!({"reply": 1}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn respond_twice_keeps_first_resolution_time() {
    let app = build_app(seeded_config()).await.unwrap();
    let (_, first) = call(&app, "POST", "/api/respond/4", Some(json!({"reply": "one"}))).await;
    let (_, second) = call(&app, "POST", "/api/respond/4", Some(json!({"reply": "two"}))).await;
    assert_eq!(second["item"]["status"], "resolved");
    assert_eq!(second["item"]["reply"], "two");
    assert_eq!(first["item"]["resolved_at"], second["item"]["resolved_at"]);
}

#[tokio::test]
async fn respond_to_unknown_or_malformed_id_is_404() {
    let app = build_app(seeded_config()).await.unwrap();
    for uri in ["/api/respond/999", "/api/respond/abc", "/api/respond/-1"] {
        let (status, payload) = call(&app, "POST", uri, Some(json!({"reply": "x"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(payload, json!({"error": "not found"}));
    }
    let (status, _) = call(&app, "GET", "/api/emails/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stats_stay_consistent_across_responses() {
    let app = build_app(seeded_config()).await.unwrap();

    let (_, items) = call(&app, "GET", "/api/emails", None).await;
    assert_eq!(items.as_array().unwrap().len(), 7);

    let (status, stats) = call(&app, "GET", "/api/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["resolved"], 0);
    assert_eq!(stats["pending"], 8);
    // one seed mail carries an old sent_date
    assert_eq!(stats["total24"], 7);
    let by_sentiment = &stats["bySentiment"];
    let sentiment_total = by_sentiment["positive"].as_u64().unwrap()
        + by_sentiment["neutral"].as_u64().unwrap()
        + by_sentiment["negative"].as_u64().unwrap();
    assert_eq!(sentiment_total, 8);
    let priority_total =
        stats["byPriority"]["urgent"].as_u64().unwrap() + stats["byPriority"]["normal"].as_u64().unwrap();
    assert_eq!(priority_total, 8);

    let (status, _) = call(&app, "POST", "/api/respond/5", Some(json!({"reply": "done"}))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, stats) = call(&app, "GET", "/api/stats", None).await;
    assert_eq!(stats["resolved"], 1);
    assert_eq!(stats["pending"], 7);
}

#[tokio::test]
async fn malformed_records_still_ingest() {
    let app = build_app(test_config()).await.unwrap();
    let (status, payload) = call(
        &app,
        "POST",
        "/api/ingest",
        Some(json!([{}, {"subject": "Help", "sent_date": "not a date"}])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["added"], 2);

    let (_, items) = call(&app, "GET", "/api/emails", None).await;
    let items = items.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert!(items[0]["draft"].as_str().unwrap().starts_with("Hi there,"));
}

#[derive(Clone, Default)]
struct SharedStore {
    tickets: Arc<Mutex<Vec<Ticket>>>,
}

impl TicketStore for SharedStore {
    fn get(&self, id: u64) -> Option<Ticket> {
        self.tickets
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    fn list(&self) -> Vec<Ticket> {
        self.tickets.lock().unwrap().clone()
    }

    fn append(&mut self, ticket: Ticket) -> Result<(), String> {
        self.tickets.lock().unwrap().push(ticket);
        Ok(())
    }

    fn update(&mut self, ticket: Ticket) -> Result<bool, String> {
        let mut tickets = self.tickets.lock().unwrap();
        match tickets.iter_mut().find(|t| t.id == ticket.id) {
            Some(slot) => {
                *slot = ticket;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn existing_ticket(id: u64) -> Ticket {
    Ticket {
        id,
        sender: "old@example.com".to_string(),
        subject: "Old support mail".to_string(),
        body: "From last week.".to_string(),
        sent_date: Utc::now() - Duration::days(7),
        sentiment: Sentiment {
            score: 0,
            label: SentimentLabel::Neutral,
        },
        priority: Priority::Normal,
        info: ExtractedInfo::default(),
        draft: "old draft".to_string(),
        reply: String::new(),
        status: TicketStatus::Pending,
        resolved_at: None,
    }
}

#[tokio::test]
async fn injected_store_receives_sequential_ids_after_maximum() {
    let store = SharedStore::default();
    store.tickets.lock().unwrap().push(existing_ticket(41));
    let app = build_app_with_store(test_config(), store.clone())
        .await
        .unwrap();

    let (status, payload) = call(
        &app,
        "POST",
        "/api/ingest",
        Some(json!([
            {"sender": "x@y.com", "subject": "Help", "body": "first"},
            {"sender": "x@y.com", "subject": "Help", "body": "second"}
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["added"], 2);

    let ids: Vec<u64> = store.tickets.lock().unwrap().iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![41, 42, 43]);

    let (status, payload) = call(&app, "POST", "/api/respond/41", Some(json!({"reply": ""}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["item"]["reply"], "old draft");
    assert_eq!(
        store.get(41).map(|t| t.status),
        Some(TicketStatus::Resolved)
    );

    let (_, stats) = call(&app, "GET", "/api/stats", None).await;
    assert_eq!(stats["total24"], 2);
    assert_eq!(stats["resolved"], 1);
    assert_eq!(stats["pending"], 2);
}

/// Accepts appends until it holds `capacity` tickets.
#[derive(Clone, Default)]
struct CappedStore {
    inner: SharedStore,
    capacity: usize,
}

impl TicketStore for CappedStore {
    fn get(&self, id: u64) -> Option<Ticket> {
        self.inner.get(id)
    }

    fn list(&self) -> Vec<Ticket> {
        self.inner.list()
    }

    fn append(&mut self, ticket: Ticket) -> Result<(), String> {
        if self.inner.list().len() >= self.capacity {
            return Err("store is full".to_string());
        }
        self.inner.append(ticket)
    }

    fn update(&mut self, ticket: Ticket) -> Result<bool, String> {
        self.inner.update(ticket)
    }
}

#[tokio::test]
async fn failed_ingest_reports_records_already_stored() {
    let store = CappedStore {
        capacity: 1,
        ..CappedStore::default()
    };
    let app = build_app_with_store(test_config(), store.clone())
        .await
        .unwrap();

    let (status, payload) = call(
        &app,
        "POST",
        "/api/ingest",
        Some(json!([
            {"sender": "x@y.com", "subject": "Help", "body": "first"},
            {"sender": "x@y.com", "subject": "Help", "body": "second"},
            {"sender": "x@y.com", "subject": "Help", "body": "third"}
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(payload["added"], 1);
    assert_eq!(payload["error"], "store is full");

    let (_, items) = call(&app, "GET", "/api/emails", None).await;
    let items = items.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["body"], "first");
    assert_eq!(store.list().len(), 1);
}
