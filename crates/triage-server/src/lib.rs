mod store;

pub use store::{MemoryStore, TicketStore};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use triage_config::Config;
use triage_contracts::{
    IngestRecord, IngestResponse, Priority, RespondRequest, RespondResponse, SentimentLabel,
    Stats, Ticket, TicketStatus,
};
use triage_kernel::{parse_sent_date, Analyzer, KnowledgeBase, Lexicon};

const BUILTIN_SEED: &str = include_str!("../seed/emails.json");
const DASHBOARD_HTML: &str = include_str!("../assets/dashboard.html");
const API_BASE: &str = match option_env!("TRIAGE_API_BASE") {
    Some(v) => v,
    None => "http://localhost:4000",
};

type ApiError = (StatusCode, Json<Value>);

/// An ingest batch that stopped on a store error. The first `added` records
/// are already stored.
#[derive(Debug)]
struct IngestFailure {
    added: usize,
    message: String,
}

pub async fn serve(cfg: Config) -> Result<(), String> {
    let addr: SocketAddr = cfg
        .server
        .listen_addr
        .parse()
        .map_err(|e| format!("invalid listen_addr: {e}"))?;

    let app = build_app(cfg).await?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind failed: {e}"))?;
    tracing::info!(%addr, "triage api listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("serve failed: {e}"))
}

pub async fn build_app(cfg: Config) -> Result<Router, String> {
    build_app_with_store(cfg, MemoryStore::default()).await
}

/// Builds the router over a caller-supplied store. The store is seeded per
/// `cfg.store` before the router is returned.
pub async fn build_app_with_store<S>(cfg: Config, store: S) -> Result<Router, String>
where
    S: TicketStore + 'static,
{
    let state = AppState::new(&cfg, Box::new(store))?;
    state.seed(&cfg).await?;

    let router = Router::new()
        .route("/", get(dashboard))
        .route("/healthz", get(healthz))
        .route("/api/emails", get(list_emails))
        .route("/api/emails/{id}", get(get_email))
        .route("/api/respond/{id}", post(respond))
        .route("/api/stats", get(stats))
        .route("/api/ingest", post(ingest))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cfg.server.cors_allowed_origins.is_empty() {
        Ok(router)
    } else {
        Ok(router.layer(build_cors_layer(&cfg.server.cors_allowed_origins)))
    }
}

#[derive(Clone)]
struct AppState {
    analyzer: Arc<Analyzer>,
    store: Arc<Mutex<Box<dyn TicketStore>>>,
}

impl AppState {
    fn new(cfg: &Config, store: Box<dyn TicketStore>) -> Result<Self, String> {
        let analyzer = Analyzer::new(lexicon_from(cfg), KnowledgeBase::default())
            .map_err(|e| e.to_string())?;
        Ok(Self {
            analyzer: Arc::new(analyzer),
            store: Arc::new(Mutex::new(store)),
        })
    }

    async fn seed(&self, cfg: &Config) -> Result<(), String> {
        if cfg.store.builtin_seed {
            let records: Vec<IngestRecord> = serde_json::from_str(BUILTIN_SEED)
                .map_err(|e| format!("builtin seed is invalid: {e}"))?;
            let added = self
                .ingest(records)
                .await
                .map_err(|f| format!("builtin seed stopped after {} emails: {}", f.added, f.message))?;
            tracing::info!(added, "seeded builtin emails");
        }
        if let Some(path) = &cfg.store.seed_path {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| format!("read seed {path} failed: {e}"))?;
            let records: Vec<IngestRecord> = serde_json::from_str(&text)
                .map_err(|e| format!("parse seed {path} failed: {e}"))?;
            let added = self
                .ingest(records)
                .await
                .map_err(|f| format!("seed {path} stopped after {} emails: {}", f.added, f.message))?;
            tracing::info!(added, path = %path, "seeded emails from file");
        }
        Ok(())
    }

    async fn ingest(&self, records: Vec<IngestRecord>) -> Result<usize, IngestFailure> {
        let now = Utc::now();
        let mut store = self.store.lock().await;
        let mut next_id = store.next_id();
        let mut added = 0;
        for record in records {
            let ticket = self.analyze(next_id, record, now);
            tracing::debug!(
                id = ticket.id,
                priority = ?ticket.priority,
                sentiment = ?ticket.sentiment.label,
                "ticket analyzed"
            );
            store
                .append(ticket)
                .map_err(|message| IngestFailure { added, message })?;
            next_id += 1;
            added += 1;
        }
        Ok(added)
    }

    fn analyze(&self, id: u64, record: IngestRecord, now: DateTime<Utc>) -> Ticket {
        let analysis = self
            .analyzer
            .analyze(&record.sender, &record.subject, &record.body);
        Ticket {
            id,
            sent_date: parse_sent_date(record.sent_date.as_deref(), now),
            sender: record.sender,
            subject: record.subject,
            body: record.body,
            sentiment: analysis.sentiment,
            priority: analysis.priority,
            info: analysis.info,
            draft: analysis.draft,
            reply: String::new(),
            status: TicketStatus::Pending,
            resolved_at: None,
        }
    }

    async fn list(&self, q: Option<&str>) -> Vec<Ticket> {
        let needle = q
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty());
        let mut items: Vec<Ticket> = {
            let store = self.store.lock().await;
            store.list()
        }
        .into_iter()
        .filter(|t| self.analyzer.is_support_subject(&t.subject))
        .filter(|t| match &needle {
            Some(n) => t.subject.to_lowercase().contains(n) || t.body.to_lowercase().contains(n),
            None => true,
        })
        .collect();
        sort_for_triage(&mut items);
        items
    }

    async fn respond(&self, id: u64, reply: &str) -> Result<Option<Ticket>, String> {
        let mut store = self.store.lock().await;
        let Some(mut ticket) = store.get(id) else {
            return Ok(None);
        };
        ticket.resolve(reply, Utc::now());
        if !store.update(ticket.clone())? {
            return Ok(None);
        }
        Ok(Some(ticket))
    }
}

fn lexicon_from(cfg: &Config) -> Lexicon {
    let mut lexicon = Lexicon::default();
    let overrides = &cfg.analysis;
    if let Some(words) = &overrides.positive_words {
        lexicon.positive_words = words.clone();
    }
    if let Some(words) = &overrides.negative_words {
        lexicon.negative_words = words.clone();
    }
    if let Some(words) = &overrides.urgency_phrases {
        lexicon.urgency_phrases = words.clone();
    }
    if let Some(words) = &overrides.tag_keywords {
        lexicon.tag_keywords = words.clone();
    }
    lexicon
}

/// Urgent first, then newest first. Ids break ties so the order is stable.
fn sort_for_triage(items: &mut [Ticket]) {
    items.sort_by(|a, b| {
        let rank = |t: &Ticket| match t.priority {
            Priority::Urgent => 0,
            Priority::Normal => 1,
        };
        rank(a)
            .cmp(&rank(b))
            .then_with(|| b.sent_date.cmp(&a.sent_date))
            .then_with(|| b.id.cmp(&a.id))
    });
}

fn compute_stats(tickets: &[Ticket], now: DateTime<Utc>) -> Stats {
    let since = now - Duration::hours(24);
    let mut stats = Stats::default();
    for t in tickets {
        if t.sent_date >= since {
            stats.total24 += 1;
        }
        match t.status {
            TicketStatus::Resolved => stats.resolved += 1,
            TicketStatus::Pending => stats.pending += 1,
        }
        match t.sentiment.label {
            SentimentLabel::Positive => stats.by_sentiment.positive += 1,
            SentimentLabel::Neutral => stats.by_sentiment.neutral += 1,
            SentimentLabel::Negative => stats.by_sentiment.negative += 1,
        }
        match t.priority {
            Priority::Urgent => stats.by_priority.urgent += 1,
            Priority::Normal => stats.by_priority.normal += 1,
        }
    }
    stats
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let mut parsed = Vec::new();
    for origin in origins {
        match HeaderValue::from_str(origin) {
            Ok(value) => parsed.push(value),
            Err(err) => tracing::warn!("ignoring invalid CORS origin '{origin}': {err}"),
        }
    }

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .allow_origin(parsed)
}

fn not_found() -> ApiError {
    (StatusCode::NOT_FOUND, Json(json!({"error": "not found"})))
}

fn internal(message: String) -> ApiError {
    tracing::error!(error = %message, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": message})),
    )
}

async fn dashboard() -> Html<String> {
    Html(DASHBOARD_HTML.replace("__TRIAGE_API_BASE__", API_BASE))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    q: Option<String>,
}

async fn list_emails(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<Ticket>> {
    Json(state.list(query.q.as_deref()).await)
}

async fn get_email(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Ticket>, ApiError> {
    let id: u64 = id.parse().map_err(|_| not_found())?;
    let store = state.store.lock().await;
    store.get(id).map(Json).ok_or_else(not_found)
}

async fn respond(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<RespondResponse>, ApiError> {
    let Ok(id) = id.parse::<u64>() else {
        tracing::debug!(id = %id, "respond with malformed id");
        return Err(not_found());
    };
    // An empty body means "send the draft". A body that is present must parse.
    let request: RespondRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RespondRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            tracing::debug!(id, error = %e, "respond with unparseable body");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"error": format!("invalid respond body: {e}")})),
            )
        })?
    };
    let reply = request.reply.unwrap_or_default();

    match state.respond(id, &reply).await.map_err(internal)? {
        Some(item) => {
            tracing::info!(id, "ticket resolved");
            Ok(Json(RespondResponse { ok: true, item }))
        }
        None => {
            tracing::debug!(id, "respond to unknown ticket");
            Err(not_found())
        }
    }
}

async fn stats(State(state): State<AppState>) -> Json<Stats> {
    let tickets = {
        let store = state.store.lock().await;
        store.list()
    };
    Json(compute_stats(&tickets, Utc::now()))
}

async fn ingest(
    State(state): State<AppState>,
    Json(records): Json<Vec<IngestRecord>>,
) -> Result<Json<IngestResponse>, ApiError> {
    let added = state.ingest(records).await.map_err(|failure| {
        tracing::error!(added = failure.added, error = %failure.message, "ingest stopped part way");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": failure.message, "added": failure.added})),
        )
    })?;
    tracing::info!(added, "emails ingested");
    Ok(Json(IngestResponse { added }))
}
