use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn from_score(score: i64) -> Self {
        match score {
            s if s > 0 => SentimentLabel::Positive,
            s if s < 0 => SentimentLabel::Negative,
            _ => SentimentLabel::Neutral,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sentiment {
    pub score: i64,
    pub label: SentimentLabel,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    Normal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    Resolved,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedInfo {
    pub phones: Vec<String>,
    pub emails: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KnowledgeEntry {
    pub id: u32,
    pub topic: String,
    pub content: String,
}

/// An ingested email plus everything derived from it at ingest time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: u64,
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub sent_date: DateTime<Utc>,
    pub sentiment: Sentiment,
    pub priority: Priority,
    pub info: ExtractedInfo,
    pub draft: String,
    #[serde(default)]
    pub reply: String,
    pub status: TicketStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Applies a response. An empty reply falls back to the draft. The first
    /// resolution time is kept when a resolved ticket is answered again.
    pub fn resolve(&mut self, reply: &str, now: DateTime<Utc>) {
        self.reply = if reply.trim().is_empty() {
            self.draft.clone()
        } else {
            reply.to_string()
        };
        self.status = TicketStatus::Resolved;
        if self.resolved_at.is_none() {
            self.resolved_at = Some(now);
        }
    }
}

/// Raw email as accepted by `/api/ingest`. Every field is optional; the
/// pipeline tolerates empty strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestRecord {
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub sent_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub added: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RespondRequest {
    #[serde(default)]
    pub reply: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondResponse {
    pub ok: bool,
    pub item: Ticket,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BySentiment {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ByPriority {
    pub urgent: usize,
    pub normal: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total24: usize,
    pub resolved: usize,
    pub pending: usize,
    pub by_sentiment: BySentiment,
    pub by_priority: ByPriority,
}
