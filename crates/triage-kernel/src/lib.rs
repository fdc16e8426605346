mod lexicon;

pub use lexicon::{KnowledgeBase, Lexicon};

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use thiserror::Error;
use triage_contracts::{ExtractedInfo, KnowledgeEntry, Priority, Sentiment, SentimentLabel};

const SUMMARY_FALLBACK_CHARS: usize = 160;

// At most one separator between digits; parentheses only open or close an
// area code. A sentence break like ". " never joins two numbers.
const PHONE_PATTERN: &str = r"\+?\(?\d(?:(?:\)\s?|\s?\(|[\s\-.])?\d){7,}";
const EMAIL_PATTERN: &str = r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}";
const DISTRESS_PATTERN: &str =
    r"(?i)\b(down|outage|crash(?:ed|ing)?|cannot|can't|unable|blocked|lost)\b";
const SUPPORT_SUBJECT_PATTERN: &str = r"(?i)\b(support|query|request|help)\b";

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("invalid {name} pattern: {message}")]
    Pattern { name: &'static str, message: String },
}

/// Everything derived from one email at ingest time.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub sentiment: Sentiment,
    pub priority: Priority,
    pub info: ExtractedInfo,
    pub draft: String,
}

/// Inputs of the reply template.
#[derive(Debug, Clone, Copy)]
pub struct DraftInput<'a> {
    pub sender: &'a str,
    pub summary: &'a str,
    pub sentiment: SentimentLabel,
    pub urgent: bool,
    pub knowledge: Option<&'a KnowledgeEntry>,
}

pub struct Analyzer {
    lexicon: Lexicon,
    knowledge: KnowledgeBase,
    phone: Regex,
    email: Regex,
    distress: Regex,
    support_subject: Regex,
}

impl Analyzer {
    pub fn new(lexicon: Lexicon, knowledge: KnowledgeBase) -> Result<Self, KernelError> {
        Ok(Self {
            lexicon,
            knowledge,
            phone: compile("phone", PHONE_PATTERN)?,
            email: compile("email", EMAIL_PATTERN)?,
            distress: compile("distress", DISTRESS_PATTERN)?,
            support_subject: compile("support subject", SUPPORT_SUBJECT_PATTERN)?,
        })
    }

    pub fn analyze(&self, sender: &str, subject: &str, body: &str) -> Analysis {
        let text = format!("{subject} {body}");
        let sentiment = score_sentiment(&text, &self.lexicon);

        // Negative mail that mentions an outage-like condition is escalated even
        // when no urgency phrase is present.
        let urgent = is_urgent(&text, &self.lexicon)
            || (sentiment.label == SentimentLabel::Negative && self.distress.is_match(&text));
        let priority = if urgent {
            Priority::Urgent
        } else {
            Priority::Normal
        };

        let info = self.extract_info(&text);
        let summary = summarize(body);
        let draft = draft_reply(DraftInput {
            sender,
            summary: &summary,
            sentiment: sentiment.label,
            urgent,
            knowledge: retrieve(&text, &self.knowledge),
        });

        Analysis {
            sentiment,
            priority,
            info,
            draft,
        }
    }

    pub fn extract_info(&self, text: &str) -> ExtractedInfo {
        let mut phones: Vec<String> = Vec::new();
        for m in self.phone.find_iter(text) {
            let phone = m.as_str().to_string();
            if !phones.contains(&phone) {
                phones.push(phone);
            }
        }

        let mut emails: Vec<String> = Vec::new();
        for m in self.email.find_iter(text) {
            let email = m.as_str();
            if !emails.iter().any(|e| e.eq_ignore_ascii_case(email)) {
                emails.push(email.to_string());
            }
        }

        let lower = text.to_lowercase();
        let tags = self
            .lexicon
            .tag_keywords
            .iter()
            .filter(|k| contains_word(&lower, k))
            .cloned()
            .collect();

        ExtractedInfo {
            phones,
            emails,
            tags,
        }
    }

    pub fn is_support_subject(&self, subject: &str) -> bool {
        self.support_subject.is_match(subject)
    }
}

pub fn score_sentiment(text: &str, lexicon: &Lexicon) -> Sentiment {
    let lower = text.to_lowercase();
    let positive = lexicon
        .positive_words
        .iter()
        .filter(|w| contains_word(&lower, w))
        .count() as i64;
    let negative = lexicon
        .negative_words
        .iter()
        .filter(|w| contains_word(&lower, w))
        .count() as i64;
    let score = positive - negative;
    Sentiment {
        score,
        label: SentimentLabel::from_score(score),
    }
}

pub fn is_urgent(text: &str, lexicon: &Lexicon) -> bool {
    let lower = text.to_lowercase();
    lexicon
        .urgency_phrases
        .iter()
        .any(|p| contains_word(&lower, p))
}

pub fn summarize(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.contains('.') {
        let sentences: Vec<&str> = collapsed
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .take(2)
            .collect();
        if !sentences.is_empty() {
            return format!("{}.", sentences.join(". "));
        }
    }
    collapsed.chars().take(SUMMARY_FALLBACK_CHARS).collect()
}

/// Best knowledge entry by topic-word overlap. Ties go to the earlier entry.
pub fn retrieve<'a>(text: &str, knowledge: &'a KnowledgeBase) -> Option<&'a KnowledgeEntry> {
    let lower = text.to_lowercase();
    let mut best: Option<(&KnowledgeEntry, usize)> = None;
    for entry in &knowledge.entries {
        let score = topic_score(&lower, &entry.topic);
        if score > best.map(|(_, s)| s).unwrap_or(0) {
            best = Some((entry, score));
        }
    }
    best.map(|(entry, _)| entry)
}

pub fn draft_reply(input: DraftInput<'_>) -> String {
    let name = input.sender.split('@').next().unwrap_or_default().trim();
    let name = if name.is_empty() { "there" } else { name };

    let empathy = if input.sentiment == SentimentLabel::Negative || input.urgent {
        "I'm sorry for the trouble you're experiencing, and I understand how disruptive this is."
    } else {
        "Thank you for reaching out to us."
    };
    let next_steps = if input.urgent {
        "We have escalated this to our on-call team and will update you within the hour."
    } else {
        "Our support team will review your request and get back to you within 24 hours."
    };

    let mut lines = vec![
        format!("Hi {name},"),
        String::new(),
        empathy.to_string(),
        format!("We understand your message: \"{}\"", input.summary),
        next_steps.to_string(),
    ];
    if let Some(entry) = input.knowledge {
        lines.push(format!("Helpful info ({}): {}", entry.topic, entry.content));
    }
    lines.push(String::new());
    lines.push("Best regards,".to_string());
    lines.push("Support Team".to_string());
    lines.join("\n")
}

/// Parses the sender-supplied timestamp; unparseable or missing values become
/// `fallback`.
pub fn parse_sent_date(raw: Option<&str>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return fallback;
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.with_timezone(&Utc);
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .unwrap_or(fallback)
}

fn topic_score(lower_text: &str, topic: &str) -> usize {
    let words: Vec<String> = topic.split_whitespace().map(str::to_lowercase).collect();
    let overlap = words.iter().filter(|w| lower_text.contains(w.as_str())).count();
    let bonus = match words.first() {
        Some(first) if lower_text.contains(first.as_str()) => 1,
        _ => 0,
    };
    overlap + bonus
}

fn contains_word(lower_text: &str, word: &str) -> bool {
    let word = word.trim();
    !word.is_empty() && lower_text.contains(&word.to_lowercase())
}

fn compile(name: &'static str, pattern: &str) -> Result<Regex, KernelError> {
    Regex::new(pattern).map_err(|e| KernelError::Pattern {
        name,
        message: e.to_string(),
    })
}
