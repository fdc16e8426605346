use triage_contracts::KnowledgeEntry;

/// Word lists driving the heuristic scorers. Every entry is matched as a
/// lowercase substring, so `"frustrat"` catches "frustrated" and "frustrating".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexicon {
    pub positive_words: Vec<String>,
    pub negative_words: Vec<String>,
    pub urgency_phrases: Vec<String>,
    pub tag_keywords: Vec<String>,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            positive_words: owned(&[
                "thank",
                "great",
                "appreciate",
                "happy",
                "excellent",
                "awesome",
                "love",
                "pleased",
                "helpful",
                "good",
            ]),
            negative_words: owned(&[
                "bad",
                "angry",
                "frustrat",
                "disappoint",
                "terrible",
                "awful",
                "broken",
                "unable",
                "cannot",
                "error",
                "fail",
                "worst",
                "upset",
                "annoy",
                "problem",
                "issue",
            ]),
            urgency_phrases: owned(&[
                "urgent",
                "immediate",
                "asap",
                "critical",
                "emergency",
                "down",
                "outage",
                "cannot access",
                "not working",
                "blocked",
            ]),
            tag_keywords: owned(&[
                "login",
                "password",
                "billing",
                "refund",
                "account",
                "verification",
                "integration",
                "api",
                "pricing",
                "subscription",
                "server",
                "downtime",
                "invoice",
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBase {
    pub entries: Vec<KnowledgeEntry>,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        let entries = [
            (
                "password reset",
                "You can reset your password from the login page with the \"Forgot password\" link. The reset email usually arrives within a few minutes.",
            ),
            (
                "billing refund",
                "Refunds for duplicate or incorrect charges are processed within 5-7 business days once approved by our billing team.",
            ),
            (
                "account verification",
                "Verification emails are sent right after sign-up. If yours did not arrive, check your spam folder or request a new link from account settings.",
            ),
            (
                "api integration",
                "Our API documentation covers authentication, rate limits and webhooks. Third-party integrations use the same API keys as your dashboard.",
            ),
            (
                "server downtime",
                "Live system status is published on our status page, and every incident is investigated by the on-call engineering team.",
            ),
        ]
        .into_iter()
        .enumerate()
        .map(|(idx, (topic, content))| KnowledgeEntry {
            id: idx as u32 + 1,
            topic: topic.to_string(),
            content: content.to_string(),
        })
        .collect();
        Self { entries }
    }
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}
