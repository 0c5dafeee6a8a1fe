use std::sync::Arc;

use indoc::formatdoc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use crate::{
    db_core::prelude::user_preferences, email::parsed_message::ParsedMessage,
    util::truncate_chars,
};

use super::chat::TextModel;

const AUTOMATED_SENDER_MARKERS: [&str; 6] = [
    "unsubscribe",
    "newsletter",
    "noreply",
    "no-reply",
    "notifications@",
    "marketing@",
];

pub const AUTOMATED_SCORE: i32 = 10;
pub const AUTOMATED_EXPLANATION: &str = "Automated or marketing email detected";
pub const FALLBACK_SCORE: i32 = 50;
pub const FALLBACK_EXPLANATION: &str = "Analysis failed, assigned medium priority";
const DEFAULT_EXPLANATION: &str = "Unable to determine priority";
const PROMPT_BODY_CHARS: usize = 3000;
const FALLBACK_ERROR_CHARS: usize = 50;

const SYSTEM_PROMPT: &str = "You are an email priority analyzer. Always respond with valid JSON only.";

#[derive(Debug, Clone, Default)]
pub struct VipLists {
    pub contacts: Vec<String>,
    pub domains: Vec<String>,
}

impl VipLists {
    /// Contacts match as case-insensitive substrings of the sender,
    /// domains match the sender's domain exactly.
    pub fn is_vip(&self, sender_email: &str) -> bool {
        let sender = sender_email.to_lowercase();
        let domain = sender.rsplit_once('@').map(|(_, d)| d);

        self.contacts
            .iter()
            .map(|c| c.trim().to_lowercase())
            .any(|c| !c.is_empty() && sender.contains(&c))
            || self
                .domains
                .iter()
                .map(|d| d.trim().trim_start_matches('@').to_lowercase())
                .any(|d| Some(d.as_str()) == domain)
    }
}

impl From<&user_preferences::Model> for VipLists {
    fn from(prefs: &user_preferences::Model) -> Self {
        VipLists {
            contacts: prefs.vip_contacts.clone(),
            domains: prefs.vip_domains.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriorityAssessment {
    pub score: i32,
    pub explanation: String,
    pub action_items: Vec<String>,
    pub urgency_factors: Value,
}

impl PriorityAssessment {
    fn automated() -> Self {
        PriorityAssessment {
            score: AUTOMATED_SCORE,
            explanation: AUTOMATED_EXPLANATION.to_string(),
            action_items: vec![],
            urgency_factors: json!({
                "is_vip": false,
                "has_deadline": false,
                "has_questions": false,
                "is_urgent": false,
                "sentiment": "neutral"
            }),
        }
    }

    fn fallback(error: &str) -> Self {
        PriorityAssessment {
            score: FALLBACK_SCORE,
            explanation: format!(
                "{FALLBACK_EXPLANATION}: {}",
                truncate_chars(error, FALLBACK_ERROR_CHARS)
            ),
            action_items: vec![],
            urgency_factors: json!({}),
        }
    }
}

/// Scores messages with a rule-based shortcut for bulk mail and a model call
/// for everything else. Never fails: model trouble yields a medium score.
#[derive(Clone)]
pub struct PriorityClassifier {
    model: Arc<dyn TextModel>,
}

impl PriorityClassifier {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }

    pub async fn classify(&self, email: &ParsedMessage, vip: &VipLists) -> PriorityAssessment {
        if is_automated_sender(&email.sender_email) && !vip.is_vip(&email.sender_email) {
            tracing::debug!("Fast path for automated sender {}", email.sender_email);
            return PriorityAssessment::automated();
        }

        let prompt = analysis_prompt(email, vip);
        let answer = match self.model.complete_json(SYSTEM_PROMPT, &prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("Priority model call failed for {}: {}", email.gmail_id, e);
                return PriorityAssessment::fallback(&e.to_string());
            }
        };

        match parse_assessment(&answer) {
            Ok(assessment) => assessment,
            Err(e) => {
                tracing::warn!(
                    "Unparseable priority answer for {}: {}",
                    email.gmail_id,
                    e
                );
                PriorityAssessment::fallback(&e.to_string())
            }
        }
    }
}

fn is_automated_sender(sender_email: &str) -> bool {
    let sender = sender_email.to_lowercase();
    AUTOMATED_SENDER_MARKERS.iter().any(|m| sender.contains(m))
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "None specified".to_string()
    } else {
        items.join(", ")
    }
}

fn analysis_prompt(email: &ParsedMessage, vip: &VipLists) -> String {
    let body = email
        .body_text
        .as_deref()
        .map(|b| truncate_chars(b, PROMPT_BODY_CHARS))
        .filter(|b| !b.is_empty())
        .unwrap_or("(No content)");

    formatdoc! {r#"
        You are an email priority analyzer for busy professionals. Analyze the following email and determine its priority level.

        Email Details:
        - From: {sender_email} ({sender_name})
        - Subject: {subject}
        - Received: {received_at}
        - Content: {body}

        VIP Contacts: {vip_contacts}
        VIP Domains: {vip_domains}

        Analyze this email and provide:
        1. Priority Score (0-100): How urgently does this need attention?
           - 80-100: Critical/Urgent - needs immediate response
           - 60-79: High priority - respond within hours
           - 40-59: Medium priority - respond within a day
           - 20-39: Low priority - can wait
           - 0-19: Not important - newsletters, promotions, etc.

        2. Consider these factors:
           - Is the sender a VIP contact or from a VIP domain?
           - Are there urgent keywords (ASAP, urgent, deadline, today)?
           - Are there direct questions requiring response?
           - Is there a clear deadline mentioned?
           - Is it a personal/direct email vs automated/mass email?
           - Sentiment (frustrated, concerned, casual)

        Respond in JSON format only:
        {{
            "priority_score": <0-100>,
            "explanation": "<one sentence explaining priority>",
            "action_items": ["<action 1>", "<action 2>"],
            "urgency_factors": {{
                "is_vip": <true/false>,
                "has_deadline": <true/false>,
                "has_questions": <true/false>,
                "is_urgent": <true/false>,
                "sentiment": "<positive/neutral/negative/urgent>"
            }}
        }}"#,
        sender_email = email.sender_email,
        sender_name = email.sender_name.as_deref().unwrap_or("Unknown"),
        subject = email.subject,
        received_at = email.received_at.to_rfc3339(),
        vip_contacts = join_or_none(&vip.contacts),
        vip_domains = join_or_none(&vip.domains),
    }
}

/// Removes a surrounding ``` fence (optionally tagged `json`).
fn strip_code_fence(answer: &str) -> &str {
    let trimmed = answer.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.split("```").next().unwrap_or(rest).trim()
}

/// Outermost `{...}` in an answer that wrapped its JSON in prose.
fn embedded_object(answer: &str) -> Option<&str> {
    static RE_OBJECT: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("object pattern is valid"));
    RE_OBJECT.find(answer).map(|m| m.as_str())
}

fn parse_assessment(answer: &str) -> Result<PriorityAssessment, serde_json::Error> {
    let answer = strip_code_fence(answer);
    let value = match serde_json::from_str::<Value>(answer) {
        Ok(value) => value,
        Err(e) => match embedded_object(answer) {
            Some(object) => serde_json::from_str::<Value>(object)?,
            None => return Err(e),
        },
    };

    let score = value
        .get("priority_score")
        .and_then(|s| s.as_i64().or_else(|| s.as_f64().map(|f| f.round() as i64)))
        .unwrap_or(FALLBACK_SCORE as i64)
        .clamp(0, 100) as i32;

    let explanation = value
        .get("explanation")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_EXPLANATION)
        .to_string();

    let action_items = value
        .get("action_items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let urgency_factors = value
        .get("urgency_factors")
        .filter(|f| f.is_object())
        .cloned()
        .unwrap_or_else(|| json!({}));

    Ok(PriorityAssessment {
        score,
        explanation,
        action_items,
        urgency_factors,
    })
}
