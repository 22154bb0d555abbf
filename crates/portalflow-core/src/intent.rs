//! Natural-language intent classification.
//!
//! Turns free text such as "search DL01AB1234 in DL" into a task name and the
//! entities needed to start it.

use crate::task::TaskType;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const UNKNOWN_TASK: &str = "unknown";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const API_TIMEOUT_SECS: u64 = 30;

/// Entities the classifier may extract.
const ENTITIES: [&str; 3] = ["regNo", "state", "eId"];

static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("invalid json object regex"));

#[derive(Error, Debug)]
pub enum IntentError {
    #[error("Intent request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Intent service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Intent response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Intent response has an unexpected format: {0}")]
    InvalidFormat(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    /// A task type name, or `unknown`.
    pub task: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

impl Intent {
    pub fn unknown(reply: impl Into<String>) -> Self {
        Self {
            task: UNKNOWN_TASK.to_string(),
            fields: BTreeMap::new(),
            reply: Some(reply.into()),
        }
    }

    pub fn task_type(&self) -> Option<TaskType> {
        self.task.parse().ok()
    }
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Intent, IntentError>;
}

/// Used when no model is configured.
pub struct UnconfiguredClassifier;

#[async_trait]
impl IntentClassifier for UnconfiguredClassifier {
    async fn classify(&self, _text: &str) -> Result<Intent, IntentError> {
        Ok(Intent::unknown(
            "Intent classification is not configured. Please choose a service directly.",
        ))
    }
}

/// Gemini `generateContent` client.
pub struct GeminiClassifier {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClassifier {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

#[async_trait]
impl IntentClassifier for GeminiClassifier {
    async fn classify(&self, text: &str) -> Result<Intent, IntentError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(build_prompt(text)),
                }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IntentError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: GenerateResponse = response.json().await?;
        let answer = body
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .and_then(|part| part.text)
            .ok_or_else(|| IntentError::InvalidFormat("response has no text".to_string()))?;
        debug!(input = text, answer = %answer, "Intent classified");
        parse_intent(&answer)
    }
}

/// Pulls the first JSON object out of a model answer, tolerating code fences
/// and chatter around it.
pub fn parse_intent(answer: &str) -> Result<Intent, IntentError> {
    let object = JSON_OBJECT
        .find(answer)
        .ok_or_else(|| IntentError::InvalidFormat("no JSON object in answer".to_string()))?;
    let value: Value = serde_json::from_str(object.as_str())?;

    let task = match value.get("task").and_then(Value::as_str) {
        Some(name) if name.parse::<TaskType>().is_ok() => name.to_string(),
        _ => UNKNOWN_TASK.to_string(),
    };

    let mut fields = BTreeMap::new();
    for entity in ENTITIES {
        let text = match value.get(entity) {
            Some(Value::String(text)) => text.trim().to_string(),
            Some(Value::Number(number)) => number.to_string(),
            _ => continue,
        };
        if !text.is_empty() {
            fields.insert(entity.to_string(), text);
        }
    }

    let reply = value
        .get("reply")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(Intent {
        task,
        fields,
        reply,
    })
}

fn build_prompt(text: &str) -> String {
    format!("{}\nUser: \"{}\"", PROMPT, text.replace('"', "'"))
}

const PROMPT: &str = r#"You are an expert AI router for an Indian government services automation portal.
Your ONLY job is to analyze the user's text and return a valid JSON object.
NEVER respond with conversational text, only the JSON.

You must identify one of these 8 tasks: 'search', 'register', 'transfer', 'update', 'passport_fresh', 'eid_register', 'eid_search', 'eid_update', or 'unknown'.
You must also extract these entities:
- 'regNo': A vehicle registration number (e.g., "DL01AB1234", "MH14QL8220")
- 'state': A 2-letter state code (e.g., "DL", "MH", "GJ")
- 'eId': A 12-digit E-ID number (e.g., "123456789012")
When the task is 'unknown', add a short 'reply' for the user.

Examples:

User: "search DL01AB1234 in DL"
AI: {"task": "search", "regNo": "DL01AB1234", "state": "DL"}

User: "i want to find my car GJ03MY1069 in Gujarat"
AI: {"task": "search", "regNo": "GJ03MY1069", "state": "GJ"}

User: "register new vehicle"
AI: {"task": "register"}

User: "I need to transfer ownership of my car"
AI: {"task": "transfer"}

User: "update my contacts"
AI: {"task": "update"}

User: "apply for a new passport"
AI: {"task": "passport_fresh"}

User: "i want to get an e-id"
AI: {"task": "eid_register"}

User: "find e-id 123456789012"
AI: {"task": "eid_search", "eId": "123456789012"}

User: "update my e-id 123456789012"
AI: {"task": "eid_update", "eId": "123456789012"}

User: "hello"
AI: {"task": "unknown", "reply": "Hello! How can I help you today? I can assist with VAHAN vehicle services, passport applications, and E-ID services."}

User: "i want to check my bank balance"
AI: {"task": "unknown", "reply": "Sorry, I can only help with VAHAN, Passport, and E-ID services right now."}

Now, analyze this user's request:"#;
