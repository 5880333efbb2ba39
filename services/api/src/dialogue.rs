use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};
use triage_engine::config::DialogueConfig;
use triage_engine::workflows::triage::{
    DialogueError, DialogueGenerator, DialogueHistory, DialogueReply, Prediction,
};

const SYSTEM_PROMPT: &str = r#"You are a healthcare intake assistant for a clinical team.
- Ask one clear question at a time about symptoms, their severity (1-10) and duration
- Ask about relevant medical history, medications, allergies and lifestyle
- Be warm and concise; never give a diagnosis or prescribe treatment
- If the patient describes an emergency, tell them to contact emergency services immediately"#;

const SUMMARY_PROMPT: &str = "Based on this conversation, list up to three conditions the \
clinical team may want to consider. Respond with only a JSON array of objects with the keys \
\"condition\", \"likelihood\" (low, moderate or high) and \"rationale\".";

/// Dialogue collaborator backed by an OpenAI-compatible chat completions API.
///
/// The history blob is the chat `messages` array, system prompt first.
pub(crate) struct OpenAiDialogueClient {
    config: DialogueConfig,
    client: reqwest::Client,
}

impl OpenAiDialogueClient {
    pub(crate) fn new(config: DialogueConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|err| {
                warn!(error = %err, "falling back to default http client");
                reqwest::Client::new()
            });
        Self { config, client }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    async fn complete(
        &self,
        messages: &[Value],
        max_tokens: u32,
    ) -> Result<String, DialogueError> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );
        let request_body = json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": max_tokens,
            "temperature": 0.3
        });

        let mut request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json");
        if let Some(organization) = &self.config.organization {
            request = request.header("OpenAI-Organization", organization);
        }

        let response = request
            .json(&request_body)
            .send()
            .await
            .map_err(|e| DialogueError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DialogueError::RequestFailed(format!(
                "chat completions error ({}): {}",
                status, body
            )));
        }

        let resp_json: Value = response
            .json()
            .await
            .map_err(|e| DialogueError::ParseError(e.to_string()))?;

        resp_json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DialogueError::ParseError("response carried no message".to_string()))
    }
}

/// Messages to send: the stored history, or a fresh one opened with the system prompt.
fn conversation_messages(history: &DialogueHistory) -> Vec<Value> {
    match history.as_value().as_array() {
        Some(messages) if !messages.is_empty() => messages.clone(),
        _ => vec![json!({ "role": "system", "content": SYSTEM_PROMPT })],
    }
}

/// Predictions from a model reply, tolerating prose around the JSON array.
fn parse_predictions(content: &str) -> Result<Vec<Prediction>, DialogueError> {
    let trimmed = content.trim();
    let candidate = match (trimmed.find('['), trimmed.rfind(']')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    };
    serde_json::from_str(candidate).map_err(|e| DialogueError::ParseError(e.to_string()))
}

#[async_trait]
impl DialogueGenerator for OpenAiDialogueClient {
    async fn send(
        &self,
        history: &DialogueHistory,
        message: &str,
    ) -> Result<DialogueReply, DialogueError> {
        if !self.is_enabled() {
            return Err(DialogueError::NotConfigured);
        }

        let mut messages = conversation_messages(history);
        messages.push(json!({ "role": "user", "content": message }));

        let text = self.complete(&messages, 512).await?;
        messages.push(json!({ "role": "assistant", "content": text }));
        debug!(turns = messages.len(), "dialogue exchange completed");

        Ok(DialogueReply {
            text,
            history: DialogueHistory::new(Value::Array(messages)),
        })
    }

    async fn summarize(
        &self,
        history: &DialogueHistory,
    ) -> Result<Vec<Prediction>, DialogueError> {
        if !self.is_enabled() {
            return Ok(Vec::new());
        }

        let mut messages = conversation_messages(history);
        messages.push(json!({ "role": "user", "content": SUMMARY_PROMPT }));

        let content = self.complete(&messages, 768).await?;
        parse_predictions(&content)
    }
}
