use crate::ai::{Message, MessageRole};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o";
/// Planning output is small JSON; keep the completion budget modest
const DEFAULT_MAX_TOKENS: u32 = 4096;
const PLANNER_TEMPERATURE: f32 = 0.2;

const PLANNER_SYSTEM_PROMPT: &str =
    "You plan work for a team of AI agents. Answer with the JSON the user asks for and nothing else.";

/// Chat-completions client used as a planning backend
#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl OpenAIClient {
    pub fn new(api_key: &str, endpoint: Option<&str>, model: Option<&str>) -> Result<Self, String> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        // Local OpenAI-compatible servers often run without a key
        if !api_key.is_empty() {
            let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| format!("Invalid API key format: {}", e))?;
            headers.insert(header::AUTHORIZATION, auth_value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            endpoint: endpoint.filter(|e| !e.is_empty()).unwrap_or(DEFAULT_ENDPOINT).to_string(),
            model: model.filter(|m| !m.is_empty()).unwrap_or(DEFAULT_MODEL).to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, messages: Vec<Message>) -> ChatCompletionRequest<'_> {
        let mut chat = vec![ChatMessage {
            role: MessageRole::System.to_string(),
            content: Some(PLANNER_SYSTEM_PROMPT.to_string()),
        }];
        chat.extend(messages.into_iter().map(|m| ChatMessage {
            role: m.role.to_string(),
            content: Some(m.content),
        }));

        ChatCompletionRequest {
            model: &self.model,
            messages: chat,
            max_tokens: self.max_tokens,
            temperature: PLANNER_TEMPERATURE,
        }
    }

    pub async fn generate_text(&self, messages: Vec<Message>) -> Result<String, String> {
        let request = self.build_request(messages);

        log::info!("[PLANNER] Requesting plan from {} ({})", self.endpoint, self.model);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("Planning request failed: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read planning response: {}", e))?;

        if !status.is_success() {
            return Err(describe_error(status.as_u16(), &body));
        }

        parse_completion(&body)
    }
}

fn describe_error(status: u16, body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => format!("Planning endpoint error ({}): {}", status, parsed.error.message),
        Err(_) => format!("Planning endpoint returned {}: {}", status, body),
    }
}

fn parse_completion(body: &str) -> Result<String, String> {
    let data: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| format!("Failed to parse planning response: {} - body: {}", e, body))?;

    let choice = data
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| "Planning endpoint returned no choices".to_string())?;

    log::debug!(
        "[PLANNER] finish_reason={:?} tokens={}",
        choice.finish_reason,
        data.usage.map(|u| u.total_tokens).unwrap_or(0)
    );

    Ok(choice.message.content.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_system_prompt() {
        let client = OpenAIClient::new("", Some(""), None).unwrap();
        assert_eq!(client.model(), DEFAULT_MODEL);
        assert_eq!(client.endpoint, DEFAULT_ENDPOINT);

        let request = client.build_request(vec![Message {
            role: MessageRole::User,
            content: "plan it".to_string(),
        }]);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "plan it");
        assert_eq!(value["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_parse_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"[]"},"finish_reason":"stop"}],"usage":{"total_tokens":12}}"#;
        assert_eq!(parse_completion(body).unwrap(), "[]");
        assert!(parse_completion(r#"{"choices":[]}"#).is_err());
    }

    #[test]
    fn test_error_body_message_is_surfaced() {
        let err = describe_error(429, r#"{"error":{"message":"rate limited"}}"#);
        assert!(err.contains("rate limited"));
        assert!(describe_error(502, "bad gateway").contains("502"));
    }
}
