//! Ollama chat client used by workflow steps that want LLM assistance.
//!
//! Only non-streaming `/api/chat` calls are made. Callers treat every error
//! as "no LLM answer" and fall back to their deterministic path.

use crate::config::ModelConfig;
use crate::models::{Finding, Severity};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Message in the chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// Thin client over the Ollama chat endpoint.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http_client: reqwest::Client,
    ollama_url: String,
    model_name: String,
    temperature: f32,
    timeout_seconds: u64,
}

impl LlmClient {
    /// Build a client from model settings.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            ollama_url: config.ollama_url.trim_end_matches('/').to_string(),
            model_name: config.name.clone(),
            temperature: config.temperature,
            timeout_seconds: config.timeout_seconds,
        })
    }

    /// Build a client only when LLM assistance is enabled.
    pub fn from_config(config: &ModelConfig) -> Result<Option<Self>> {
        if config.enabled {
            Self::new(config).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Send a system + user prompt and return the assistant text.
    pub async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.ollama_url);

        let request = OllamaChatRequest {
            model: &self.model_name,
            messages: vec![
                ChatMessage::new("system", system),
                ChatMessage::new("user", prompt),
            ],
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        debug!("Sending chat request to {} ({} chars)", url, prompt.len());

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::anyhow!("Request timed out after {}s", self.timeout_seconds)
                } else if e.is_connect() {
                    anyhow::anyhow!("Cannot connect to Ollama at {}", self.ollama_url)
                } else {
                    anyhow::anyhow!("Failed to send request: {}", e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Ollama API error {}: {}", status, body));
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(chat_response.message.content)
    }
}

/// Parse findings from a JSON-lines LLM response.
///
/// Lines that are not JSON objects, or lack a title, are skipped.
pub fn parse_findings(source: &str, response: &str) -> Vec<Finding> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter_map(|json| json_to_finding(source, &json))
        .collect()
}

fn json_to_finding(source: &str, json: &Value) -> Option<Finding> {
    let title = json["title"].as_str()?;
    let severity = Severity::parse_lossy(json["severity"].as_str().unwrap_or("medium"));
    let category = json["category"].as_str().unwrap_or("general");

    let mut finding = Finding::new(source, severity, category, title)
        .with_description(json["description"].as_str().unwrap_or(""))
        .with_recommendation(json["suggestion"].as_str().unwrap_or(""));

    if let Some(path) = json["file_path"].as_str() {
        finding = finding.with_resource(path);
    }
    if let Some(line) = json["line_number"].as_u64().filter(|l| *l > 0) {
        finding = finding.with_line(line as usize);
    }
    Some(finding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_findings_skips_noise() {
        let response = r#"Here is what I found:
{"file_path": "deploy/app.yaml", "line_number": 7, "severity": "high", "category": "config", "title": "Privileged container", "description": "runs as root", "suggestion": "drop privileges"}
not json
{"severity": "low"}
{"title": "Missing rate limit", "severity": "weird"}
"#;

        let findings = parse_findings("security_scan", response);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].location(), "deploy/app.yaml:7");
        assert_eq!(findings[0].recommendation, "drop privileges");
        assert_eq!(findings[1].severity, Severity::Medium);
        assert_eq!(findings[1].category, "general");
        assert_eq!(findings[1].source, "security_scan");
    }

    #[test]
    fn test_disabled_model_builds_no_client() {
        let config = ModelConfig::default();
        assert!(LlmClient::from_config(&config).unwrap().is_none());

        let enabled = ModelConfig {
            enabled: true,
            ollama_url: "http://localhost:11434/".to_string(),
            ..ModelConfig::default()
        };
        let client = LlmClient::from_config(&enabled).unwrap().unwrap();
        assert_eq!(client.model_name(), "llama3.2:latest");
        assert_eq!(client.ollama_url, "http://localhost:11434");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error() {
        let config = ModelConfig {
            enabled: true,
            ollama_url: "http://127.0.0.1:9".to_string(),
            timeout_seconds: 2,
            ..ModelConfig::default()
        };
        let client = LlmClient::new(&config).unwrap();
        assert!(client.complete("system", "prompt").await.is_err());
    }
}
