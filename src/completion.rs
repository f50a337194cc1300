//! Completion service client
//!
//! The engine treats the external completion/inference service as an
//! opaque `complete(system_prompt, user_message) -> text` function. Replies
//! may arrive wrapped in incidental code fences and may not be valid JSON;
//! [`CompletionClient::complete_json`] strips the fences, parses, and
//! retries up to a fixed bound before surfacing a terminal error.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::Config;
use crate::error::{Error, Result};

/// Opaque completion service: one prompt in, one text reply out
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String>;

    /// Call the service and parse the reply as JSON, retrying transport
    /// failures and malformed output up to `retries` attempts.
    async fn complete_json(
        &self,
        system_prompt: &str,
        user_message: &str,
        retries: u32,
    ) -> Result<Value> {
        let mut last_error = Error::completion("no completion attempts made");

        for attempt in 1..=retries.max(1) {
            tracing::debug!(attempt, retries, "completion attempt");
            match self.complete(system_prompt, user_message).await {
                Ok(raw) => match serde_json::from_str(strip_code_fences(&raw)) {
                    Ok(value) => return Ok(value),
                    Err(err) => {
                        tracing::warn!(attempt, %err, "completion returned malformed JSON");
                        last_error = Error::completion(format!("malformed JSON reply: {err}"));
                    }
                },
                Err(err) => {
                    tracing::warn!(attempt, %err, "completion call failed");
                    last_error = err;
                }
            }
        }

        Err(last_error)
    }
}

/// Strip incidental markdown code-fence markers from a model reply
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json").or_else(|| text.strip_prefix("```")) {
        text = rest.trim_start();
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim_end();
    }
    text
}

/// HTTP client for an OpenAI-compatible chat completions endpoint
pub struct HttpCompletionClient {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpCompletionClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.completion_url.clone(),
            model: config.completion_model.clone(),
            api_key: config.completion_api_key.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String> {
        let Some(api_key) = &self.api_key else {
            tracing::warn!("completion service not configured, set NVIDIA_API_KEY");
            return Err(Error::completion("completion service not configured"));
        };

        let request = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_message }
            ],
            "temperature": 0.5,
            "top_p": 0.95,
            "max_tokens": 4096,
            "stream": false
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::completion(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::completion(format!("HTTP {status}: {body}")));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| Error::completion(format!("invalid response body: {e}")))?;

        data["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| Error::completion("response carried no content"))
    }
}

/// Scripted client for tests: pops a canned reply per call, errors when
/// the script is exhausted
#[cfg(test)]
pub(crate) struct ScriptedClient {
    replies: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl ScriptedClient {
    pub(crate) fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: std::sync::Mutex::new(replies.into_iter().rev().map(String::from).collect()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
        self.replies
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| Error::completion("script exhausted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[tokio::test]
    async fn complete_json_retries_malformed_output() {
        let client = ScriptedClient::new(vec!["not json at all", "```json\n{\"ok\":true}\n```"]);
        let value = client.complete_json("sys", "user", 3).await.unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn complete_json_surfaces_terminal_error() {
        let client = ScriptedClient::new(vec!["junk", "junk", "junk"]);
        let err = client.complete_json("sys", "user", 3).await.unwrap_err();
        assert!(matches!(err, Error::Completion(_)));
    }

    #[tokio::test]
    async fn unconfigured_client_errors() {
        let mut config = Config::default();
        config.completion_api_key = None;
        let client = HttpCompletionClient::new(&config);
        assert!(!client.is_configured());
        let err = client.complete("sys", "user").await.unwrap_err();
        assert!(matches!(err, Error::Completion(_)));
    }
}
