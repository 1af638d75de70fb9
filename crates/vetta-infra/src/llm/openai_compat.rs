//! OpenAI-compatible chat-completions provider.
//!
//! Sends requests to any `{base_url}/chat/completions` endpoint. Structured
//! output (an `output_schema` on the request) is forwarded as a
//! `response_format` of type `json_schema`. Streaming parses the SSE body
//! into text deltas; the terminal `[DONE]` sentinel maps to
//! [`StreamEvent::Done`].
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is only exposed
//! when building the Authorization header. The provider deliberately does
//! not derive Debug.

use std::pin::Pin;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use vetta_core::llm::provider::LlmProvider;
use vetta_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, StreamEvent, Usage,
};

/// Request timeout; generation calls can run long.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Provider for OpenAI-compatible chat-completion APIs.
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

impl OpenAiCompatProvider {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Provider {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_body(&self, request: &CompletionRequest, stream: bool) -> serde_json::Value {
        let mut messages: Vec<serde_json::Value> = Vec::new();
        if let Some(system) = &request.system {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        for message in &request.messages {
            messages.push(serde_json::json!({
                "role": message.role.to_string(),
                "content": message.content,
            }));
        }

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "stream": stream,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(schema) = &request.output_schema {
            body["response_format"] = serde_json::json!({
                "type": "json_schema",
                "json_schema": { "name": "output", "schema": schema, "strict": true },
            });
        }
        body
    }

    fn map_status(status: reqwest::StatusCode, body: String) -> LlmError {
        match status.as_u16() {
            401 | 403 => LlmError::AuthenticationFailed,
            429 => LlmError::RateLimited {
                retry_after_ms: None,
            },
            400 | 404 | 422 => LlmError::InvalidRequest(body),
            _ => LlmError::Provider {
                message: format!("HTTP {status}: {body}"),
            },
        }
    }

    fn map_transport(err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout(REQUEST_TIMEOUT.as_millis() as u64)
        } else {
            LlmError::Provider {
                message: format!("HTTP request failed: {err}"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    id: String,
    model: String,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageBody,
}

#[derive(Debug, Deserialize)]
struct ChatMessageBody {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// LlmProvider implementation
// ---------------------------------------------------------------------------

impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai_compat"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_body(request, false);

        let response = self
            .client
            .post(self.url())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport)?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, error_body));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            LlmError::Deserialization(format!("failed to parse response: {e}"))
        })?;

        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        let usage = parsed.usage.map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

        Ok(CompletionResponse {
            id: parsed.id,
            content,
            model: parsed.model,
            usage: usage.unwrap_or_default(),
        })
    }

    fn stream(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>> {
        let body = self.build_body(&request, true);
        let client = self.client.clone();
        let url = self.url();
        let api_key = self.api_key.clone();

        Box::pin(async_stream::stream! {
            let response = match client
                .post(&url)
                .bearer_auth(api_key.expose_secret())
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    yield Err(Self::map_transport(err));
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let error_body = response.text().await.unwrap_or_default();
                yield Err(Self::map_status(status, error_body));
                return;
            }

            yield Ok(StreamEvent::Connected);

            let mut events = response.bytes_stream().eventsource();
            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        yield Err(LlmError::Stream(err.to_string()));
                        return;
                    }
                };

                if event.data.trim() == "[DONE]" {
                    yield Ok(StreamEvent::Done);
                    return;
                }

                match serde_json::from_str::<ChatChunk>(&event.data) {
                    Ok(chunk) => {
                        if let Some(usage) = chunk.usage {
                            yield Ok(StreamEvent::Usage(Usage {
                                input_tokens: usage.prompt_tokens,
                                output_tokens: usage.completion_tokens,
                            }));
                        }
                        for choice in chunk.choices {
                            if let Some(text) = choice.delta.content {
                                if !text.is_empty() {
                                    yield Ok(StreamEvent::TextDelta { text });
                                }
                            }
                        }
                    }
                    Err(err) => {
                        tracing::debug!(error = %err, "skipping unparseable stream chunk");
                    }
                }
            }

            // The server closed the stream without a [DONE] sentinel; treat
            // a clean close as done.
            yield Ok(StreamEvent::Done);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vetta_types::llm::{Message, MessageRole};

    fn provider() -> OpenAiCompatProvider {
        OpenAiCompatProvider::new(
            "http://localhost:9999/v1/",
            SecretString::from("test-key-not-real"),
        )
        .unwrap()
    }

    fn request(output_schema: Option<serde_json::Value>) -> CompletionRequest {
        CompletionRequest {
            model: "gpt-test".to_string(),
            messages: vec![Message {
                role: MessageRole::User,
                content: "hello".to_string(),
            }],
            system: Some("be brief".to_string()),
            max_tokens: 128,
            temperature: Some(0.0),
            stream: false,
            output_schema,
        }
    }

    #[test]
    fn test_url_strips_trailing_slash() {
        let provider = provider();
        assert_eq!(provider.url(), "http://localhost:9999/v1/chat/completions");
    }

    #[test]
    fn test_body_places_system_first() {
        let provider = provider();
        let body = provider.build_body(&request(None), false);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(body["stream"], false);
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_body_forwards_output_schema() {
        let provider = provider();
        let schema = serde_json::json!({"type": "object"});
        let body = provider.build_body(&request(Some(schema.clone())), false);
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["schema"], schema);
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            OpenAiCompatProvider::map_status(reqwest::StatusCode::UNAUTHORIZED, String::new()),
            LlmError::AuthenticationFailed
        ));
        assert!(matches!(
            OpenAiCompatProvider::map_status(
                reqwest::StatusCode::TOO_MANY_REQUESTS,
                String::new()
            ),
            LlmError::RateLimited { .. }
        ));
        assert!(matches!(
            OpenAiCompatProvider::map_status(reqwest::StatusCode::BAD_REQUEST, String::new()),
            LlmError::InvalidRequest(_)
        ));
        assert!(matches!(
            OpenAiCompatProvider::map_status(
                reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                String::new()
            ),
            LlmError::Provider { .. }
        ));
    }

    #[test]
    fn test_chunk_parsing() {
        let chunk: ChatChunk = serde_json::from_str(
            r#"{"choices": [{"delta": {"content": "Hel"}}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hel"));

        // Role-only chunks carry no content.
        let chunk: ChatChunk =
            serde_json::from_str(r#"{"choices": [{"delta": {"role": "assistant"}}]}"#).unwrap();
        assert!(chunk.choices[0].delta.content.is_none());
    }
}
