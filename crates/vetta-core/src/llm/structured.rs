//! Structured extraction over the completion interface.
//!
//! Builds a completion request carrying the JSON Schema of the expected
//! output type, sends it at temperature 0.0, and parses the response
//! content. Markdown code fences around the JSON are tolerated since some
//! providers wrap structured output despite the schema hint.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use vetta_types::config::LlmSettings;
use vetta_types::llm::{CompletionRequest, LlmError, Message, MessageRole};

use super::box_provider::BoxLlmProvider;
use super::retry::RetryPolicy;

/// Request a structured record of type `T` from the model.
///
/// Retries transient failures per `retry`; a response that fails to parse
/// after all attempts surfaces as [`LlmError::Deserialization`].
pub async fn request<T>(
    provider: &BoxLlmProvider,
    retry: &RetryPolicy,
    settings: &LlmSettings,
    op_name: &str,
    system_prompt: &str,
    user_prompt: &str,
) -> Result<T, LlmError>
where
    T: DeserializeOwned + JsonSchema,
{
    let schema = serde_json::to_value(schemars::schema_for!(T))
        .map_err(|e| LlmError::InvalidRequest(format!("schema generation failed: {e}")))?;

    let request = CompletionRequest {
        model: settings.model.clone(),
        messages: vec![Message {
            role: MessageRole::User,
            content: user_prompt.to_string(),
        }],
        system: Some(system_prompt.to_string()),
        max_tokens: settings.max_tokens,
        temperature: Some(0.0),
        stream: false,
        output_schema: Some(schema),
    };

    retry
        .run(op_name, || async {
            let response = provider.complete(&request).await?;
            parse_content(&response.content)
        })
        .await
}

/// Parse structured content, stripping an optional markdown fence.
fn parse_content<T: DeserializeOwned>(content: &str) -> Result<T, LlmError> {
    let trimmed = strip_fence(content.trim());
    serde_json::from_str(trimmed).map_err(|e| {
        LlmError::Deserialization(format!(
            "{e} (content: {})",
            &trimmed[..trimmed.len().min(200)]
        ))
    })
}

fn strip_fence(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    // Drop the language tag line, then the trailing fence.
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
