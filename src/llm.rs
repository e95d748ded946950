//! Hosted LLM adapter for answer synthesis.
//!
//! Calls the Anthropic Messages API with the same transient-failure policy
//! as the embedding client: retry 429/5xx and network errors with
//! exponential backoff, fail immediately on anything else. Requires the
//! `ANTHROPIC_API_KEY` environment variable.

use anyhow::Result;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::PipelineError;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_RETRIES: u32 = 3;

/// Request a completion for a fully rendered prompt and return its text.
pub async fn complete(config: &LlmConfig, prompt: &str) -> Result<String> {
    let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
        PipelineError::Backend("ANTHROPIC_API_KEY environment variable not set".to_string())
    })?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "model": config.model,
        "max_tokens": config.max_tokens,
        "messages": [{"role": "user", "content": prompt}],
    });

    let mut last_err = None;

    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_secs(1 << (attempt - 1))).await;
        }

        let resp = client
            .post(API_URL)
            .header("x-api-key", &api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    return parse_completion(&json);
                }

                let text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(PipelineError::Backend(format!(
                        "messages API error {}: {}",
                        status, text
                    )));
                    continue;
                }

                return Err(PipelineError::Backend(format!(
                    "messages API error {}: {}",
                    status, text
                ))
                .into());
            }
            Err(e) => {
                last_err = Some(PipelineError::Backend(e.to_string()));
                continue;
            }
        }
    }

    let err = last_err
        .unwrap_or_else(|| PipelineError::Backend("completion failed after retries".to_string()));
    Err(err.into())
}

fn parse_completion(json: &serde_json::Value) -> Result<String> {
    let blocks = json.get("content").and_then(|c| c.as_array()).ok_or_else(|| {
        PipelineError::Backend("invalid completion response: missing content".to_string())
    })?;

    let mut out = String::new();
    for block in blocks {
        if block.get("type").and_then(|t| t.as_str()) == Some("text") {
            if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                out.push_str(text);
            }
        }
    }

    if out.is_empty() {
        return Err(
            PipelineError::Backend("completion response contained no text".to_string()).into(),
        );
    }
    Ok(out)
}
