use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::{CONFIG, STYLE_ANALYSIS_PROMPT};
use crate::llm::media::EncodedImage;
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

const ERROR_BODY_LOG_LIMIT: usize = 2000;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Request to the vision model failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Vision model request failed with status {status}: {message}")]
    Api { status: StatusCode, message: String },
    #[error("Vision model returned no analysis text")]
    MalformedResponse,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: Option<String>,
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Some(message) = value.pointer("/error/message").and_then(|v| v.as_str()) {
            return message.to_string();
        }
        return truncate_for_log(&value.to_string(), ERROR_BODY_LOG_LIMIT);
    }

    truncate_for_log(trimmed, ERROR_BODY_LOG_LIMIT)
}

pub fn build_style_analysis_payload(image: &EncodedImage, model: &str, max_tokens: u32) -> Value {
    json!({
        "model": model,
        "messages": [
            {
                "role": "user",
                "content": [
                    { "type": "text", "text": STYLE_ANALYSIS_PROMPT },
                    {
                        "type": "image_url",
                        "image_url": { "url": image.data_url() }
                    }
                ]
            }
        ],
        "max_tokens": max_tokens
    })
}

fn extract_reply(response: ChatCompletionResponse) -> Result<String, AnalysisError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or(AnalysisError::MalformedResponse)
}

fn parse_reply(body: &str) -> Result<String, AnalysisError> {
    let parsed = serde_json::from_str::<ChatCompletionResponse>(body).map_err(|err| {
        warn!(
            "Unparseable chat completion body ({err}): {}",
            truncate_for_log(body, ERROR_BODY_LOG_LIMIT)
        );
        AnalysisError::MalformedResponse
    })?;
    extract_reply(parsed)
}

async fn call_chat_completions(
    client: &Client,
    base_url: &str,
    api_key: &str,
    payload: &Value,
) -> Result<String, AnalysisError> {
    let response = client
        .post(format!("{}/chat/completions", base_url.trim_end_matches('/')))
        .bearer_auth(api_key)
        .json(payload)
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(AnalysisError::Api {
            status,
            message: summarize_error_body(&body),
        });
    }

    parse_reply(&body)
}

/// Connection details for one chat-completions endpoint.
struct Endpoint<'a> {
    client: &'a Client,
    base_url: &'a str,
    api_key: &'a str,
    model: &'a str,
    max_tokens: u32,
}

async fn request_style_analysis(
    endpoint: &Endpoint<'_>,
    image: &EncodedImage,
) -> Result<String, AnalysisError> {
    let payload = build_style_analysis_payload(image, endpoint.model, endpoint.max_tokens);
    debug!(
        "Style analysis request: model={}, mime_type={}, encoded_len={}",
        endpoint.model,
        image.mime_type,
        image.base64.len()
    );

    let metadata = json!({ "mime_type": image.mime_type, "encoded_len": image.base64.len() });
    let result = log_llm_timing("openai", endpoint.model, "style_analysis", Some(metadata), || {
        call_chat_completions(endpoint.client, endpoint.base_url, endpoint.api_key, &payload)
    })
    .await;

    match result {
        Ok(reply) => {
            debug!("Style analysis returned {} chars", reply.chars().count());
            Ok(reply)
        }
        Err(err) => {
            error!("Error analyzing outfit: {err}");
            Err(err)
        }
    }
}

/// Sends the outfit photo with the fixed stylist prompt and returns the
/// model's reply untouched.
pub async fn analyze_outfit(image: &EncodedImage) -> Result<String, AnalysisError> {
    let endpoint = Endpoint {
        client: get_http_client(),
        base_url: CONFIG.openai_base_url.as_str(),
        api_key: CONFIG.openai_api_key.trim(),
        model: CONFIG.openai_model.as_str(),
        max_tokens: CONFIG.openai_max_tokens,
    };
    request_style_analysis(&endpoint, image).await
}
