use crate::provider::{GenerationParams, Message, ModelProvider, ModelRequest, ModelResponse};
use analyzer_core::{CoreError, LlmError};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

const PROVIDER: &str = "anthropic";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Serialize)]
struct MessagesRequestBody<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    messages: &'a [Message],
}

#[derive(Debug, Deserialize)]
struct MessagesResponseBody {
    #[serde(default)]
    content: Vec<ContentBlock>,
    model: Option<String>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

/// Anthropic Messages API client.
#[derive(Debug)]
pub struct AnthropicProvider {
    http_client: Client,
    api_key: String,
    model_id: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model_id: String) -> Result<Self, CoreError> {
        let http_client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            http_client,
            api_key,
            model_id,
            base_url: analyzer_core::DEFAULT_MODEL_API_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn headers(&self, params: &GenerationParams) -> Result<HeaderMap, CoreError> {
        let invalid = |what: &str| {
            CoreError::Llm(LlmError::InvalidPrompt {
                reason: format!("{what} is not a valid header value"),
            })
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|_| invalid("API key"))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_str(&params.protocol_version)
                .map_err(|_| invalid("protocol version"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

impl ModelProvider for AnthropicProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, CoreError> {
        if request.messages.is_empty() {
            return Err(CoreError::Llm(LlmError::InvalidPrompt {
                reason: "no messages".to_string(),
            }));
        }

        let url = format!("{}/messages", self.base_url);
        let body = request_body(&self.model_id, request);
        info!(
            "Invoking model: {} with max_tokens: {}",
            self.model_id, body.max_tokens
        );

        let response = self
            .http_client
            .post(&url)
            .headers(self.headers(&request.params)?)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Network error calling {}: {}", url, e);
                if e.is_timeout() {
                    CoreError::Llm(LlmError::RequestTimeout {
                        provider: PROVIDER.to_string(),
                    })
                } else {
                    CoreError::Network(e)
                }
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let text = response.text().await?;

        if !status.is_success() {
            error!("Model request failed with status: {}", status);
            return Err(status_error(status, retry_after, &self.model_id, &text));
        }

        debug!("Model response received ({} bytes)", text.len());
        parse_response_body(&text)
    }
}

fn request_body<'a>(model_id: &'a str, request: &'a ModelRequest) -> MessagesRequestBody<'a> {
    MessagesRequestBody {
        model: model_id,
        max_tokens: request.params.max_tokens,
        temperature: request.params.temperature,
        top_p: request.params.top_p,
        messages: &request.messages,
    }
}

fn status_error(
    status: StatusCode,
    retry_after: Option<u64>,
    model_id: &str,
    body: &str,
) -> CoreError {
    let provider = PROVIDER.to_string();
    let error = match status.as_u16() {
        401 | 403 => LlmError::AuthenticationFailed { provider },
        404 => LlmError::ModelNotAvailable {
            model: model_id.to_string(),
        },
        429 => LlmError::RateLimitExceeded {
            provider,
            retry_after: retry_after.unwrap_or(60),
        },
        529 => LlmError::ServiceUnavailable { provider },
        code if status.is_server_error() => {
            if code == 504 {
                LlmError::RequestTimeout { provider }
            } else {
                LlmError::ServiceUnavailable { provider }
            }
        }
        code => LlmError::RequestFailed {
            provider,
            status_code: code,
            message: body.chars().take(500).collect(),
        },
    };
    CoreError::Llm(error)
}

/// Pulls the first text block and metadata out of a Messages API response.
fn parse_response_body(body: &str) -> Result<ModelResponse, CoreError> {
    let parsed: MessagesResponseBody = serde_json::from_str(body).map_err(|e| {
        CoreError::Llm(LlmError::InvalidResponseFormat {
            provider: PROVIDER.to_string(),
            details: e.to_string(),
        })
    })?;

    let text = parsed
        .content
        .into_iter()
        .find_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Other => None,
        })
        .unwrap_or_default();

    Ok(ModelResponse {
        text,
        model: parsed.model,
        stop_reason: parsed.stop_reason,
        input_tokens: parsed.usage.as_ref().and_then(|u| u.input_tokens),
        output_tokens: parsed.usage.as_ref().and_then(|u| u.output_tokens),
    })
}
