use analyzer_core::CoreError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// Sent as the provider's API version header.
    pub protocol_version: String,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 2500,
            temperature: 0.2,
            top_p: 0.9,
            protocol_version: "2023-06-01".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub messages: Vec<Message>,
    pub params: GenerationParams,
}

impl ModelRequest {
    /// A single-turn request carrying `prompt` as the user message.
    pub fn from_prompt(prompt: impl Into<String>, params: GenerationParams) -> Self {
        Self {
            messages: vec![Message::user(prompt)],
            params,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    /// Raw generated text; empty when the provider returned no text block.
    pub text: String,
    pub model: Option<String>,
    pub stop_reason: Option<String>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

/// A hosted language model.
pub trait ModelProvider {
    fn model_id(&self) -> &str;

    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, CoreError>;
}
