use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{Advice, AdvisoryService, build_prompt, parse_advice};
use crate::models::ListingRecord;
use crate::utils::error::AdvisorError;

pub const GROQ_API_KEY_VAR: &str = "GROQ_API_KEY";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const GROQ_MODEL: &str = "llama-3.3-70b-versatile";

const MAX_TOKENS_WITH_AD_TEXT: u32 = 800;
const MAX_TOKENS_WITHOUT_AD_TEXT: u32 = 500;

/// OpenAI-compatible chat completion client for Groq.
pub struct GroqAdvisor {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

impl GroqAdvisor {
    pub fn new(api_key: impl Into<String>) -> Result<Self, AdvisorError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            api_key: api_key.into(),
            model: GROQ_MODEL.to_string(),
            base_url: GROQ_BASE_URL.to_string(),
            client,
        })
    }

    /// Build from `GROQ_API_KEY`.
    pub fn from_env() -> Result<Self, AdvisorError> {
        Self::from_api_key(std::env::var(GROQ_API_KEY_VAR).ok())
    }

    fn from_api_key(api_key: Option<String>) -> Result<Self, AdvisorError> {
        match api_key.filter(|key| !key.trim().is_empty()) {
            Some(key) => Self::new(key.trim()),
            None => Err(AdvisorError::NotConfigured(format!("{} is not set", GROQ_API_KEY_VAR))),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn to_request(&self, prompt: String, with_ad_text: bool) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
            max_tokens: if with_ad_text {
                MAX_TOKENS_WITH_AD_TEXT
            } else {
                MAX_TOKENS_WITHOUT_AD_TEXT
            },
        }
    }
}

#[async_trait]
impl AdvisoryService for GroqAdvisor {
    async fn generate_advice(
        &self,
        record: &ListingRecord,
        ad_text: Option<&str>,
    ) -> Result<Advice, AdvisorError> {
        let with_ad_text = ad_text.is_some_and(|text| !text.trim().is_empty());
        let request = self.to_request(build_prompt(record, ad_text), with_ad_text);
        debug!("Requesting advice for {} from {}", record.url, self.model);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AdvisorError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatResponse = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(AdvisorError::EmptyResponse)?;

        parse_advice(&content)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
