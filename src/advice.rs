//! Farmer-facing advice from the Gemini text generation API.
//!
//! The advisor turns a reading and its crop recommendation into a short
//! bullet list of practical guidance.

use crate::config::AdviceConfig;
use crate::core::reading::Reading;
use crate::model::CropPrediction;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default Gemini API base URL.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Advice generation errors.
#[derive(Debug, Error)]
pub enum AdviceError {
    /// Network/HTTP error
    #[error("advice network error: {0}")]
    Network(String),

    /// The API returned an error response
    #[error("advice server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The response did not contain generated text
    #[error("unexpected advice response: {0}")]
    Parse(String),
}

/// Produces advice text for a detected change.
#[async_trait]
pub trait AdviceGenerator: Send + Sync {
    async fn generate(
        &self,
        reading: &Reading,
        prediction: &CropPrediction,
    ) -> Result<String, AdviceError>;
}

/// Build the advice prompt for a reading and its recommended crop.
pub fn build_prompt(reading: &Reading, prediction: &CropPrediction, region: &str) -> String {
    format!(
        "Based on the given soil and climate data Nitrogen: {}, Phosphorus: {}, Potassium: {}, \
         Temperature: {}, Humidity: {}, pH Value: {}, Rainfall: {}, the recommended crop is {} \
         for {}. Write farmer-friendly advice in simple English, within 70 words, in clear \
         bullet points. Do not include any introductory phrases like 'Here is your advice', \
         only the direct guidance.",
        reading.nitrogen(),
        reading.phosphorus(),
        reading.potassium(),
        reading.temperature(),
        reading.humidity(),
        reading.ph(),
        reading.rainfall(),
        prediction.crop_name,
        region,
    )
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

/// Subset of the `generateContent` response we read.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .find_map(|p| p.text)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

/// Gemini-backed advisor.
pub struct GeminiAdvisor {
    api_key: String,
    model: String,
    region: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiAdvisor {
    pub fn new(api_key: impl Into<String>, config: &AdviceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            api_key: api_key.into(),
            model: config.model.clone(),
            region: config.region.clone(),
            base_url: GEMINI_API_BASE.to_string(),
            client,
        }
    }

    /// Point the advisor at another endpoint (used against local stubs).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Create an advisor if the configuration carries an API key.
    pub fn from_config(config: &AdviceConfig) -> Option<Self> {
        config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(|key| Self::new(key, config))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// `generateContent` endpoint for the configured model.
    pub fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    async fn complete(&self, prompt: &str) -> Result<String, AdviceError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AdviceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AdviceError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AdviceError::Parse(e.to_string()))?;

        body.text()
            .ok_or_else(|| AdviceError::Parse("missing candidates[0].content.parts[0].text".to_string()))
    }
}

#[async_trait]
impl AdviceGenerator for GeminiAdvisor {
    async fn generate(
        &self,
        reading: &Reading,
        prediction: &CropPrediction,
    ) -> Result<String, AdviceError> {
        let prompt = build_prompt(reading, prediction, &self.region);
        self.complete(&prompt).await
    }
}
