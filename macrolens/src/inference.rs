//! Outbound client for the Gemini `generateContent` REST API.
//!
//! One call per analysis request: the handler hands over the base64-encoded
//! image, its MIME type, and the fixed instruction prompt; the client returns
//! the raw candidate text, which [`parse_estimate`] then validates against the
//! declared shape. The base URL is configurable so tests can point the client
//! at a mock server instead of the real service.

use crate::api::models::analyze::NutritionEstimate;
use crate::config::InferenceConfig;
use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Fixed instruction prompt sent with every image.
///
/// The structured-output mode makes the shape constraint redundant, but the
/// prompt still spells it out so the non-structured fallback keeps working.
pub const NUTRITION_PROMPT: &str = r#"Analyze the food in the image and return ONLY JSON with the EXACT format:

{
  "name": "text",
  "calories": number,
  "protein": number,
  "carbs": number,
  "fat": number,
  "fiber": number,
  "sodium": number
}

Do not write anything else."#;

/// Client for the Gemini multimodal inference API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
    structured_output: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

impl GeminiClient {
    /// Build a client from configuration.
    ///
    /// The request timeout is applied at the `reqwest` client level so a hung
    /// upstream call cannot stall a request indefinitely.
    pub fn new(config: &InferenceConfig) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("inference.api_key is not set"))?;

        let endpoint = config
            .base_url
            .join(&format!("v1beta/models/{}:generateContent", config.model))?;

        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http,
            endpoint,
            api_key,
            structured_output: config.structured_output,
        })
    }

    /// Send one image + prompt to the inference service and return the raw
    /// candidate text.
    pub async fn generate_content(&self, mime_type: &str, data_base64: String, prompt: &str) -> Result<String> {
        let generation_config = self.structured_output.then(|| GenerationConfig {
            response_mime_type: "application/json".to_string(),
            response_schema: NutritionEstimate::response_schema(),
        });

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        inline_data: Some(InlineData {
                            mime_type: mime_type.to_string(),
                            data: data_base64,
                        }),
                        text: None,
                    },
                    Part {
                        inline_data: None,
                        text: Some(prompt.to_string()),
                    },
                ],
            }],
            generation_config,
        };

        let response = self
            .http
            .post(self.endpoint.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Inference {
                message: format!("request to inference service failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference {
                message: format!("inference service returned {status}: {}", truncate(&body, 512)),
            });
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| Error::MalformedResponse {
            message: format!("could not decode inference response: {e}"),
        })?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().find_map(|part| part.text))
            .ok_or_else(|| Error::MalformedResponse {
                message: "inference response contained no candidate text".to_string(),
            })
    }
}

/// Parse candidate text into the declared estimate shape.
///
/// This is the validation side of [`NutritionEstimate::response_schema`]: the
/// text must be a JSON object carrying exactly the advertised numeric fields.
pub fn parse_estimate(text: &str) -> Result<NutritionEstimate> {
    serde_json::from_str(text).map_err(|e| Error::MalformedResponse {
        message: format!("inference output is not a valid nutrition estimate: {e}"),
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
