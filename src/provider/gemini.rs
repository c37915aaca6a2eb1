use super::{GenerativeModel, ProviderResult};
use crate::{
    config::{GeminiConfig, DEFAULT_GEMINI_BASE_URL, DEFAULT_PROVIDER_TIMEOUT},
    error::{BanneriaError, ProviderError, Result},
    logger,
    models::{ModelInfo, ModelInput, ModelResponse, OutputKind, ResponsePart},
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

/// Google Generative Language API client.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| BanneriaError::ConfigError("GEMINI_API_KEY is required".into()))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(config.timeout.unwrap_or(DEFAULT_PROVIDER_TIMEOUT))
            .build()
            .map_err(|e| BanneriaError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    async fn error_from_response(response: reqwest::Response) -> ProviderError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        parse_error_body(status, &body)
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, model_id: &str, input: &ModelInput) -> ProviderResult<ModelResponse> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model_id);
        let payload = build_request_body(input);

        log::info!("Invoking model: {}", model_id);
        log::debug!(
            "Generation request: {} prompt chars, {} inline images",
            input.prompt.len(),
            input.images.len()
        );
        let _timer = logger::timer(&format!("generateContent {}", model_id));

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                log::error!("Gemini transport error for {}: {}", model_id, e);
                let err = ProviderError::new(format!("Gemini request failed: {}", e));
                match e.status() {
                    Some(status) => err.with_status(status.as_u16()),
                    None => err,
                }
            })?;

        if !response.status().is_success() {
            let err = Self::error_from_response(response).await;
            log::warn!("Gemini returned an error for {}: {}", model_id, err);
            return Err(err);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::new(format!("Malformed Gemini response: {}", e)))?;

        parse_generate_response(model_id, body)
    }

    async fn list_models(&self) -> ProviderResult<Vec<ModelInfo>> {
        let response = self
            .client
            .get(&format!("{}/models", self.base_url))
            .query(&[("pageSize", "1000")])
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Gemini request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let listing: ModelListing = response
            .json()
            .await
            .map_err(|e| ProviderError::new(format!("Malformed model listing: {}", e)))?;

        Ok(listing
            .models
            .into_iter()
            .map(|model| ModelInfo {
                id: model
                    .name
                    .strip_prefix("models/")
                    .unwrap_or(&model.name)
                    .to_string(),
                display_name: model.display_name,
                supported_methods: model.supported_generation_methods,
            })
            .collect())
    }
}

pub(crate) fn build_request_body(input: &ModelInput) -> Value {
    let mut parts = vec![json!({ "text": input.prompt })];
    parts.extend(input.images.iter().map(|image| {
        json!({
            "inlineData": {
                "mimeType": image.mime_type,
                "data": image.to_base64()
            }
        })
    }));

    let modalities = match input.output {
        OutputKind::Image => json!(["TEXT", "IMAGE"]),
        OutputKind::Text => json!(["TEXT"]),
    };

    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": { "responseModalities": modalities }
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: Option<String>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<u16>,
    message: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelListing {
    #[serde(default)]
    models: Vec<ListedModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedModel {
    name: String,
    display_name: Option<String>,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

pub(crate) fn parse_generate_response(model_id: &str, body: Value) -> ProviderResult<ModelResponse> {
    let parsed: GenerateContentResponse = serde_json::from_value(body)
        .map_err(|e| ProviderError::new(format!("Unexpected Gemini response shape: {}", e)))?;

    if parsed.candidates.is_empty() {
        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ProviderError::new(format!("Prompt blocked by provider: {}", reason))
                .with_code(reason));
        }
    }

    let mut response = ModelResponse::new(model_id);
    let parts = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts)
        .unwrap_or_default();

    for part in parts {
        if let Some(inline) = part.inline_data {
            let Some(data) = inline.data.filter(|d| !d.trim().is_empty()) else {
                continue;
            };
            match STANDARD.decode(data.trim()) {
                Ok(bytes) => response.parts.push(ResponsePart::InlineData {
                    mime_type: inline.mime_type,
                    data: bytes,
                }),
                Err(e) => log::warn!("Skipping undecodable inline data from {}: {}", model_id, e),
            }
        } else if let Some(text) = part.text {
            response.parts.push(ResponsePart::Text(text));
        }
    }

    Ok(response)
}

pub(crate) fn parse_error_body(status: u16, body: &str) -> ProviderError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let mut err = ProviderError::new(
                envelope
                    .error
                    .message
                    .unwrap_or_else(|| "unknown provider error".into()),
            )
            .with_status(envelope.error.code.unwrap_or(status));
            if let Some(code) = envelope.error.status {
                err = err.with_code(code);
            }
            err
        }
        Err(_) => {
            let message = if body.trim().is_empty() {
                format!("HTTP {}", status)
            } else {
                body.trim().to_string()
            };
            ProviderError::new(message).with_status(status)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InlineImage;

    #[test]
    fn request_body_carries_prompt_then_images() {
        let input = ModelInput::image(
            "make a banner",
            vec![InlineImage::new("image/png", vec![0x89, 0x50, 0x4E, 0x47])],
        );
        let body = build_request_body(&input);
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "make a banner");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inlineData"]["data"], "iVBORw==");
        assert_eq!(
            body["generationConfig"]["responseModalities"],
            json!(["TEXT", "IMAGE"])
        );

        let caption = build_request_body(&ModelInput::text("caption"));
        assert_eq!(
            caption["generationConfig"]["responseModalities"],
            json!(["TEXT"])
        );
    }

    #[test]
    fn parses_inline_data_and_text_parts() {
        let body = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "Here is your banner" },
                        { "inlineData": { "mimeType": "image/png", "data": "iVBORw==" } }
                    ]
                }
            }]
        });
        let response = parse_generate_response("gemini-test", body).unwrap();
        assert_eq!(response.model, "gemini-test");
        assert_eq!(
            response.parts,
            vec![
                ResponsePart::Text("Here is your banner".into()),
                ResponsePart::InlineData {
                    mime_type: Some("image/png".into()),
                    data: vec![0x89, 0x50, 0x4E, 0x47],
                },
            ]
        );
    }

    #[test]
    fn blocked_prompt_is_an_error() {
        let body = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = parse_generate_response("m", body).unwrap_err();
        assert_eq!(err.code.as_deref(), Some("SAFETY"));
    }

    #[test]
    fn empty_candidates_yield_empty_response() {
        let response = parse_generate_response("m", json!({})).unwrap();
        assert!(response.parts.is_empty());
    }

    #[test]
    fn parses_structured_error_bodies() {
        let body = r#"{"error":{"code":503,"message":"The model is overloaded.","status":"UNAVAILABLE"}}"#;
        let err = parse_error_body(503, body);
        assert_eq!(err.status, Some(503));
        assert_eq!(err.code.as_deref(), Some("UNAVAILABLE"));
        assert_eq!(err.message, "The model is overloaded.");

        let plain = parse_error_body(502, "Bad Gateway");
        assert_eq!(plain.status, Some(502));
        assert_eq!(plain.message, "Bad Gateway");
    }
}
