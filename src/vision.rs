use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::analysis::{AnalysisResult, analysis_from_text};
use crate::config::{DEFAULT_VISION_BASE_URL, VisionConfig};
use crate::model::{ModelVariant, first_success};
use crate::types::AnalysisRequest;
use crate::utils::http::response_text_truncated;
use crate::{Result, VitaError};

// Raw-image ceiling keeps the request below the provider's size limit after
// base64 encoding.
const MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;
const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;
const HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

/// Client for the image-understanding provider. Tries its model variants in
/// preference order until one answers, then normalizes the reply.
#[derive(Clone)]
pub struct VisionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model_order: Vec<ModelVariant>,
}

impl VisionClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            base_url: DEFAULT_VISION_BASE_URL.to_string(),
            api_key: api_key.into(),
            model_order: ModelVariant::default_order(),
        }
    }

    pub fn from_config(config: &VisionConfig) -> Self {
        let mut client = Self::new(config.api_key.clone());
        client.base_url = config.base_url.clone();
        client.model_order = config.model_order.clone();
        client
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model_order(mut self, model_order: Vec<ModelVariant>) -> Self {
        self.model_order = model_order;
        self
    }

    fn generate_url(&self, variant: &ModelVariant) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!(
            "{base}/{}/models/{}:generateContent",
            variant.api_version, variant.name
        )
    }

    /// Analyzes an uploaded image and returns normalized health advice.
    /// Validation failures surface before any network call.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult> {
        if request.image.is_empty() {
            return Err(VitaError::InvalidSubmission(
                "image data is required for analysis".to_string(),
            ));
        }
        if request.mime_type.trim().is_empty() {
            return Err(VitaError::InvalidSubmission(
                "an image mime type is required for analysis".to_string(),
            ));
        }
        if request.image.len() > MAX_IMAGE_BYTES {
            return Err(VitaError::InvalidSubmission(format!(
                "image is too large ({} bytes, limit {MAX_IMAGE_BYTES})",
                request.image.len()
            )));
        }

        let body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": build_prompt(request.notes.as_deref()) },
                    { "inlineData": {
                        "mimeType": request.mime_type,
                        "data": BASE64.encode(&request.image),
                    }},
                ],
            }],
        });

        let raw = first_success(&self.model_order, |variant| {
            let body = body.clone();
            async move { self.call_model(&variant, &body).await }
        })
        .await?;

        Ok(analysis_from_text(&raw).into_result(request.notes))
    }

    async fn call_model(&self, variant: &ModelVariant, body: &Value) -> Result<String> {
        let url = self.generate_url(variant);
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response_text_truncated(response, MAX_ERROR_BODY_BYTES).await;
            return Err(VitaError::ProviderRejected { status, body });
        }

        let parsed = response.json::<GenerateReply>().await?;
        let combined = parsed
            .candidates
            .first()
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .filter(|text| !text.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        debug!(model = %variant.name, bytes = combined.len(), "model reply received");
        Ok(combined.trim().to_string())
    }
}

fn build_prompt(notes: Option<&str>) -> String {
    let base = concat!(
        "You are a friendly health coach. Look at the person in the uploaded ",
        "image and describe what they might focus on for better health. Then ",
        "recommend three concise food ideas and three simple exercise ",
        "suggestions tailored to their apparent needs.\n\n",
        "Reply strictly as JSON with this structure:\n",
        "{\n",
        "  \"summary\": \"short overall health summary\",\n",
        "  \"foods\": [\"food idea 1\", \"food idea 2\", \"food idea 3\"],\n",
        "  \"exercises\": [\"exercise 1\", \"exercise 2\", \"exercise 3\"],\n",
        "  \"disclaimer\": \"short safety note\"\n",
        "}"
    );

    match notes.map(str::trim).filter(|notes| !notes.is_empty()) {
        Some(notes) => format!("{base}\n\nAdditional context from the user: {notes}"),
        None => base.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct GenerateReply {
    #[serde(default)]
    candidates: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_url_includes_version_and_model() {
        let client = VisionClient::new("key").with_base_url("https://mock.example.com/");
        let url = client.generate_url(&ModelVariant::new("gemini-pro", "v1"));
        assert_eq!(
            url,
            "https://mock.example.com/v1/models/gemini-pro:generateContent"
        );
    }

    #[test]
    fn prompt_appends_trimmed_notes() {
        let prompt = build_prompt(Some("  wants to lose weight "));
        assert!(prompt.ends_with("Additional context from the user: wants to lose weight"));
        assert_eq!(build_prompt(Some("  ")), build_prompt(None));
    }

    #[tokio::test]
    async fn oversized_image_fails_before_any_network_call() {
        let client = VisionClient::new("key");
        let err = client
            .analyze(AnalysisRequest {
                image: vec![0u8; MAX_IMAGE_BYTES + 1].into(),
                mime_type: "image/png".to_string(),
                notes: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VitaError::InvalidSubmission(_)));
    }

    #[tokio::test]
    async fn missing_image_fails_before_any_network_call() {
        let client = VisionClient::new("key");
        let err = client
            .analyze(AnalysisRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VitaError::InvalidSubmission(_)));
    }
}
