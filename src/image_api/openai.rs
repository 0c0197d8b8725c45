//! REST client for the OpenAI image generation endpoint

use async_trait::async_trait;
use serde::Deserialize;

use super::{ImageApiError, ImageGenerator, ImageRequest};

/// Default API host
pub const DEFAULT_API_URL: &str = "https://api.openai.com";

/// Default image model
pub const DEFAULT_MODEL: &str = "dall-e-3";

/// HTTP client for the `/v1/images/generations` endpoint
pub struct OpenAiImages {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: String,
}

impl OpenAiImages {
    /// Create a client against the default host and model
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), DEFAULT_API_URL, api_key)
    }

    /// Create a client reusing an existing [`reqwest::Client`]
    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Override the image model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn request_body(&self, request: &ImageRequest) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "prompt": request.prompt,
            "n": 1,
            "size": request.size.as_str(),
            "response_format": "url",
            "quality": request.quality.as_str(),
        })
    }

    /// Turn a non-2xx response into an [`ImageApiError::Api`], decoding the
    /// `{"error": {"code", "message"}}` envelope when present
    async fn api_error(response: reqwest::Response) -> ImageApiError {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        parse_error_body(status, &body)
    }
}

pub(crate) fn parse_error_body(status: u16, body: &str) -> ImageApiError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => ImageApiError::Api {
            status,
            code: envelope.error.code,
            message: envelope.error.message,
        },
        Err(_) => ImageApiError::Api {
            status,
            code: None,
            message: body.to_string(),
        },
    }
}

fn first_url(response: GenerationResponse) -> Result<String, ImageApiError> {
    response
        .data
        .into_iter()
        .next()
        .and_then(|image| image.url)
        .filter(|url| !url.is_empty())
        .ok_or(ImageApiError::MissingUrl)
}

#[async_trait]
impl ImageGenerator for OpenAiImages {
    async fn generate(&self, request: &ImageRequest) -> Result<String, ImageApiError> {
        tracing::debug!(prompt = %request.prompt, size = request.size.as_str(), "Requesting image");

        let response = self
            .client
            .post(format!("{}/v1/images/generations", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        first_url(response.json::<GenerationResponse>().await?)
    }
}
