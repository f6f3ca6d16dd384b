//! Image generation, Gemini `generateContent` style.
//!
//! Each request carries the prompt plus the reference images inline. Models are
//! tried in order. A 404, or a retryable failure that outlasts the retry budget,
//! moves on to the next model; a terminal error or any reply is final for the entry.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use super::{Artifact, ArtifactSource, Fetched};
use crate::catalog::CatalogEntry;
use crate::constants::{
    DEFAULT_GENERATION_API_BASE, DEFAULT_GENERATION_MODELS, DEFAULT_PROMPT_TEMPLATE,
    GENERATION_TIMEOUT, X_GOOG_API_KEY,
};
use crate::error::{FetchError, PipelineError};
use crate::retry::{RetryPolicy, Verdict, retry_with_backoff};

/// An image sent along with every generation request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReferenceImage {
    /// Where it was loaded from
    pub path: PathBuf,
    /// MIME type sent to the remote
    pub mime_type: String,
    /// Base64 payload
    pub data: String,
}

impl ReferenceImage {
    /// Reads and encodes a reference image. A missing file stops the run.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        if !path.is_file() {
            return Err(PipelineError::MissingReference(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        let format = image::ImageFormat::from_path(path)
            .ok()
            .or_else(|| image::guess_format(&bytes).ok());
        let mime_type = format
            .map(|format| format.to_mime_type())
            .unwrap_or("image/jpeg")
            .to_string();
        Ok(Self {
            path: path.to_path_buf(),
            mime_type,
            data: general_purpose::STANDARD.encode(bytes),
        })
    }
}

/// Settings for [`GenerateSource`].
#[derive(Clone, Debug)]
pub struct GenerateConfig {
    /// API base, models are appended as `models/{model}:generateContent`
    pub api_base: String,
    /// Sent as `x-goog-api-key`
    pub api_key: String,
    /// Models tried in order
    pub models: Vec<String>,
    /// Prompt with `{name}` and `{strength}` placeholders
    pub prompt_template: String,
    /// Eg `1:1`
    pub aspect_ratio: String,
    /// Eg `2K`
    pub image_size: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl GenerateConfig {
    /// Defaults for everything but the key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_GENERATION_API_BASE.to_string(),
            api_key: api_key.into(),
            models: DEFAULT_GENERATION_MODELS
                .iter()
                .map(|model| model.to_string())
                .collect(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            aspect_ratio: "1:1".to_string(),
            image_size: "2K".to_string(),
            timeout: GENERATION_TIMEOUT,
        }
    }
}

// -----------------------------
// Wire format
// -----------------------------

#[derive(Serialize, Debug)]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize, Debug)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize, Debug)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text { text: &'a str },
    Inline { inline_data: RequestInlineData<'a> },
}

#[derive(Serialize, Debug)]
struct RequestInlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize, Debug)]
struct GenerationConfig<'a> {
    #[serde(rename = "responseModalities")]
    response_modalities: [&'static str; 2],
    #[serde(rename = "imageConfig")]
    image_config: ImageConfig<'a>,
}

#[derive(Serialize, Debug)]
struct ImageConfig<'a> {
    #[serde(rename = "aspectRatio")]
    aspect_ratio: &'a str,
    #[serde(rename = "imageSize")]
    image_size: &'a str,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default, rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "inlineData", alias = "inline_data")]
    inline_data: Option<ResponseInlineData>,
}

#[derive(Deserialize, Debug)]
struct ResponseInlineData {
    #[serde(default, rename = "mimeType", alias = "mime_type")]
    mime_type: String,
    #[serde(default)]
    data: String,
}

// -----------------------------
// Prompt
// -----------------------------

/// Dosage text shown on the label.
pub fn strength_label(name: &str) -> &'static str {
    if name.contains("5mg") || name.contains("10mg") {
        "5 \u{2013} 15 mg"
    } else {
        "10 mg"
    }
}

/// Fills in `{name}` and `{strength}`.
pub fn render_prompt(template: &str, name: &str) -> String {
    template
        .replace("{name}", name)
        .replace("{strength}", strength_label(name))
}

/// Pulls the first image out of a response, or explains why there isn't one.
fn extract_image(response: GenerateResponse) -> Result<Fetched, FetchError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Ok(Fetched::NotFound("response had no candidates".to_string()));
    };

    let parts = candidate
        .content
        .map(|content| content.parts)
        .unwrap_or_default();
    let mut texts = Vec::new();
    for part in parts {
        if let Some(inline) = part.inline_data
            && inline.mime_type.starts_with("image/")
        {
            let bytes = general_purpose::STANDARD
                .decode(inline.data.trim())
                .map_err(|err| FetchError::Malformed(format!("bad base64 image: {err}")))?;
            if bytes.is_empty() {
                continue;
            }
            return Ok(Fetched::Found(Artifact::Inline {
                bytes,
                mime_type: Some(inline.mime_type),
            }));
        }
        if let Some(text) = part.text {
            texts.push(text);
        }
    }

    let reason = if texts.is_empty() {
        match candidate.finish_reason {
            Some(finish) => format!("no image in response (finish reason {finish})"),
            None => "no image in response".to_string(),
        }
    } else {
        let text = texts.join(" ");
        let text: String = text.chars().take(200).collect();
        format!("model replied with text only: {text}")
    };
    Ok(Fetched::NotFound(reason))
}

/// Generates an image for an entry from a prompt and reference images.
#[derive(Debug)]
pub struct GenerateSource {
    client: reqwest::Client,
    endpoints: Vec<(String, Url)>,
    references: Vec<ReferenceImage>,
    config: GenerateConfig,
}

impl GenerateSource {
    /// Resolves the model endpoints and builds the HTTP client.
    pub fn new(
        config: GenerateConfig,
        references: Vec<ReferenceImage>,
    ) -> Result<Self, PipelineError> {
        if config.models.is_empty() {
            return Err(PipelineError::InvalidUrl(
                "at least one model is required".to_string(),
            ));
        }
        let mut base = Url::parse(&config.api_base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoints = config
            .models
            .iter()
            .map(|model| {
                base.join(&format!("models/{model}:generateContent"))
                    .map(|url| (model.clone(), url))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            endpoints,
            references,
            config,
        })
    }

    fn request_body<'a>(&'a self, prompt: &'a str) -> GenerateRequest<'a> {
        let mut parts = vec![RequestPart::Text { text: prompt }];
        parts.extend(self.references.iter().map(|reference| RequestPart::Inline {
            inline_data: RequestInlineData {
                mime_type: &reference.mime_type,
                data: &reference.data,
            },
        }));
        GenerateRequest {
            contents: [RequestContent { parts }],
            generation_config: GenerationConfig {
                response_modalities: ["TEXT", "IMAGE"],
                image_config: ImageConfig {
                    aspect_ratio: &self.config.aspect_ratio,
                    image_size: &self.config.image_size,
                },
            },
        }
    }

    async fn generate_once(&self, endpoint: &Url, prompt: &str) -> Result<Fetched, FetchError> {
        let started = tokio::time::Instant::now();
        let response = self
            .client
            .post(endpoint.clone())
            .header(X_GOOG_API_KEY, &self.config.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(FetchError::from_status(status, &bytes));
        }
        info!(
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Generation response received"
        );

        let parsed: GenerateResponse = serde_json::from_slice(&bytes)?;
        extract_image(parsed)
    }
}

impl ArtifactSource for GenerateSource {
    fn name(&self) -> &'static str {
        "generate"
    }

    async fn fetch_artifact(
        &self,
        entry: &CatalogEntry,
        policy: &RetryPolicy,
    ) -> Result<Fetched, FetchError> {
        let this = self;
        let prompt = render_prompt(&self.config.prompt_template, &entry.name);
        let prompt = prompt.as_str();
        let mut last_error = None;

        for (model, endpoint) in &self.endpoints {
            info!("Generating {} with {model}", entry.name);
            match retry_with_backoff(policy, &entry.name, move || {
                this.generate_once(endpoint, prompt)
            })
            .await
            {
                Err(err) if err.status() == Some(StatusCode::NOT_FOUND) => {
                    warn!("Model {model} not found, trying next");
                    last_error = Some(err);
                }
                // Rate limits are per model.
                Err(err) if policy.classify(&err) != Verdict::Fail => {
                    warn!("Model {model} out of retries ({err}), trying next");
                    last_error = Some(err);
                }
                other => return other,
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::Malformed("no models configured".into())))
    }
}
