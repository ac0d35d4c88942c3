use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use image::DynamicImage;

use crate::config::{CaptionBackend, CaptionConfig};

mod blip;
mod openai;

pub use blip::{BlipCaptioner, BlipVariant};
pub use openai::OpenAiCaptioner;

#[derive(thiserror::Error, Debug)]
pub enum CaptionError {
    #[error("could not decode the uploaded image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("the model returned an empty caption")]
    Empty,
    #[error("caption model failed: {0}")]
    Model(#[from] candle_core::Error),
    #[error("caption API request failed: {0}")]
    Remote(#[from] async_openai::error::OpenAIError),
    #[error("caption generation failed: {0}")]
    Other(String),
}

/// Turns image bytes into one English sentence describing them.
#[async_trait]
pub trait CaptionGenerator: Send + Sync {
    async fn generate_caption(&self, image_bytes: &[u8]) -> Result<String, CaptionError>;
}

/// Decode uploaded bytes, guessing the format from the content rather than the file name.
pub fn decode_image(image_bytes: &[u8]) -> Result<DynamicImage, CaptionError> {
    Ok(image::load_from_memory(image_bytes)?)
}

/// Convert image bytes to a data URL, keeping the uploaded encoding.
pub fn to_data_url(bytes: &[u8]) -> String {
    let mime = image::guess_format(bytes)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream");
    format!(
        "data:{};base64,{}",
        mime,
        // For the purpose of data urls, you do NOT need to use the URL_SAFE variant
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Reject captions that are nothing but whitespace, and trim the rest.
pub(crate) fn non_empty(caption: &str) -> Result<String, CaptionError> {
    let caption = caption.trim();
    if caption.is_empty() {
        Err(CaptionError::Empty)
    } else {
        Ok(caption.to_string())
    }
}

/// Build the captioner selected in the configuration. Loading BLIP reads the weights eagerly.
pub fn from_config(config: &CaptionConfig) -> Result<Arc<dyn CaptionGenerator>> {
    Ok(match config.caption_backend {
        CaptionBackend::Blip => Arc::new(
            BlipCaptioner::load(
                &config.blip_model,
                &config.blip_tokenizer,
                config.blip_variant,
                config.max_caption_tokens,
            )
            .with_context(|| format!("Loading BLIP from {}", config.blip_model.display()))?,
        ),
        CaptionBackend::Openai => Arc::new(
            OpenAiCaptioner::from_env(&config.openai_api_base, &config.openai_model)
                .context("Building OpenAI caption client")?,
        ),
    })
}
