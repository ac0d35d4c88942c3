use anyhow::Result;
use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;

use async_openai::types::{
    ChatCompletionRequestMessageContentPartImageArgs,
    ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, ImageDetail, ImageUrlArgs,
};

use super::{decode_image, non_empty, to_data_url, CaptionError, CaptionGenerator};

const CAPTION_PROMPT: &str =
    "Describe this image in one short English sentence, like a photo caption. Reply with the caption only.";

/// Captions through an OpenAI compatible vision chat endpoint.
pub struct OpenAiCaptioner {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiCaptioner {
    pub fn new(api_base: &str, api_key: &str, model: &str) -> Self {
        let config = OpenAIConfig::new()
            .with_api_base(api_base)
            .with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }

    /// Read the key from OPENAI_API_KEY. Local servers such as Ollama accept any key.
    pub fn from_env(api_base: &str, model: &str) -> Result<Self> {
        let api_key = dotenvy::var("OPENAI_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!("OPENAI_API_KEY is not set, sending caption requests without a key");
        }
        Ok(Self::new(api_base, &api_key, model))
    }
}

#[async_trait]
impl CaptionGenerator for OpenAiCaptioner {
    async fn generate_caption(&self, image_bytes: &[u8]) -> Result<String, CaptionError> {
        let img = decode_image(image_bytes)?;
        if (img.height() * img.width()) > 2 << 20 {
            tracing::warn!(
                "Image is probably larger than it needs to be. ({h}x{w}) Consider resizing.",
                h = img.height(),
                w = img.width()
            );
        }

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_tokens(60_u32)
            .messages([ChatCompletionRequestUserMessageArgs::default()
                .content(vec![
                    ChatCompletionRequestMessageContentPartTextArgs::default()
                        .text(CAPTION_PROMPT)
                        .build()?
                        .into(),
                    ChatCompletionRequestMessageContentPartImageArgs::default()
                        .image_url(
                            ImageUrlArgs::default()
                                .url(to_data_url(image_bytes))
                                .detail(ImageDetail::Low)
                                .build()?,
                        )
                        .build()?
                        .into(),
                ])
                .build()?
                .into()])
            .build()?;
        let content = self
            .client
            .chat()
            .create(request)
            .await?
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(CaptionError::Empty)?;
        non_empty(&content)
    }
}
