use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::blip::VisionConfig;
use candle_transformers::models::quantized_blip;
use candle_transformers::models::{blip, blip_text};
use image::DynamicImage;
use tokenizers::Tokenizer;

use super::{decode_image, non_empty, CaptionError, CaptionGenerator};

const BOS_TOKEN_ID: u32 = 30522;
const SEP_TOKEN_ID: u32 = 102;
const IMAGE_SIZE: u32 = 384;

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlipVariant {
    Base,
    Large,
}

impl BlipVariant {
    fn config(self) -> blip::Config {
        match self {
            BlipVariant::Base => blip_base_config(),
            BlipVariant::Large => blip::Config::image_captioning_large(),
        }
    }
}

fn blip_base_config() -> blip::Config {
    let text_config = blip_text::Config {
        vocab_size: 30524,
        hidden_size: 768,
        encoder_hidden_size: 768,
        intermediate_size: 3072,
        projection_dim: 768,
        num_hidden_layers: 12,
        num_attention_heads: 12,
        max_position_embeddings: 512,
        hidden_act: candle_nn::Activation::Gelu,
        layer_norm_eps: 1e-12,
        is_decoder: true,
    };
    let vision_config = VisionConfig {
        hidden_size: 768,
        intermediate_size: 3072,
        projection_dim: 512,
        num_hidden_layers: 12,
        num_attention_heads: 12,
        image_size: IMAGE_SIZE as usize,
        patch_size: 16,
        hidden_act: candle_nn::Activation::Gelu,
        layer_norm_eps: 1e-5,
    };

    blip::Config {
        text_config,
        vision_config,
        projection_dim: 512,
        image_text_hidden_size: 256,
    }
}

struct BlipModel {
    tokenizer: Tokenizer,
    model: quantized_blip::BlipForConditionalGeneration,
    logits_processor: LogitsProcessor,
    device: Device,
    max_tokens: usize,
}

/// Local BLIP image captioning.
///
/// The model is loaded once and shared. Generation mutates the decoder's kv cache,
/// so callers take turns through the mutex, on the blocking thread pool.
#[derive(Clone)]
pub struct BlipCaptioner {
    inner: Arc<Mutex<BlipModel>>,
}

impl BlipCaptioner {
    pub fn load(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        variant: BlipVariant,
        max_tokens: usize,
    ) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow!("failed to initialize tokenizer: {}", e))?;

        // No temperature means argmax, so the same image always gets the same caption.
        let logits_processor = LogitsProcessor::new(1337, None, None);

        let device = Device::Cpu;
        let vb = quantized_blip::VarBuilder::from_gguf(model_path, &device)?;
        let model = quantized_blip::BlipForConditionalGeneration::new(&variant.config(), vb)?;
        tracing::info!(?variant, "BLIP caption model loaded");

        Ok(Self {
            inner: Arc::new(Mutex::new(BlipModel {
                tokenizer,
                model,
                logits_processor,
                device,
                max_tokens,
            })),
        })
    }
}

#[async_trait]
impl CaptionGenerator for BlipCaptioner {
    async fn generate_caption(&self, image_bytes: &[u8]) -> Result<String, CaptionError> {
        let inner = self.inner.clone();
        decode_blocking(image_bytes, move |image| {
            let mut model = inner
                .lock()
                .map_err(|_| CaptionError::Other("caption model lock poisoned".into()))?;
            model.caption(&image)
        })
        .await
    }
}

/// Decode the upload and hand it to `f`, both on the blocking pool.
async fn decode_blocking<T, F>(image_bytes: &[u8], f: F) -> Result<T, CaptionError>
where
    T: Send + 'static,
    F: FnOnce(DynamicImage) -> Result<T, CaptionError> + Send + 'static,
{
    let image_bytes = image_bytes.to_vec();
    tokio::task::spawn_blocking(move || f(decode_image(&image_bytes)?))
        .await
        .map_err(|e| CaptionError::Other(format!("caption task failed: {}", e)))?
}

impl BlipModel {
    fn caption(&mut self, image: &DynamicImage) -> Result<String, CaptionError> {
        let image = preprocess(image)?.to_device(&self.device)?;
        let image_embeds = image.unsqueeze(0)?.apply(self.model.vision_model())?;

        let mut token_ids = vec![BOS_TOKEN_ID];

        // we need this to make multi time generation work
        self.model.text_decoder().reset_kv_cache();

        for index in 0..self.max_tokens {
            let context_size = if index > 0 { 1 } else { token_ids.len() };
            let start_pos = token_ids.len().saturating_sub(context_size);
            let input_ids = Tensor::new(&token_ids[start_pos..], &self.device)?.unsqueeze(0)?;
            let logits = self
                .model
                .text_decoder()
                .forward(&input_ids, &image_embeds)?;
            let logits = logits.squeeze(0)?;
            let logits = logits.get(logits.dim(0)? - 1)?;
            let token = self.logits_processor.sample(&logits)?;
            if token == SEP_TOKEN_ID {
                break;
            }
            token_ids.push(token);
        }

        let caption = self
            .tokenizer
            .decode(&token_ids, true)
            .map_err(|e| CaptionError::Other(format!("failed to decode caption: {}", e)))?;
        tracing::debug!(%caption, tokens = token_ids.len(), "BLIP caption generated");
        non_empty(&caption)
    }
}

/// Resize to the model's input size and normalize with the CLIP mean and std, channels first.
fn preprocess(img: &DynamicImage) -> candle_core::Result<Tensor> {
    let img = img
        .resize_exact(IMAGE_SIZE, IMAGE_SIZE, image::imageops::FilterType::CatmullRom)
        .to_rgb8();
    let data = img.into_raw();
    let size = IMAGE_SIZE as usize;
    let data = Tensor::from_vec(data, (size, size, 3), &Device::Cpu)?.permute((2, 0, 1))?;
    let mean =
        Tensor::new(&[0.48145466f32, 0.4578275, 0.40821073], &Device::Cpu)?.reshape((3, 1, 1))?;
    let std = Tensor::new(&[0.26862954f32, 0.261_302_6, 0.275_777_1], &Device::Cpu)?
        .reshape((3, 1, 1))?;
    (data.to_dtype(DType::F32)? / 255.)?
        .broadcast_sub(&mean)?
        .broadcast_div(&std)
}
