use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, ValueEnum};

use crate::captioning::BlipVariant;
use crate::pipeline::{FailurePolicy, PipelineSettings};

/// Caption an uploaded image, translate the caption to Twi and read it aloud.
#[derive(Parser, Clone, Debug)]
#[command(version, about)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,
    #[command(flatten)]
    pub caption: CaptionConfig,
    #[command(flatten)]
    pub translation: TranslationConfig,
    #[command(flatten)]
    pub speech: SpeechConfig,
    #[command(flatten)]
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Settings handed to the pipeline orchestrator.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            target_language: self.translation.target_language.clone(),
            audio_dir: self.speech.audio_dir.clone(),
            audio_suffix: self.speech.audio_suffix.clone(),
            failure_policy: self.pipeline.failure_policy,
            speak_translation_errors: self.pipeline.speak_translation_errors,
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct ServerConfig {
    /// The address and optionally port to bind to
    #[arg(long, env = "VERMA_ADDRESS", default_value = "0.0.0.0:3000")]
    pub address: String,

    /// PEM certificate chain. Serving switches to HTTPS when set together with --tls-key
    #[arg(long, env = "VERMA_TLS_CERT", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key for --tls-cert
    #[arg(long, env = "VERMA_TLS_KEY", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    /// Directory for the rolling JSON access log. Defaults to the working directory
    #[arg(long, env = "VERMA_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Largest accepted upload, in megabytes
    #[arg(long, env = "VERMA_MAX_UPLOAD_MB", default_value_t = 20)]
    pub max_upload_mb: usize,
}

impl ServerConfig {
    pub fn tls(&self) -> Option<TLSConfig> {
        match (&self.tls_cert, &self.tls_key) {
            (Some(cert_path), Some(key_path)) => Some(TLSConfig {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
            }),
            _ => None,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb << 20
    }
}

#[derive(Clone, Debug)]
pub struct TLSConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptionBackend {
    /// Quantized BLIP running locally on the CPU
    Blip,
    /// An OpenAI compatible vision chat endpoint
    Openai,
}

#[derive(Args, Clone, Debug)]
pub struct CaptionConfig {
    /// Which captioning model to use
    #[arg(long, env = "VERMA_CAPTION_BACKEND", value_enum, default_value_t = CaptionBackend::Blip)]
    pub caption_backend: CaptionBackend,

    /// GGUF weights of the BLIP captioning model
    #[arg(
        long,
        env = "VERMA_BLIP_MODEL",
        default_value = "models/blip-image-captioning-base/model-q4k.gguf"
    )]
    pub blip_model: PathBuf,

    /// tokenizer.json matching the BLIP weights
    #[arg(
        long,
        env = "VERMA_BLIP_TOKENIZER",
        default_value = "models/blip-image-captioning-base/tokenizer.json"
    )]
    pub blip_tokenizer: PathBuf,

    /// Architecture of the BLIP weights
    #[arg(long, env = "VERMA_BLIP_VARIANT", value_enum, default_value_t = BlipVariant::Base)]
    pub blip_variant: BlipVariant,

    /// Upper bound on generated caption tokens
    #[arg(long, env = "VERMA_MAX_CAPTION_TOKENS", default_value_t = 20)]
    pub max_caption_tokens: usize,

    /// API base for the openai caption backend. The key is read from OPENAI_API_KEY
    #[arg(long, env = "VERMA_OPENAI_API_BASE", default_value = "https://api.openai.com/v1")]
    pub openai_api_base: String,

    /// Vision model for the openai caption backend
    #[arg(long, env = "VERMA_OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub openai_model: String,
}

#[derive(Args, Clone, Debug)]
pub struct TranslationConfig {
    /// Base URL of the translation service; requests go to <endpoint>/translate
    #[arg(long, env = "VERMA_TRANSLATE_ENDPOINT")]
    pub translate_endpoint: String,

    /// Language code sent as "to"
    #[arg(long, env = "VERMA_TARGET_LANGUAGE", default_value = "tw")]
    pub target_language: String,

    /// Seconds before a translation request is abandoned
    #[arg(long, env = "VERMA_TRANSLATE_TIMEOUT_SECS", default_value_t = 30)]
    pub translate_timeout_secs: u64,
}

impl TranslationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.translate_timeout_secs)
    }
}

#[derive(Args, Clone, Debug)]
pub struct SpeechConfig {
    /// Base URL of the Coqui TTS server running the Twi voice
    #[arg(long, env = "VERMA_TTS_ENDPOINT")]
    pub tts_endpoint: String,

    /// Speaker id for multi-speaker voices
    #[arg(long, env = "VERMA_TTS_SPEAKER_ID", default_value = "")]
    pub tts_speaker_id: String,

    /// Language id for multi-lingual voices
    #[arg(long, env = "VERMA_TTS_LANGUAGE_ID", default_value = "")]
    pub tts_language_id: String,

    /// Seconds before a synthesis request is abandoned
    #[arg(long, env = "VERMA_TTS_TIMEOUT_SECS", default_value_t = 120)]
    pub tts_timeout_secs: u64,

    /// Where audio files are written and served from
    #[arg(long, env = "VERMA_AUDIO_DIR", default_value = ".")]
    pub audio_dir: PathBuf,

    /// Audio files are named <upload stem>_<suffix>.wav
    #[arg(long, env = "VERMA_AUDIO_SUFFIX", default_value = "twi")]
    pub audio_suffix: String,
}

impl SpeechConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.tts_timeout_secs)
    }
}

#[derive(Args, Clone, Debug)]
pub struct PipelineConfig {
    /// How stage failures are treated
    #[arg(long, env = "VERMA_FAILURE_POLICY", value_enum, default_value_t = FailurePolicy::Compat)]
    pub failure_policy: FailurePolicy,

    /// Read the translation error text aloud when translation fails, instead of skipping audio
    #[arg(
        long,
        env = "VERMA_SPEAK_TRANSLATION_ERRORS",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub speak_translation_errors: bool,
}
