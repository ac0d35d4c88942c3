use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

#[derive(thiserror::Error, Debug)]
pub enum SynthesisError {
    #[error("nothing to synthesize")]
    EmptyText,
    #[error("speech request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("speech service returned invalid audio: {0}")]
    InvalidAudio(#[from] hound::Error),
    #[error("speech service returned audio without samples")]
    Silent,
    #[error("failed to write audio file: {0}")]
    Io(#[from] std::io::Error),
}

/// Speaks text into a WAV file at `output_path`, replacing whatever was there.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, output_path: &Path) -> Result<(), SynthesisError>;
}

/// Client for a Coqui TTS server, e.g.
/// `tts-server --model_name tts_models/tw_asante/openbible/vits`.
#[derive(Clone)]
pub struct CoquiSynthesizer {
    client: Client,
    url: String,
    speaker_id: String,
    language_id: String,
}

impl CoquiSynthesizer {
    pub fn new(
        endpoint: &str,
        speaker_id: &str,
        language_id: &str,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}/api/tts", endpoint.trim_end_matches('/')),
            speaker_id: speaker_id.to_string(),
            language_id: language_id.to_string(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for CoquiSynthesizer {
    async fn synthesize(&self, text: &str, output_path: &Path) -> Result<(), SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        let audio = self
            .client
            .get(&self.url)
            .query(&[
                ("text", text),
                ("speaker_id", self.speaker_id.as_str()),
                ("style_wav", ""),
                ("language_id", self.language_id.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let spec = check_wav(&audio)?;
        tracing::debug!(
            bytes = audio.len(),
            sample_rate = spec.sample_rate,
            path = %output_path.display(),
            "Writing synthesized speech"
        );
        tokio::fs::write(output_path, &audio).await?;
        Ok(())
    }
}

/// Make sure the bytes are a WAV stream with at least one sample before they hit the disk.
pub fn check_wav(bytes: &[u8]) -> Result<hound::WavSpec, SynthesisError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    if reader.len() == 0 {
        return Err(SynthesisError::Silent);
    }
    Ok(reader.spec())
}
