use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

/// Where a caption request ended up.
///
/// The happy path is `Start -> Captioned -> Translated -> Synthesized -> Done`.
/// `TranslationFailed` and `SynthesisFailed` are only terminal when the server
/// runs with a policy that halts on every failure.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    Start,
    Captioned,
    CaptionFailed,
    Translated,
    TranslationFailed,
    Synthesized,
    SynthesisFailed,
    Done,
}

impl PipelineStage {
    /// True for the stages where the pipeline stopped before finishing.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            PipelineStage::CaptionFailed
                | PipelineStage::TranslationFailed
                | PipelineStage::SynthesisFailed
        )
    }
}

/// Everything the presentation layer gets to see about one uploaded image.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CaptionReport {
    pub file_name: String,
    pub stage: PipelineStage,
    pub english_caption: Option<String>,
    pub translated_caption: Option<String>,
    /// The translated caption is the failure sentinel, not a real translation.
    pub translation_failed: bool,
    /// File name of the audio artifact, served under `/audio/`.
    pub audio_file: Option<String>,
    pub synthesis_failed: bool,
    /// User-visible failure notice, if any.
    pub notice: Option<String>,
}

impl CaptionReport {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            stage: PipelineStage::Start,
            english_caption: None,
            translated_caption: None,
            translation_failed: false,
            audio_file: None,
            synthesis_failed: false,
            notice: None,
        }
    }

    /// Relative URL of the audio player source.
    pub fn audio_url(&self) -> Option<String> {
        self.audio_file.as_ref().map(|f| format!("/audio/{}", f))
    }
}
