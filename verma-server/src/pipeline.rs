use std::path::{Path, PathBuf};
use std::sync::Arc;

use strum::Display;
use verma::basic_models::{CaptionReport, PipelineStage};

use crate::captioning::CaptionGenerator;
use crate::speech::SpeechSynthesizer;
use crate::translation::{translate_or_sentinel, Translator};

pub const CAPTION_FAILURE_NOTICE: &str = "Failed to generate English caption.";
pub const TRANSLATION_FAILURE_NOTICE: &str = "Failed to translate the caption.";
pub const SYNTHESIS_FAILURE_NOTICE: &str = "Failed to synthesize the translated caption.";

/// An image as it arrived from the browser.
#[derive(Clone)]
pub struct UploadedImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for UploadedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedImage")
            .field("file_name", &self.file_name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// How stage failures are treated.
#[derive(clap::ValueEnum, Display, Clone, Copy, Debug, PartialEq, Eq)]
#[strum(serialize_all = "kebab-case")]
pub enum FailurePolicy {
    /// Only a caption failure stops the request. Translation falls back to the
    /// error text and a failed synthesis still advertises the audio file.
    Compat,
    /// Any failing stage stops the request and is reported.
    HaltOnAnyFailure,
}

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub target_language: String,
    pub audio_dir: PathBuf,
    pub audio_suffix: String,
    pub failure_policy: FailurePolicy,
    pub speak_translation_errors: bool,
}

impl PipelineSettings {
    /// File name of the audio artifact for an upload: `<stem>_<suffix>.wav`.
    pub fn audio_file_name(&self, upload_name: &str) -> String {
        format!("{}_{}.wav", sanitized_stem(upload_name), self.audio_suffix)
    }

    pub fn audio_path(&self, upload_name: &str) -> PathBuf {
        self.audio_dir.join(self.audio_file_name(upload_name))
    }
}

/// The stem of the last path component. Letters in any script and spaces survive;
/// control characters and the few characters that are unsafe in a file name or a URL path do not.
pub fn sanitized_stem(upload_name: &str) -> String {
    // Browsers on Windows may send the full path with backslashes
    let last = upload_name.rsplit(['/', '\\']).next().unwrap_or_default();
    let stem = Path::new(last)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem: String = stem
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*' | '#' | '%') {
                '_'
            } else {
                c
            }
        })
        .collect();
    let stem = stem.trim();
    if stem.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        stem.to_string()
    }
}

/// Caption, translate, speak. Strictly in that order, one request at a time per call.
pub struct Pipeline {
    captioner: Arc<dyn CaptionGenerator>,
    translator: Arc<dyn Translator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        captioner: Arc<dyn CaptionGenerator>,
        translator: Arc<dyn Translator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            captioner,
            translator,
            synthesizer,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    fn halts_on_any_failure(&self) -> bool {
        self.settings.failure_policy == FailurePolicy::HaltOnAnyFailure
    }

    /// Run one upload through every stage. Never fails: failures end up in the report.
    #[tracing::instrument(name = "Pipeline::run", skip_all, fields(file_name = %image.file_name))]
    pub async fn run(&self, image: &UploadedImage) -> CaptionReport {
        let mut report = CaptionReport::new(&image.file_name);

        let english_caption = match self.captioner.generate_caption(&image.bytes).await {
            Ok(caption) => caption,
            Err(e) => {
                tracing::error!(error = %e, "Failed to generate English caption");
                report.stage = PipelineStage::CaptionFailed;
                report.notice = Some(CAPTION_FAILURE_NOTICE.to_string());
                return report;
            }
        };
        advance(&mut report, PipelineStage::Captioned);
        report.english_caption = Some(english_caption.clone());

        let (translated_caption, translation_failed) = translate_or_sentinel(
            self.translator.as_ref(),
            &english_caption,
            &self.settings.target_language,
        )
        .await;
        report.translation_failed = translation_failed;
        if translation_failed && self.halts_on_any_failure() {
            report.stage = PipelineStage::TranslationFailed;
            report.notice = Some(TRANSLATION_FAILURE_NOTICE.to_string());
            return report;
        }
        report.translated_caption = Some(translated_caption.clone());
        advance(&mut report, PipelineStage::Translated);

        if translation_failed && !self.settings.speak_translation_errors {
            tracing::info!("Skipping speech for a failed translation");
            advance(&mut report, PipelineStage::Done);
            return report;
        }

        let audio_path = self.settings.audio_path(&image.file_name);
        if let Err(e) = self
            .synthesizer
            .synthesize(&translated_caption, &audio_path)
            .await
        {
            tracing::error!(error = %e, path = %audio_path.display(), "Failed to save audio file");
            report.synthesis_failed = true;
            if self.halts_on_any_failure() {
                report.stage = PipelineStage::SynthesisFailed;
                report.notice = Some(SYNTHESIS_FAILURE_NOTICE.to_string());
                return report;
            }
        }
        // Advertised whether or not the file made it to disk
        report.audio_file = Some(self.settings.audio_file_name(&image.file_name));
        advance(&mut report, PipelineStage::Synthesized);

        advance(&mut report, PipelineStage::Done);
        report
    }
}

fn advance(report: &mut CaptionReport, stage: PipelineStage) {
    tracing::debug!(from = %report.stage, to = %stage, "Pipeline stage");
    report.stage = stage;
}
