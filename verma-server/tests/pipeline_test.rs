mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use verma::basic_models::PipelineStage;
use verma_server::pipeline::{
    FailurePolicy, Pipeline, UploadedImage, CAPTION_FAILURE_NOTICE, SYNTHESIS_FAILURE_NOTICE,
    TRANSLATION_FAILURE_NOTICE,
};
use verma_server::speech::SpeechSynthesizer;
use verma_server::translation::{HttpTranslator, TRANSLATION_ERROR_SENTINEL};

fn dog_upload() -> UploadedImage {
    UploadedImage {
        file_name: "dog.jpg".to_string(),
        bytes: jpeg_bytes(),
    }
}

fn translator(endpoint: &str, timeout: Duration) -> Arc<HttpTranslator> {
    Arc::new(HttpTranslator::new(endpoint, timeout).unwrap())
}

#[tokio::test]
async fn valid_image_reaches_done_with_audio() {
    let audio_dir = tempfile::tempdir().unwrap();
    let (endpoint, hits) = translation_service("ɔkraman").await;
    let synthesizer = Arc::new(RecordingSynthesizer::default());
    let pipeline = Pipeline::new(
        Arc::new(DogCaptioner::new()),
        translator(&endpoint, Duration::from_secs(5)),
        synthesizer.clone(),
        settings(audio_dir.path()),
    );

    let report = pipeline.run(&dog_upload()).await;

    assert_eq!(report.stage, PipelineStage::Done);
    assert_eq!(report.english_caption.as_deref(), Some(DOG_CAPTION));
    assert_eq!(report.translated_caption.as_deref(), Some("ɔkraman"));
    assert!(!report.translation_failed);
    assert_eq!(report.audio_file.as_deref(), Some("dog_twi.wav"));
    assert_eq!(report.notice, None);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(synthesizer.spoken_texts(), vec!["ɔkraman".to_string()]);

    let audio = std::fs::read(audio_dir.path().join("dog_twi.wav")).unwrap();
    assert!(!audio.is_empty());
}

#[tokio::test]
async fn corrupt_image_halts_before_translation() {
    let audio_dir = tempfile::tempdir().unwrap();
    let (endpoint, hits) = translation_service("ɔkraman").await;
    let synthesizer = Arc::new(RecordingSynthesizer::default());
    let pipeline = Pipeline::new(
        Arc::new(DogCaptioner::new()),
        translator(&endpoint, Duration::from_secs(5)),
        synthesizer.clone(),
        settings(audio_dir.path()),
    );

    let report = pipeline
        .run(&UploadedImage {
            file_name: "dog.jpg".to_string(),
            bytes: b"\xff\xd8 this is not really a jpeg".to_vec(),
        })
        .await;

    assert_eq!(report.stage, PipelineStage::CaptionFailed);
    assert_eq!(report.notice.as_deref(), Some(CAPTION_FAILURE_NOTICE));
    assert_eq!(report.english_caption, None);
    assert_eq!(report.translated_caption, None);
    assert_eq!(report.audio_file, None);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(synthesizer.spoken_texts().is_empty());
    assert!(!audio_dir.path().join("dog_twi.wav").exists());
}

#[tokio::test]
async fn translation_timeout_speaks_the_error_text() {
    let audio_dir = tempfile::tempdir().unwrap();
    let endpoint = stalled_translation_service(Duration::from_secs(5)).await;
    let synthesizer = Arc::new(RecordingSynthesizer::default());
    let pipeline = Pipeline::new(
        Arc::new(DogCaptioner::new()),
        translator(&endpoint, Duration::from_millis(200)),
        synthesizer.clone(),
        settings(audio_dir.path()),
    );

    let report = pipeline.run(&dog_upload()).await;

    assert_eq!(report.stage, PipelineStage::Done);
    assert!(report.translation_failed);
    assert_eq!(
        report.translated_caption.as_deref(),
        Some(TRANSLATION_ERROR_SENTINEL)
    );
    assert_eq!(report.notice, None);
    assert_eq!(
        synthesizer.spoken_texts(),
        vec![TRANSLATION_ERROR_SENTINEL.to_string()]
    );
    let audio = std::fs::read(audio_dir.path().join("dog_twi.wav")).unwrap();
    assert_eq!(audio, wav_for(TRANSLATION_ERROR_SENTINEL));
}

#[tokio::test]
async fn rerunning_overwrites_the_same_file() {
    let audio_dir = tempfile::tempdir().unwrap();
    let (endpoint, hits) = translation_service("ɔkraman").await;
    let pipeline = Pipeline::new(
        Arc::new(DogCaptioner::new()),
        translator(&endpoint, Duration::from_secs(5)),
        Arc::new(RecordingSynthesizer::default()),
        settings(audio_dir.path()),
    );

    let first = pipeline.run(&dog_upload()).await;
    let first_audio = std::fs::read(audio_dir.path().join("dog_twi.wav")).unwrap();
    let second = pipeline.run(&dog_upload()).await;
    let second_audio = std::fs::read(audio_dir.path().join("dog_twi.wav")).unwrap();

    assert_eq!(first, second);
    assert_eq!(first_audio, second_audio);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(std::fs::read_dir(audio_dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn failed_synthesis_still_advertises_audio_in_compat_mode() {
    let audio_dir = tempfile::tempdir().unwrap();
    let (endpoint, _) = translation_service("ɔkraman").await;
    let pipeline = Pipeline::new(
        Arc::new(DogCaptioner::new()),
        translator(&endpoint, Duration::from_secs(5)),
        Arc::new(BrokenSynthesizer),
        settings(audio_dir.path()),
    );

    let report = pipeline.run(&dog_upload()).await;

    assert_eq!(report.stage, PipelineStage::Done);
    assert!(report.synthesis_failed);
    assert_eq!(report.audio_file.as_deref(), Some("dog_twi.wav"));
    assert!(!audio_dir.path().join("dog_twi.wav").exists());
}

#[tokio::test]
async fn strict_policy_halts_on_translation_failure() {
    let audio_dir = tempfile::tempdir().unwrap();
    let endpoint = unreachable_endpoint().await;
    let synthesizer = Arc::new(RecordingSynthesizer::default());
    let mut settings = settings(audio_dir.path());
    settings.failure_policy = FailurePolicy::HaltOnAnyFailure;
    let pipeline = Pipeline::new(
        Arc::new(DogCaptioner::new()),
        translator(&endpoint, Duration::from_secs(5)),
        synthesizer.clone(),
        settings,
    );

    let report = pipeline.run(&dog_upload()).await;

    assert_eq!(report.stage, PipelineStage::TranslationFailed);
    assert_eq!(report.notice.as_deref(), Some(TRANSLATION_FAILURE_NOTICE));
    assert_eq!(report.english_caption.as_deref(), Some(DOG_CAPTION));
    assert_eq!(report.translated_caption, None);
    assert!(synthesizer.spoken_texts().is_empty());
}

#[tokio::test]
async fn strict_policy_halts_on_synthesis_failure() {
    let audio_dir = tempfile::tempdir().unwrap();
    let (endpoint, _) = translation_service("ɔkraman").await;
    let mut settings = settings(audio_dir.path());
    settings.failure_policy = FailurePolicy::HaltOnAnyFailure;
    let synthesizer: Arc<dyn SpeechSynthesizer> = Arc::new(BrokenSynthesizer);
    let pipeline = Pipeline::new(
        Arc::new(DogCaptioner::new()),
        translator(&endpoint, Duration::from_secs(5)),
        synthesizer,
        settings,
    );

    let report = pipeline.run(&dog_upload()).await;

    assert_eq!(report.stage, PipelineStage::SynthesisFailed);
    assert_eq!(report.notice.as_deref(), Some(SYNTHESIS_FAILURE_NOTICE));
    assert_eq!(report.translated_caption.as_deref(), Some("ɔkraman"));
    assert_eq!(report.audio_file, None);
}

#[tokio::test]
async fn silent_translation_errors_skip_synthesis() {
    let audio_dir = tempfile::tempdir().unwrap();
    let endpoint = unreachable_endpoint().await;
    let synthesizer = Arc::new(RecordingSynthesizer::default());
    let mut settings = settings(audio_dir.path());
    settings.speak_translation_errors = false;
    let pipeline = Pipeline::new(
        Arc::new(DogCaptioner::new()),
        translator(&endpoint, Duration::from_secs(5)),
        synthesizer.clone(),
        settings,
    );

    let report = pipeline.run(&dog_upload()).await;

    assert_eq!(report.stage, PipelineStage::Done);
    assert_eq!(
        report.translated_caption.as_deref(),
        Some(TRANSLATION_ERROR_SENTINEL)
    );
    assert_eq!(report.audio_file, None);
    assert!(synthesizer.spoken_texts().is_empty());
}

#[tokio::test]
async fn hostile_file_names_stay_in_the_audio_dir() {
    let audio_dir = tempfile::tempdir().unwrap();
    let (endpoint, _) = translation_service("ɔkraman").await;
    let synthesizer = Arc::new(RecordingSynthesizer::default());
    let pipeline = Pipeline::new(
        Arc::new(DogCaptioner::new()),
        translator(&endpoint, Duration::from_secs(5)),
        synthesizer.clone(),
        settings(audio_dir.path()),
    );

    let report = pipeline
        .run(&UploadedImage {
            file_name: "../../outside.png".to_string(),
            bytes: jpeg_bytes(),
        })
        .await;

    assert_eq!(report.audio_file.as_deref(), Some("outside_twi.wav"));
    let written = synthesizer.spoken.lock().unwrap()[0].1.clone();
    assert_eq!(written, audio_dir.path().join("outside_twi.wav"));
}

#[tokio::test]
async fn twi_file_names_get_their_own_audio() {
    let audio_dir = tempfile::tempdir().unwrap();
    let (endpoint, _) = translation_service("ɔkraman").await;
    let pipeline = Pipeline::new(
        Arc::new(DogCaptioner::new()),
        translator(&endpoint, Duration::from_secs(5)),
        Arc::new(RecordingSynthesizer::default()),
        settings(audio_dir.path()),
    );

    let mut audio_files = Vec::new();
    for file_name in ["ɔkraman.png", "ɛkraman.png", "beach day.jpg", "beach_day.jpg"] {
        let report = pipeline
            .run(&UploadedImage {
                file_name: file_name.to_string(),
                bytes: jpeg_bytes(),
            })
            .await;
        assert_eq!(report.stage, PipelineStage::Done, "{file_name}");
        audio_files.push(report.audio_file.unwrap());
    }

    assert_eq!(
        audio_files,
        [
            "ɔkraman_twi.wav",
            "ɛkraman_twi.wav",
            "beach day_twi.wav",
            "beach_day_twi.wav"
        ]
    );
    for audio_file in &audio_files {
        assert!(audio_dir.path().join(audio_file).is_file(), "{audio_file}");
    }
}
