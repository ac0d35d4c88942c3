#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{routing::post, Json, Router};
use image::DynamicImage;
use serde_json::{json, Value};
use verma_server::captioning::{decode_image, CaptionError, CaptionGenerator};
use verma_server::pipeline::{FailurePolicy, PipelineSettings};
use verma_server::speech::{SpeechSynthesizer, SynthesisError};

pub const DOG_CAPTION: &str = "a dog sitting in the grass";

/// A small but real JPEG.
pub fn jpeg_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::new_rgb8(32, 24)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
        .unwrap();
    bytes
}

/// Mono 16 bit WAV whose length depends on the text, so equal text gives equal files.
pub fn wav_for(text: &str) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 22050,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut out = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut out, spec).unwrap();
    for (i, b) in text.bytes().enumerate() {
        writer.write_sample((b as i16) * ((i % 7) as i16 + 1)).unwrap();
    }
    writer.finalize().unwrap();
    out.into_inner()
}

pub fn settings(audio_dir: &Path) -> PipelineSettings {
    PipelineSettings {
        target_language: "tw".to_string(),
        audio_dir: audio_dir.to_path_buf(),
        audio_suffix: "twi".to_string(),
        failure_policy: FailurePolicy::Compat,
        speak_translation_errors: true,
    }
}

/// Decodes the image like a real model would, then always sees a dog.
pub struct DogCaptioner {
    pub calls: AtomicUsize,
}

impl DogCaptioner {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CaptionGenerator for DogCaptioner {
    async fn generate_caption(&self, image_bytes: &[u8]) -> Result<String, CaptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        decode_image(image_bytes)?;
        Ok(DOG_CAPTION.to_string())
    }
}

/// Writes a WAV for whatever it is asked to say and remembers the text.
#[derive(Default)]
pub struct RecordingSynthesizer {
    pub spoken: Mutex<Vec<(String, PathBuf)>>,
}

impl RecordingSynthesizer {
    pub fn spoken_texts(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap()
            .iter()
            .map(|(text, _)| text.clone())
            .collect()
    }
}

#[async_trait]
impl SpeechSynthesizer for RecordingSynthesizer {
    async fn synthesize(&self, text: &str, output_path: &Path) -> Result<(), SynthesisError> {
        self.spoken
            .lock()
            .unwrap()
            .push((text.to_string(), output_path.to_path_buf()));
        tokio::fs::write(output_path, wav_for(text)).await?;
        Ok(())
    }
}

/// A synthesizer whose backend is always down.
pub struct BrokenSynthesizer;

#[async_trait]
impl SpeechSynthesizer for BrokenSynthesizer {
    async fn synthesize(&self, _text: &str, _output_path: &Path) -> Result<(), SynthesisError> {
        Err(SynthesisError::Silent)
    }
}

/// Serve a router on an ephemeral local port and return its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A translation service that answers every request with `translated` and counts the calls.
pub async fn translation_service(translated: &'static str) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let router = Router::new().route(
        "/translate",
        post(move |Json(body): Json<Value>| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                assert_eq!(body["to"], "tw");
                Json(json!({ "translatedText": translated }))
            }
        }),
    );
    (serve(router).await, hits)
}

/// A translation service that never answers in time.
pub async fn stalled_translation_service(delay: Duration) -> String {
    let router = Router::new().route(
        "/translate",
        post(move || async move {
            tokio::time::sleep(delay).await;
            Json(json!({ "translatedText": "too late" }))
        }),
    );
    serve(router).await
}

/// An address nothing listens on.
pub async fn unreachable_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
