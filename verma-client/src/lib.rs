use std::path::{Path, PathBuf};

use anyhow::{anyhow, ensure, Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use verma::basic_models::CaptionReport;

/// Talks to a running verma-server.
pub struct CaptionClient {
    client: Client,
    server: String,
}

impl CaptionClient {
    pub fn new(server: &str) -> Self {
        Self {
            client: Client::new(),
            server: server.trim_end_matches('/').to_string(),
        }
    }

    /// Upload an image file and wait for the pipeline's report.
    pub async fn caption_file(&self, image_path: &Path) -> Result<CaptionReport> {
        let bytes = tokio::fs::read(image_path)
            .await
            .with_context(|| format!("Reading {}", image_path.display()))?;
        let file_name = image_path
            .file_name()
            .ok_or_else(|| anyhow!("{} has no file name", image_path.display()))?
            .to_string_lossy()
            .into_owned();
        self.caption_bytes(file_name, bytes).await
    }

    pub async fn caption_bytes(&self, file_name: String, bytes: Vec<u8>) -> Result<CaptionReport> {
        tracing::info!(%file_name, bytes = bytes.len(), "Uploading image");
        let form = Form::new().part("image", Part::bytes(bytes).file_name(file_name));
        let resp = self
            .client
            .post(format!("{}/api/caption", self.server))
            .multipart(form)
            .send()
            .await?;
        ensure!(
            resp.status().is_success(),
            "Failed to caption image. Response: {:#?}",
            resp.text().await?,
        );
        Ok(resp.json().await?)
    }

    /// Fetch the report's audio into `dir`, keeping the last component of the server's file name.
    /// Returns None when the report has no audio.
    pub async fn download_audio(&self, report: &CaptionReport, dir: &Path) -> Result<Option<PathBuf>> {
        let Some(audio_file) = report.audio_file.as_ref() else {
            return Ok(None);
        };
        let file_name = Path::new(audio_file)
            .file_name()
            .ok_or_else(|| anyhow!("Server sent an unusable audio file name {:?}", audio_file))?
            .to_string_lossy()
            .into_owned();
        let resp = self
            .client
            .get(format!("{}/audio/{}", self.server, file_name))
            .send()
            .await?;
        ensure!(
            resp.status().is_success(),
            "Audio {} is not available ({})",
            file_name,
            resp.status()
        );
        let path = dir.join(&file_name);
        tokio::fs::write(&path, resp.bytes().await?).await?;
        Ok(Some(path))
    }
}
