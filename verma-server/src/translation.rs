use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Text that stands in for the translation when the translation service fails.
/// It flows downstream like any other translation, including into speech.
pub const TRANSLATION_ERROR_SENTINEL: &str = "Translation error";

#[derive(thiserror::Error, Debug)]
pub enum TranslateError {
    #[error("translation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("translation service answered without translatedText: {0}")]
    MalformedResponse(#[source] serde_json::Error),
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_language: &str) -> Result<String, TranslateError>;
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    to: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// Client for a `POST <endpoint>/translate` service speaking `{text, to}` / `{translatedText}`.
///
/// One attempt per call: no retries and no caching.
#[derive(Clone)]
pub struct HttpTranslator {
    client: Client,
    url: String,
}

impl HttpTranslator {
    pub fn new(endpoint: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}/translate", endpoint.trim_end_matches('/')),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str, target_language: &str) -> Result<String, TranslateError> {
        tracing::debug!(url = %self.url, target_language, "Requesting translation");
        let body = self
            .client
            .post(&self.url)
            .json(&TranslateRequest {
                text,
                to: target_language,
            })
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let response: TranslateResponse =
            serde_json::from_slice(&body).map_err(TranslateError::MalformedResponse)?;
        Ok(response.translated_text)
    }
}

/// Translate, or log the failure and hand back the sentinel text.
///
/// The boolean is true when the sentinel was used.
pub async fn translate_or_sentinel(
    translator: &dyn Translator,
    text: &str,
    target_language: &str,
) -> (String, bool) {
    match translator.translate(text, target_language).await {
        Ok(translated) => (translated, false),
        Err(e) => {
            tracing::error!(error = %e, target_language, "Translation request failed");
            (TRANSLATION_ERROR_SENTINEL.to_string(), true)
        }
    }
}
