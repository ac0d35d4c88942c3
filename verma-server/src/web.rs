use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use minijinja::context;
use verma::basic_models::CaptionReport;

use crate::captioning::to_data_url;
use crate::errors::{WebError, WebResult};
use crate::pipeline::{Pipeline, UploadedImage};

/// Extensions offered by the upload form.
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

lazy_static::lazy_static! {
    static ref TEMPLATES: minijinja::Environment<'static> = {
        let mut env = minijinja::Environment::new();
        for (name, template) in &[
            ("base.html.jinja", include_str!("../templates/base.html.jinja")),
            ("index.html.jinja", include_str!("../templates/index.html.jinja")),
            ("result.html.jinja", include_str!("../templates/result.html.jinja")),
        ] {
            env.add_template(name, template)
                .expect("Failed to register template");
        }
        env
    };
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// All routes of the demo page and its JSON twin.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        // `GET /` goes to `root`
        .route("/", get(root))
        // `GET /health` goes to `health`
        .route("/health", get(health))
        // `POST /caption` goes to `caption_page`
        .route("/caption", post(caption_page))
        // `POST /api/caption` goes to `caption_api`
        .route("/api/caption", post(caption_api))
        // `GET /audio/:file_name` goes to `get_audio`
        .route("/audio/:file_name", get(get_audio))
        // serve static files from the `./static` directory
        .route("/static/*path", get(serve_static))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(
            tower_http::compression::CompressionLayer::new()
                .quality(tower_http::CompressionLevel::Fastest),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

// Render the upload form
async fn root() -> WebResult<Html<String>> {
    Ok(Html(TEMPLATES.get_template("index.html.jinja")?.render(
        context! {
            accepted => ACCEPTED_EXTENSIONS,
        },
    )?))
}

// Just reply that everything is okay
async fn health() -> StatusCode {
    StatusCode::OK
}

/// Pull the `image` field out of the form and check its extension.
async fn read_upload(mut multipart: Multipart) -> WebResult<UploadedImage> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }
        let file_name = field
            .file_name()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| WebError::BadRequest("The image field has no file name".into()))?
            .to_string();
        let extension = FsPath::new(&file_name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
            tracing::warn!(%file_name, "Rejected upload with unsupported extension");
            return Err(WebError::UnsupportedMedia(format!(
                "{} is not one of {}",
                file_name,
                ACCEPTED_EXTENSIONS.join(", ")
            )));
        }
        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Err(WebError::BadRequest("The uploaded file is empty".into()));
        }
        tracing::debug!(%file_name, bytes = bytes.len(), "Image received");
        return Ok(UploadedImage {
            file_name,
            bytes: bytes.to_vec(),
        });
    }
    Err(WebError::BadRequest("No image uploaded".into()))
}

/// Caption an upload and render the result page.
async fn caption_page(
    State(state): State<AppState>,
    multipart: Multipart,
) -> WebResult<Html<String>> {
    let image = read_upload(multipart).await?;
    let report = state.pipeline.run(&image).await;
    Ok(Html(render_report(&report, &image)?))
}

fn render_report(report: &CaptionReport, image: &UploadedImage) -> WebResult<String> {
    Ok(TEMPLATES.get_template("result.html.jinja")?.render(context! {
        report => report,
        image_url => to_data_url(&image.bytes),
        audio_url => report.audio_url(),
    })?)
}

/// Caption an upload and answer with the report as JSON.
async fn caption_api(
    State(state): State<AppState>,
    multipart: Multipart,
) -> WebResult<Json<CaptionReport>> {
    let image = read_upload(multipart).await?;
    Ok(Json(state.pipeline.run(&image).await))
}

/// Serve a synthesized audio file. Only bare `*.wav` names from the audio directory.
async fn get_audio(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> WebResult<impl IntoResponse> {
    let candidate = FsPath::new(&file_name);
    let is_plain_wav = candidate.file_name() == Some(candidate.as_os_str())
        && candidate.extension().is_some_and(|e| e == "wav");
    if !is_plain_wav {
        return Err(WebError::NotFound);
    }
    let path = state.pipeline.settings().audio_dir.join(candidate);
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        tracing::debug!(error = %e, path = %path.display(), "Audio file unavailable");
        WebError::NotFound
    })?;
    Ok(([(header::CONTENT_TYPE, "audio/wav")], bytes))
}

/// Serve static files from in memory using `include_dir!`
async fn serve_static(Path(path): Path<String>) -> WebResult<impl IntoResponse> {
    let dir = include_dir::include_dir!("$CARGO_MANIFEST_DIR/static");
    let bytes = dir.get_file(&path).ok_or(WebError::NotFound)?.contents();
    let header = (
        "Content-Type",
        match path.split('.').last() {
            Some("css") => "text/css",
            Some("js") => "text/javascript",
            Some("png") => "image/png",
            Some("svg") => "image/svg+xml",
            _ => "application/octet-stream",
        },
    );
    Ok(([header], bytes).into_response())
}
