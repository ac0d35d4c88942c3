use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use verma_server::{
    captioning,
    config::Config,
    pipeline::Pipeline,
    speech::CoquiSynthesizer,
    translation::HttpTranslator,
    web::{self, AppState},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    // Parse command line arguments, falling back to the environment
    let config = Config::parse();

    // initialize tracing
    let log_dir = match &config.server.log_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    let file_appender = tracing_appender::rolling::daily(log_dir, "access.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .json()
        .with_writer(non_blocking)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tokio::fs::create_dir_all(&config.speech.audio_dir)
        .await
        .with_context(|| {
            format!(
                "Creating audio directory {}",
                config.speech.audio_dir.display()
            )
        })?;

    // load the models once, every request shares them
    let captioner = captioning::from_config(&config.caption).context("Building caption model")?;
    let translator = HttpTranslator::new(
        &config.translation.translate_endpoint,
        config.translation.timeout(),
    )
    .context("Building translation client")?;
    let synthesizer = CoquiSynthesizer::new(
        &config.speech.tts_endpoint,
        &config.speech.tts_speaker_id,
        &config.speech.tts_language_id,
        config.speech.timeout(),
    )
    .context("Building speech client")?;
    tracing::info!(
        translate_url = translator.url(),
        failure_policy = %config.pipeline.failure_policy,
        "Pipeline ready"
    );

    let pipeline = Pipeline::new(
        captioner,
        Arc::new(translator),
        Arc::new(synthesizer),
        config.pipeline_settings(),
    );
    let app = web::router(
        AppState {
            pipeline: Arc::new(pipeline),
        },
        config.server.max_upload_bytes(),
    );

    // In development, use HTTP. In production, use HTTPS.
    if let Some(tls) = config.server.tls() {
        rustls::crypto::ring::default_provider()
            .install_default()
            .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;
        let tls_config =
            axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                .await
                .context("Loading TLS certificate")?;

        let addr = config.server.address.parse()?;
        tracing::info!("Listening on {}", addr);
        axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service())
            .await
            .context("Starting TLS server")?;
    } else {
        let listener = tokio::net::TcpListener::bind(&config.server.address).await?;
        tracing::info!("Listening on {}", config.server.address);
        axum::serve(listener, app).await?;
    }
    Ok(())
}
