use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use verma_client::CaptionClient;

/// Caption an image with a running VerMa server
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// The image to caption (jpg, jpeg or png)
    image: PathBuf,
    /// URL of the server to upload to
    #[arg(long, env = "VERMA_SERVER", default_value = "http://localhost:3000")]
    server: String,
    /// Download the Twi audio into this directory
    #[arg(long)]
    save_audio: Option<PathBuf>,
    /// Print the raw JSON report instead of a summary
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let client = CaptionClient::new(&args.server);
    let report = client.caption_file(&args.image).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Image: {}", report.file_name);
        println!("Stage: {}", report.stage);
        if let Some(notice) = &report.notice {
            println!("{}", notice);
        }
        if let Some(caption) = &report.english_caption {
            println!("English Caption: {}", caption);
        }
        if let Some(caption) = &report.translated_caption {
            println!("Twi Caption: {}", caption);
        }
    }

    if let Some(dir) = args.save_audio {
        match client.download_audio(&report, &dir).await? {
            Some(path) => println!("Audio saved at {}", path.display()),
            None => println!("No audio for this image"),
        }
    }

    Ok(())
}
