pub mod commands;
pub mod config;
pub mod managers;
pub mod video;

use anyhow::Context;
use photobooth_core::StripExporter;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use commands::studio::{execute, Command, Flow, HELP};
use config::BoothConfig;
use managers::studio_manager::{StudioEvent, StudioManager};
use managers::upload_manager::UploadPipeline;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "photobooth=debug,photobooth_core=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = BoothConfig::from_env();
    let source = video::open_source(&config);
    let pipeline = UploadPipeline::new(&config.upload_url, config.upload_timeout)
        .map_err(anyhow::Error::msg)
        .context("Failed to set up uploads")?;

    let mut exporter = StripExporter::new();
    if let Some(path) = &config.caption_font {
        match StripExporter::load_font(path) {
            Ok(font) => exporter = exporter.with_font(font),
            Err(e) => warn!("Caption font unavailable, using bundled font: {e}"),
        }
    }

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let handle = StudioManager::new(source, pipeline, exporter, config.output_dir.clone(), events_tx).spawn();

    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            print_event(&event);
        }
    });

    info!("Uploading to {}", config.upload_url);
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let command = match line.parse::<Command>() {
            Ok(c) => c,
            Err(commands::studio::ParseError::Empty) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match execute(&handle, command).await {
            Ok(Flow::Continue(text)) => println!("{text}"),
            Ok(Flow::Quit) => return Ok(()),
            Err(e) => println!("error: {e}"),
        }
    }

    handle.shutdown().await.map_err(anyhow::Error::msg)
}

fn print_event(event: &StudioEvent) {
    match event {
        StudioEvent::Sequencer(photobooth_core::SequencerEvent::Countdown { token, .. }) => println!("{token}"),
        other => match serde_json::to_string(other) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!("Failed to serialize studio event: {e}"),
        },
    }
}
