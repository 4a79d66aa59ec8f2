use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use screencast::config::DEFAULT_CONFIG_PATH;
use screencast::encode::PngSequenceFactory;
use screencast::{create_router, AppState, Config, RecordingSession};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "screencast")]
#[command(about = "Record screen, webcam and audio as one session")]
struct Args {
    /// Configuration file (without extension)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record for a fixed duration (or until Ctrl+C)
    Record {
        /// Duration to record in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,

        /// Output directory (overrides the configuration)
        #[arg(short, long)]
        output_dir: Option<String>,

        /// Screen frame rate (overrides the configuration)
        #[arg(long)]
        fps: Option<f64>,

        /// Do not record the screen
        #[arg(long)]
        no_screen: bool,

        /// Record the webcam
        #[arg(long)]
        webcam: bool,

        /// Do not record audio
        #[arg(long)]
        no_audio: bool,
    },

    /// Run the HTTP control API
    Serve {
        /// Port to listen on (overrides the configuration)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screencast=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;

    info!("Screencast v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Record {
            duration,
            output_dir,
            fps,
            no_screen,
            webcam,
            no_audio,
        } => {
            if let Some(dir) = output_dir {
                cfg.recording.output_dir = dir;
            }
            if let Some(fps) = fps {
                cfg.screen.fps = fps;
            }
            cfg.screen.enabled &= !no_screen;
            cfg.webcam.enabled |= webcam;
            cfg.audio.enabled &= !no_audio;

            record(cfg, Duration::from_secs(duration)).await
        }
        Command::Serve { port } => {
            if let Some(port) = port {
                cfg.service.http.port = port;
            }
            serve(cfg).await
        }
    }
}

async fn record(cfg: Config, duration: Duration) -> Result<()> {
    let session = Arc::new(RecordingSession::new(&cfg, Arc::new(PngSequenceFactory))?);

    let starter = Arc::clone(&session);
    let outputs = tokio::task::spawn_blocking(move || starter.start()).await??;
    for output in &outputs {
        info!("Writing {}", output.display());
    }

    info!(
        "Recording started! Press Ctrl+C to stop early, or wait {} seconds",
        duration.as_secs()
    );

    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    info!("Stopping recording...");
    let stopper = Arc::clone(&session);
    let (outcomes, stats) = tokio::task::spawn_blocking(move || (stopper.stop(), stopper.stats())).await?;

    for outcome in outcomes.iter().filter(|o| !o.is_ok()) {
        if let Some(e) = &outcome.error {
            warn!("{}", e);
        }
    }

    // Print summary
    info!("Recording complete ({:.1}s)", stats.duration_secs);
    for recorder in &stats.recorders {
        match (&recorder.grabber, &recorder.audio) {
            (Some(grabber), _) => info!(
                "  - {}: {} ({} frames, {} failed, {} overruns)",
                recorder.name,
                recorder.output.display(),
                grabber.frames_grabbed,
                grabber.frames_failed,
                grabber.overruns
            ),
            (None, Some(audio)) => info!(
                "  - {}: {} ({:.1}s, {} samples)",
                recorder.name,
                recorder.output.display(),
                audio.duration_seconds(),
                audio.sample_count
            ),
            (None, None) => info!("  - {}: {}", recorder.name, recorder.output.display()),
        }
    }

    Ok(())
}

async fn serve(cfg: Config) -> Result<()> {
    let session = RecordingSession::new(&cfg, Arc::new(PngSequenceFactory))?;
    let app = create_router(AppState::new(session));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    Ok(())
}
