use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;

use stream_interact::camera::{Camera, FrameSource};
use stream_interact::interaction::{
    Controller, DetectBindings, Prompter, TerminalKeys, TerminalPrompter, WELCOME,
};
use stream_interact::model::{Backend, create_backend};
use stream_interact::present::{ConsoleSink, DisplaySink};
use stream_interact::{Config, Error, setup};

/// Stream Interact - talk to a multimodal language model about what your webcam sees
#[derive(Parser)]
#[command(name = "stream-interact", version, about)]
struct Cli {
    /// Language-model backend
    #[arg(long, value_enum)]
    llm: Option<Backend>,

    /// TTS model for spoken answers ("default" for the built-in one); speech is off when omitted
    #[arg(long)]
    tts_model_name: Option<String>,

    /// API key for the model backend; asked interactively when omitted
    #[arg(long, env = "STREAM_INTERACT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Camera index; asked interactively when omitted
    #[arg(long)]
    camera: Option<u32>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,stream_interact=info",
        1 => "info,stream_interact=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => {
            tracing::info!("quitting");
            // in-flight speech and retries are not waited for
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load_with_options(cli.llm, cli.tts_model_name.as_deref())
        .context("failed to load configuration")?;

    tracing::info!(
        backend = %config.model.backend,
        speech = config.speech.tts_model.is_some(),
        "starting stream-interact"
    );

    let display: Arc<dyn DisplaySink> = Arc::new(ConsoleSink::new());
    let prompter: Arc<dyn Prompter> = Arc::new(TerminalPrompter);

    display.line("");
    display.line(WELCOME);
    display.line("");

    let api_key = setup::resolve_api_key(
        cli.api_key.map(SecretString::from),
        &config,
        prompter.as_ref(),
        display.as_ref(),
    )
    .await?;

    let mut backend = create_backend(&config.model);
    backend.authenticate(api_key)?;

    let camera_config = config.camera.clone();
    let camera = setup::open_camera(
        cli.camera.or(config.camera.index),
        prompter.as_ref(),
        display.as_ref(),
        |index| {
            let camera_config = camera_config.clone();
            async move {
                tokio::task::spawn_blocking(move || Camera::open(index, &camera_config))
                    .await
                    .map_err(|e| Error::CameraUnavailable(e.to_string()))?
            }
        },
    )
    .await?;
    let frames: Arc<dyn FrameSource> = Arc::new(camera);

    let speech = setup::speech_sink(&config, display.as_ref());
    let session = setup::build_session(&config, backend, frames, Arc::clone(&display), speech)?;

    let controller = Controller::new(
        Arc::new(session),
        prompter,
        Arc::new(TerminalKeys),
        &DetectBindings,
    );
    controller.run().await?;

    Ok(())
}
