use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use captions_config::CaptionsConfig;

#[derive(Parser)]
#[command(name = "captions", version, about = "Captions: live subtitles for speech and sign language")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server.
    Serve {
        /// Address to bind, overriding `server.bind`.
        #[arg(long, env = "CAPTIONS_BIND")]
        bind: Option<String>,
        /// Port to listen on, overriding `server.port`.
        #[arg(long, env = "CAPTIONS_PORT")]
        port: Option<u16>,
        /// Config file; discovered in `.` and `~/.config/captions/` when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Load and validate the configuration, then print a summary.
    CheckConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn log_summary(config: &CaptionsConfig) {
    let r = &config.recognition;
    info!(
        bind = %config.server.bind,
        port = config.server.port,
        cors_origins = config.server.cors_origins.len(),
        inbound_queue = config.session.inbound_queue,
        "server"
    );
    info!(
        provider = ?r.speech.provider,
        model = %r.speech.model,
        api_key = r.speech.api_key.is_some(),
        timeout_ms = r.audio_timeout_ms,
        "speech"
    );
    info!(
        classifier = r.gesture.classifier_url.as_deref().unwrap_or("none"),
        window = r.gesture.window_capacity,
        min_frames = r.gesture.min_frames,
        timeout_ms = r.video_timeout_ms,
        "gestures"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "captions starting");

    match cli.command {
        Commands::Serve { bind, port, config } => {
            let mut config = captions_config::load_or_discover(config.as_deref())?;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            captions_gateway::start_gateway(config).await
        },
        Commands::CheckConfig { config } => {
            let config = captions_config::load_or_discover(config.as_deref())?;
            log_summary(&config);
            info!("config ok");
            Ok(())
        },
    }
}
