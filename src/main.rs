use anima::capture::CameraBackend;
use anima::events::{AnimaEvent, EventFilter, NotificationLevel};
use anima::models::{ImageEncoding, Track};
use anima::{AnimaConfig, AnimaSession, TokenStore};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "anima")]
#[command(about = "Detect your emotion from a photo and play music that matches it")]
#[command(version)]
#[command(long_about = "Captures a photo from a camera or a file, asks the backend to \
classify the emotion in it, and plays one of the recommended tracks on a Spotify Connect \
device. Also browses analysis history and dashboard statistics.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "anima.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Backend bearer token
    #[arg(long, env = "ANIMA_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Spotify access token
    #[arg(long, env = "ANIMA_PROVIDER_TOKEN", hide_env_values = true)]
    provider_token: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a photo and list the recommended tracks
    Analyze {
        /// Image file to upload
        #[arg(long, conflicts_with = "camera", required_unless_present = "camera")]
        image: Option<PathBuf>,

        /// Take the photo with the camera instead
        #[arg(long)]
        camera: bool,

        /// Play the first recommended track
        #[arg(long)]
        play: bool,
    },
    /// Show recently played tracks
    Recent,
    /// Show dashboard statistics for a period
    Dashboard {
        #[arg(long, default_value = "semana")]
        period: String,
    },
    /// Browse analysis history
    History {
        /// Emotion label, or `todos`
        #[arg(long, default_value = "todos")]
        filter: String,

        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Play a track on the Connect device
    Play {
        /// Track URI, e.g. spotify:track:...
        uri: String,
    },
    /// End the backend session
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting Anima v{}", env!("CARGO_PKG_VERSION"));

    let config = match AnimaConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let Some(command) = args.command else {
        bail!("no command given; run with --help to see the available commands");
    };

    let tokens = TokenStore::new();
    if let Some(token) = &args.token {
        tokens.set_backend(token.clone());
    }
    if let Some(token) = &args.provider_token {
        tokens.set_provider(token.clone());
    }

    let camera = camera_backend(&config)?;
    let session = AnimaSession::connect(config, tokens, camera)?;
    print_notifications(&session);

    let result = run(&session, command).await;
    if let Err(e) = &result {
        error!("Command failed: {}", e);
    }

    session.shutdown().await;
    result
}

async fn run(session: &AnimaSession, command: Command) -> Result<()> {
    match command {
        Command::Analyze {
            image,
            camera,
            play,
        } => {
            if camera {
                session.start_camera().await?;
                session.capture_photo().await?;
            } else if let Some(path) = image {
                let (data, mime) = read_image(&path).await?;
                session.import_file(data, mime).await?;
            }

            let outcome = session.analyze().await?;
            println!(
                "{} {} ({:.1}%)",
                outcome.emotion.icon, outcome.emotion.name, outcome.emotion.confidence
            );
            if !outcome.has_playlist() {
                println!("Conecta tu cuenta de Spotify para recibir recomendaciones");
                return Ok(());
            }
            for (index, track) in outcome.tracks.iter().enumerate() {
                println!("{:>2}. {}  [{}]", index + 1, track, track.uri);
            }

            if play {
                session.connect_player().await?;
                session.play(&outcome.tracks[0]).await?;
            }
        }
        Command::Recent => {
            let recent = session.recent_tracks().await?;
            if recent.is_empty() {
                println!("Aún no hay canciones reproducidas");
            }
            for record in recent {
                let played_at = record
                    .played_at
                    .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("{}  {}  [{}]", played_at, record.track, record.track.uri);
            }
        }
        Command::Dashboard { period } => {
            let summary = session.dashboard(&period).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::History { filter, page } => {
            let view = session.history_view().await?;
            let page = view.page(&filter, page);
            for entry in &page.entries {
                println!(
                    "{}  {} {} ({:.1}%)",
                    entry.record.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.icon,
                    entry.record.emotion,
                    entry.record.confidence
                );
            }
            println!(
                "Página {} de {} ({} análisis)",
                page.page,
                page.total_pages.max(1),
                page.total_matches
            );
        }
        Command::Play { uri } => {
            let device = session.connect_player().await?;
            info!("Playing on device {}", device);
            session.play(&Track::new(uri.clone(), uri)).await?;
        }
        Command::Logout => {
            session.logout().await;
        }
    }
    Ok(())
}

async fn read_image(path: &Path) -> Result<(Vec<u8>, &'static str)> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    let mime = ImageEncoding::mime_for_extension(extension)
        .with_context(|| format!("unsupported image type: {}", path.display()))?;
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok((data, mime))
}

#[cfg(all(feature = "camera", target_os = "linux"))]
fn camera_backend(config: &AnimaConfig) -> Result<Arc<dyn CameraBackend>> {
    Ok(Arc::new(anima::capture::GstCamera::new(config.capture.clone())?))
}

#[cfg(not(all(feature = "camera", target_os = "linux")))]
fn camera_backend(config: &AnimaConfig) -> Result<Arc<dyn CameraBackend>> {
    warn!("Built without the `camera` feature, using the mock camera");
    Ok(Arc::new(anima::MockCamera::new(config.capture.resolution)))
}

/// Echo user-facing notifications on stderr
fn print_notifications(session: &AnimaSession) {
    let mut notifications = session
        .event_bus()
        .subscribe_filtered(EventFilter::EventTypes(vec!["notification"]), "cli");
    tokio::spawn(async move {
        while let Ok(event) = notifications.recv().await {
            if let AnimaEvent::Notification { level, message } = event {
                match level {
                    NotificationLevel::Info => eprintln!("{}", message),
                    NotificationLevel::Error => eprintln!("✗ {}", message),
                }
            }
        }
    });
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("anima={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_writer(std::io::stderr)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .with_writer(std::io::stderr)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .with_writer(std::io::stderr)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Anima Configuration File");
    println!("# Every value below is the built-in default; ANIMA_<SECTION>__<KEY> overrides it");
    println!();
    println!("{}", toml::to_string_pretty(&AnimaConfig::default())?);
    Ok(())
}
