//! Annadata Monitor CLI
//!
//! Soil sensor change monitor with crop and disease classification.

use annadata_monitor::{
    advice::{AdviceGenerator, GeminiAdvisor},
    config::Config,
    core::{Monitor, MonitorExit, Reading},
    model::Models,
    pipeline::AdvisoryPipeline,
    source::{self, SourceKind},
    stats::{create_shared_stats_with_persistence, MonitorStats},
    store, VERSION,
};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "annadata")]
#[command(version = VERSION)]
#[command(about = "Soil sensor change monitor with crop advice", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start monitoring readings and serving classification requests
    Start {
        /// Reading source: http, stdin, file:<path> or tcp:<host:port>
        #[arg(long)]
        source: Option<String>,

        /// HTTP port (overrides the config file)
        #[arg(long)]
        port: Option<u16>,

        /// Number of readings in the change-detection window
        #[arg(long)]
        window_size: Option<usize>,

        /// Do not start the HTTP server
        #[arg(long)]
        no_server: bool,
    },

    /// Recommend a crop for one reading
    Classify {
        /// Nitrogen Phosphorus Potassium Temperature Humidity pH Rainfall
        #[arg(num_args = 7, required = true, allow_negative_numbers = true)]
        values: Vec<f64>,
    },

    /// Show configuration and cumulative statistics
    Status,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Start {
            source,
            port,
            window_size,
            no_server,
        } => cmd_start(source, port, window_size, no_server).await,
        Commands::Classify { values } => cmd_classify(&values),
        Commands::Status => cmd_status(),
        Commands::Config => cmd_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn cmd_start(
    source_arg: Option<String>,
    port: Option<u16>,
    window_size: Option<usize>,
    no_server: bool,
) -> anyhow::Result<()> {
    println!("Annadata Monitor v{VERSION}");
    println!();

    let mut config = Config::load()?;
    if let Some(arg) = source_arg {
        config.source = SourceKind::from_arg(&arg)
            .ok_or_else(|| anyhow::anyhow!("unknown source '{arg}'"))?;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(size) = window_size {
        config.window_size = size;
    }
    if no_server {
        config.server.enabled = false;
    }
    config.validate()?;

    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let serve_http = config.server.enabled && cfg!(feature = "server");
    if config.source == SourceKind::Http && !serve_http {
        anyhow::bail!("the http source needs the HTTP server; pick another --source");
    }

    let models = Arc::new(Models::load(&config.models));
    if !models.has_crop_model() {
        eprintln!("Warning: crop model not loaded, every detected change will fail to dispatch");
    }

    let store = store::open(&config.store).await?;
    let advisor = GeminiAdvisor::from_config(&config.advice)
        .map(|a| Arc::new(a) as Arc<dyn AdviceGenerator>);

    println!("Starting monitor...");
    println!("  Source: {}", config.source);
    println!("  Window size: {}", config.window_size);
    println!("  Store: {}", store.backend_name());
    println!(
        "  Advice: {}",
        if advisor.is_some() {
            config.advice.model.as_str()
        } else {
            "disabled (GEMINI_API_KEY not set)"
        }
    );

    let pipeline = AdvisoryPipeline::new(models.clone(), advisor, store.clone());
    let stats = create_shared_stats_with_persistence(config.stats_path());
    let opened = source::open(&config.source, config.channel_capacity).await;

    #[cfg(feature = "server")]
    let server = if serve_http {
        use annadata_monitor::server::{run, AppState, ServerConfig};

        let mut state = AppState::new(models.clone(), store.clone());
        if let Some(sender) = opened.sender.clone() {
            state = state.with_readings(sender);
        }
        let (addr, shutdown) = run(ServerConfig::from(&config.server), state).await?;
        println!("  Server: http://{addr}");
        Some(shutdown)
    } else {
        println!("  Server: disabled");
        None
    };
    #[cfg(not(feature = "server"))]
    let server: Option<tokio::sync::oneshot::Sender<()>> = None;

    println!();
    println!("Press Ctrl+C to stop.");

    let cancel = CancellationToken::new();
    ctrlc_handler(cancel.clone());

    let mut monitor = Monitor::new(pipeline)
        .with_window_size(config.window_size)
        .with_retry((&config.dispatch).into())
        .with_stats(stats.clone());

    let token = cancel.clone();
    let stream = opened.stream;
    let exit = tokio::spawn(async move { monitor.run(stream, token).await }).await?;

    if exit != MonitorExit::Cancelled {
        tracing::warn!("Monitor stopped: {}", exit);
        if server.is_some() {
            println!("Monitor stopped ({exit}); still serving requests. Press Ctrl+C to exit.");
            cancel.cancelled().await;
        }
    }

    if let Some(shutdown) = server {
        let _ = shutdown.send(());
    }

    println!();
    println!("Stopping monitor...");
    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save statistics: {e}");
    }
    println!("{}", stats.summary());

    Ok(())
}

fn cmd_classify(values: &[f64]) -> anyhow::Result<()> {
    let reading = Reading::try_from(values.to_vec())?;
    let config = Config::load()?;
    let models = Models::load(&config.models);

    let prediction = models.classify_crop(&reading)?;
    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}

fn cmd_status() -> anyhow::Result<()> {
    let config = Config::load()?;

    println!("Annadata Monitor Status");
    println!("=======================");
    println!();

    println!("Configuration:");
    println!("  Source: {}", config.source);
    println!("  Window size: {}", config.window_size);
    println!(
        "  Server: {}",
        if config.server.enabled {
            format!("{}:{}", config.server.host, config.server.port)
        } else {
            "disabled".to_string()
        }
    );
    println!(
        "  Crop model: {}",
        if config.models.crop_weights.exists() {
            "present"
        } else {
            "missing"
        }
    );
    println!(
        "  Disease model: {}",
        if config.models.disease_weights.exists() {
            "present"
        } else {
            "missing"
        }
    );
    println!(
        "  Advice: {}",
        if config.advice.api_key.is_some() {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!();

    let stats_path = config.stats_path();
    if stats_path.exists() {
        println!("Cumulative {}", MonitorStats::with_persistence(stats_path).summary());
    } else {
        println!("No previous session data found.");
    }
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let config = Config::load()?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(cancel: CancellationToken) {
    if let Err(e) = ctrlc::set_handler(move || cancel.cancel()) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}
