use std::path::Path;

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use strata::{
    bootstrap::Application,
    config::{AppConfigValidator, loader::DEFAULT_CONFIG_YAML, load_config},
    core::middleware::{MiddlewareInfo, Surface},
    tracing_setup,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "strata.yaml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Start the service listeners (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "strata.yaml")]
        config: String,
    },
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "strata.yaml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "strata.yaml")]
        config: String,
    },
    /// Print the active middleware pipeline
    Middleware {
        /// Configuration file to use
        #[clap(short, long, default_value = "strata.yaml")]
        config: String,
        /// Only show this surface (public, protected, hidden)
        #[clap(short, long)]
        surface: Option<Surface>,
        /// Emit JSON instead of a table
        #[clap(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Middleware {
            config,
            surface,
            json,
        }) => middleware_command(&config, surface, json).await,
        Some(Commands::Serve { config }) => serve_command(&config).await,
        None => serve_command(&args.config).await,
    }
}

async fn serve_command(config_path: &str) -> Result<()> {
    let config = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;

    tracing_setup::init_from_config(&config.logging, config.dev_mode)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    AppConfigValidator::validate(&config).map_err(|e| eyre!("Invalid configuration: {e}"))?;

    tracing::info!(
        config = config_path,
        dev_mode = config.dev_mode,
        public = %config.server.public_addr,
        protected = %config.server.protected_addr,
        hidden = %config.server.hidden_addr,
        "Starting strata"
    );

    let app = Application::new(config)?;
    app.initialize()?;
    app.serve().await
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match AppConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Dev mode: {}", config.dev_mode);
            println!("   • Public: {}", config.server.public_addr);
            println!("   • Protected: {}", config.server.protected_addr);
            println!("   • Hidden: {}", config.server.hidden_addr);
            println!(
                "   • Identity client: {}",
                if config.identity_client().is_some() {
                    "configured"
                } else {
                    "none (auth disabled)"
                }
            );
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Use humantime durations such as '30s', '500ms' or '1m'");
            println!("   • Give every surface its own listen address (e.g., '127.0.0.1:8080')");
            println!("   • Keep pagination.default_per_page within max_per_page");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    tokio::fs::write(path, DEFAULT_CONFIG_YAML)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'strata serve --config {config_path}' to start the service");
    Ok(())
}

/// Resolve the pipeline for a configuration without binding any listener.
async fn middleware_command(config_path: &str, surface: Option<Surface>, json: bool) -> Result<()> {
    let config = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    let app = Application::new(config)?;
    app.initialize()?;

    let surfaces: Vec<Surface> = match surface {
        Some(surface) => vec![surface],
        None => Surface::ALL.to_vec(),
    };

    if json {
        let mut report = serde_json::Map::new();
        for surface in &surfaces {
            let infos = app.orchestrator().describe(Some(*surface));
            report.insert(surface.to_string(), serde_json::to_value(infos)?);
        }
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for surface in surfaces {
        println!("{surface}:");
        let infos = app.orchestrator().describe(Some(surface));
        if infos.is_empty() {
            println!("   (no middleware)");
        }
        for MiddlewareInfo {
            name,
            priority,
            config_key,
            surfaces,
        } in infos
        {
            println!("   {priority:>4}  {name:<18} {config_key:<30} {surfaces}");
        }
    }
    Ok(())
}
