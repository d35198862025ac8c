use std::path::{Path, PathBuf};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use portico::{
    app,
    config::{
        CONFIG_FILENAME, GatewayConfig, GatewayConfigValidator, load_config,
        loader::load_config_from, save_config,
    },
    tracing_setup,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Path to gateway.ini. Without it $PORTICO_CONFIG_PATH, ./, ./conf and
    /// /etc/portico are searched.
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[clap(long, global = true)]
    json_logs: bool,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate,
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = CONFIG_FILENAME)]
        output: PathBuf,
    },
    /// Start the gateway (default)
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Validate => validate_config_command(args.config.as_deref()),
        Commands::Init { output } => init_config_command(&output).await,
        Commands::Serve => {
            tracing_setup::init_tracing(tracing_setup::DEFAULT_FILTER, args.json_logs)
                .map_err(|e| eyre!("Failed to initialize tracing: {e}"))?;

            let provider = rustls::crypto::aws_lc_rs::default_provider();
            if let Err(e) = rustls::crypto::CryptoProvider::install_default(provider) {
                tracing::warn!(
                    "CryptoProvider::install_default for aws-lc-rs reported an error: {:?}. \
                    A provider was probably installed already.",
                    e
                );
            }

            let loaded =
                load_config(args.config.as_deref()).context("Failed to load configuration")?;
            tracing::info!(
                file = %loaded.path.display(),
                from_file = loaded.from_file,
                "Starting portico"
            );
            app::run(loaded).await
        }
    }
}

/// Validate a configuration file and print a summary
fn validate_config_command(explicit: Option<&Path>) -> Result<()> {
    let config = match explicit {
        Some(path) => {
            println!("🔍 Validating configuration file: {}", path.display());
            if !path.is_file() {
                eprintln!("❌ Error: Configuration file '{}' not found", path.display());
                std::process::exit(1);
            }
            load_config_from(path)
        }
        None => load_config(None).map(|loaded| {
            println!("🔍 Validating configuration file: {}", loaded.path.display());
            loaded.config
        }),
    };

    let config = match config {
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

    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            let port = match config.gateway.port.as_str() {
                "" => "(pick automatically)",
                port => port,
            };
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Gateway Port: {port}");
            println!("   • Bind Host: {}", config.gateway.bind_host);
            println!("   • Runtime Path: {}", config.common.runtime_path);
            println!("   • WWW Path: {}", config.gateway.www_path);
            println!("   • Remote Auth Token: {}", config.auth_token().is_some());
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Leave Port empty to pick one of 80-89 or 8080-8089 at startup");
            println!("   • BindHost must be an IP address such as 0.0.0.0 or 127.0.0.1");
            std::process::exit(1);
        }
    }
}

/// Write a configuration file holding the defaults
async fn init_config_command(path: &Path) -> Result<()> {
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{}' already exists", path.display());
        std::process::exit(1);
    }

    save_config(path, &GatewayConfig::default())
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {}", path.display());
    println!("   Run 'portico serve --config {}' to start the gateway", path.display());
    Ok(())
}
