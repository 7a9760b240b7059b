use clap::Parser;
use ticker_feed::cli::{Cli, Commands};
use ticker_feed::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using default configuration");
            Config::from_toml_str(include_str!("../config.toml.example"))?
        }
    };

    // Initialize telemetry
    let _telemetry = ticker_feed::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Watch(args) => {
            args.execute(&config).await?;
        }
        Commands::Endpoint => {
            println!("{}", config.feed.endpoint()?);
        }
        Commands::Config => {
            println!("Current configuration:");
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
