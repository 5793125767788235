//! Fennel CLI Tool
//!
//! Command line interface for managing the Fennel gateway

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fennel_api::database::Database;
use fennel_api::repositories::PgChannelStore;
use fennel_core::client::{AdapterFactory, ClientFactory};
use fennel_core::config::loader::load_config_from_path;
use fennel_core::config::model::Config;
use fennel_core::store::{ChannelStore, MemoryChannelStore};
use fennel_loadbalance::LoadBalanceService;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const CONFIG_EXAMPLE: &str = include_str!("../../config_example.toml");

#[derive(Parser)]
#[command(name = "fennel-cli")]
#[command(about = "A CLI tool for managing the Fennel gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration file
    ValidateConfig {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Generate example configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config_example.toml")]
        output: String,
    },
    /// Run one recovery sweep over suspended channel models
    Recover {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Run one health-check cycle
    Probe {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
        /// Probe only this model instead of the configured watch list
        #[arg(short, long)]
        model: Option<String>,
    },
    /// List channels and the health of their models
    Channels {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ValidateConfig { config } => {
            println!("Validating configuration file: {}", config);
            match load_config_from_path(&config) {
                Ok(cfg) => {
                    println!("✅ Configuration is valid");
                    println!("  - {} channels configured", cfg.channels.len());
                    println!("  - {} model mappings configured", cfg.model_mapping.len());
                    println!("  - models: {}", cfg.known_model_keys().join(", "));
                }
                Err(e) => {
                    eprintln!("❌ Configuration validation failed: {:#}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::GenerateConfig { output } => {
            println!("Generating configuration file: {}", output);
            generate_config_file(&output)?;
            println!("✅ Configuration file generated successfully");
        }
        Commands::Recover { config } => {
            let cfg = load_config_from_path(&config)?;
            let service = open_service(&cfg).await?;
            let recovered = service.balancer().recover_channel_models().await?;
            println!("✅ Recovered {} suspended channel model(s)", recovered);
        }
        Commands::Probe { config, model } => {
            let cfg = load_config_from_path(&config)?;
            let service = open_service(&cfg).await?;
            let scheduler = service.scheduler();
            if let Some(model) = model {
                scheduler.set_watch_models(vec![model]);
            }
            if scheduler.watch_models().is_empty() {
                println!("No models to probe. Set settings.health_check.watch_models or pass --model");
                return Ok(());
            }

            println!("Probing: {}", scheduler.watch_models().join(", "));
            let report = scheduler.run_cycle(&CancellationToken::new()).await;
            println!("  - recovered: {}", report.recovered);
            println!("  - probed:    {}", report.probed);
            println!("  - succeeded: {}", report.succeeded);
            println!("  - failed:    {}", report.failed);
            if report.failed > 0 {
                eprintln!("❌ {} probe(s) failed", report.failed);
                std::process::exit(1);
            }
            println!("✅ Health check completed");
        }
        Commands::Channels { config } => {
            let cfg = load_config_from_path(&config)?;
            let service = open_service(&cfg).await?;
            show_channels(&service).await?;
        }
    }

    Ok(())
}

/// 生成配置文件
fn generate_config_file(output_path: &str) -> Result<()> {
    std::fs::write(output_path, CONFIG_EXAMPLE)
        .with_context(|| format!("Failed to write {}", output_path))?;
    Ok(())
}

/// 打开配置的存储后端；没有数据库时只能看到配置里的渠道
async fn open_store(config: &Config) -> Result<Arc<dyn ChannelStore>> {
    match &config.settings.database.url {
        Some(url) => {
            let db = Database::new(url, &config.settings.database).await?;
            db.run_migrations().await?;
            Ok(Arc::new(PgChannelStore::new(db)))
        }
        None => {
            println!("No database configured, using an in-memory store seeded from the config");
            Ok(Arc::new(MemoryChannelStore::new()))
        }
    }
}

async fn open_service(config: &Config) -> Result<LoadBalanceService> {
    let store = open_store(config).await?;
    let adapters: Arc<dyn AdapterFactory> =
        Arc::new(ClientFactory::new(config.settings.relay.connect_timeout()));
    LoadBalanceService::new(config, store, adapters).await
}

async fn show_channels(service: &LoadBalanceService) -> Result<()> {
    let balancer = service.balancer();
    let channels = balancer.channels();
    if channels.is_empty() {
        println!("No channels registered");
        return Ok(());
    }

    for channel in channels {
        let marker = if channel.is_enabled() { "✅" } else { "⛔" };
        println!(
            "{} #{} {} ({}, {})",
            marker, channel.id, channel.name, channel.channel_type, channel.base_url
        );
        for model in balancer.store().list_channel_models(channel.id).await? {
            let state = if !model.hard_limit.is_usable() {
                "disabled"
            } else if !model.soft_limit.is_usable() {
                "suspended"
            } else {
                "usable"
            };
            println!(
                "    - {:<32} weight={:<3} errors={:<2} total={:<8} {}",
                model.model_key, model.weight, model.error_count, model.total_count, state
            );
        }
    }
    Ok(())
}
