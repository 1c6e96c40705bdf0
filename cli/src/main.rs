use agentry_core::providers::catalog;
use agentry_core::{
    AgentConfig, AgentLoop, AgentRegistry, DefaultProviderFactory, ModelProvider, Settings,
    ToolRegistry, TracingMetricsSink, config,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "agentry")]
#[command(about = "agentry - build and run tool-using LLM agents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default settings file to ~/.agentry/config.toml
    Init {
        #[arg(long)]
        force: bool,
    },
    /// List the built-in tools
    Tools,
    /// List supported models, optionally for one provider
    Models {
        #[arg(short, long)]
        provider: Option<String>,
    },
    /// Build an agent from a config file and run it once
    Run {
        #[arg(short, long)]
        agent: PathBuf,
        #[arg(short, long)]
        message: String,
        #[arg(short, long)]
        session: Option<String>,
        /// Extra context entries as key=value; values that parse as JSON are kept typed
        #[arg(short, long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let settings = Settings::load_or_init()?;
    init_tracing(&settings);

    match cli.command {
        Commands::Init { force } => {
            if config::config_exists() && !force {
                eprintln!(
                    "Config already exists at {} (use --force to overwrite)",
                    config::get_config_path().display()
                );
                return Ok(ExitCode::FAILURE);
            }
            config::save_config(&Settings::default())?;
            println!("Wrote {}", config::get_config_path().display());
        }
        Commands::Tools => {
            let registry = ToolRegistry::with_builtins(&settings.workspace_dir);
            println!("{}", serde_json::to_string_pretty(&registry.list_available())?);
        }
        Commands::Models { provider } => {
            let providers = match provider {
                Some(name) => vec![name.parse::<ModelProvider>()?],
                None => catalog::PROVIDERS.to_vec(),
            };
            let table: BTreeMap<&str, &[&str]> = providers
                .iter()
                .map(|p| (p.as_str(), catalog::supported_models(*p)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&table)?);
        }
        Commands::Run {
            agent,
            message,
            session,
            context,
        } => {
            let agent_config = AgentConfig::from_path(&agent)?;
            let context = parse_context(&context)?;

            std::fs::create_dir_all(&settings.workspace_dir).with_context(|| {
                format!(
                    "Failed to create workspace at {}",
                    settings.workspace_dir.display()
                )
            })?;

            let tools = Arc::new(ToolRegistry::with_builtins(&settings.workspace_dir));
            let providers = Arc::new(DefaultProviderFactory::new(settings.clone()));
            let registry = Arc::new(AgentRegistry::new(tools, providers));
            let engine = AgentLoop::new(registry.clone()).with_metrics_sink(Arc::new(TracingMetricsSink));

            let agent_id = registry.build(agent_config)?;
            tracing::debug!(agent_id = %agent_id, path = %agent.display(), "Agent built from file");
            let result = engine.execute(&agent_id, &message, session, context).await;

            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_context(entries: &[String]) -> Result<BTreeMap<String, serde_json::Value>> {
    entries
        .iter()
        .map(|entry| {
            let (key, value) = entry
                .split_once('=')
                .with_context(|| format!("Context entry '{}' is not KEY=VALUE", entry))?;
            let value = serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
            Ok((key.trim().to_string(), value))
        })
        .collect()
}
