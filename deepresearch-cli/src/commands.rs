//! CLI subcommand handlers.

use crate::output::{format_answer, format_event};
use crate::{Commands, ConfigAction};
use deepresearch_core::config::{ResearchConfig, config_exists, load_config};
use deepresearch_core::gateway::{GatewayServer, run_gateway, shared_gateway};
use deepresearch_core::research::{ChannelProgressSink, ProgressSink, Researcher};
use deepresearch_core::{Brain, providers};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Handle a CLI subcommand and return the process exit code.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<i32> {
    match command {
        Commands::Ask {
            query,
            budget,
            max_bad_attempts,
            json,
        } => handle_ask(&query, budget, max_bad_attempts, json, workspace).await,
        Commands::Serve { host, port } => handle_serve(host, port, workspace).await.map(|_| 0),
        Commands::Config { action } => handle_config(action, workspace).map(|_| 0),
    }
}

fn load_workspace_config(workspace: &Path) -> anyhow::Result<ResearchConfig> {
    if !config_exists(Some(workspace)) {
        info!("No config file found, using defaults and DEEPRESEARCH_* environment");
    }
    let config = load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    config.validate()?;
    Ok(config)
}

/// Wire the model, search and reader collaborators named in the config.
fn build_researcher(config: &ResearchConfig) -> anyhow::Result<Researcher> {
    let provider = providers::create_provider(&config.llm)?;
    let brain = Brain::new(provider, config.retry.clone())
        .with_temperatures(config.llm.temperatures.clone())
        .with_max_tokens(config.llm.max_tokens);
    let search = deepresearch_tools::build_search_provider(&config.search)?;
    let reader = deepresearch_tools::build_page_reader(&config.reader)?;
    info!(
        model = brain.model_name(),
        search = search.name(),
        reader = reader.name(),
        "Researcher ready"
    );
    Ok(Researcher::from_config(Arc::new(brain), search, reader, config))
}

async fn handle_ask(
    query: &str,
    budget: Option<u64>,
    max_bad_attempts: Option<u32>,
    json: bool,
    workspace: &Path,
) -> anyhow::Result<i32> {
    let config = load_workspace_config(workspace)?;
    let researcher = build_researcher(&config)?;
    let budget = budget.unwrap_or(config.controller.budget);
    let max_bad_attempts = max_bad_attempts.unwrap_or(config.controller.max_bad_attempts);

    let (sink, mut events) = ChannelProgressSink::channel();
    let sink: Arc<dyn ProgressSink> = Arc::new(sink);
    let cancel = CancellationToken::new();
    let controller = researcher
        .controller()
        .with_sink(sink)
        .with_cancellation(cancel.clone());

    let query = query.to_string();
    let run = tokio::spawn(async move { controller.run(&query, budget, max_bad_attempts).await });

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling research");
            ctrl_c.cancel();
        }
    });

    // The sink is dropped with the controller, which closes the channel.
    while let Some(event) = events.recv().await {
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else if !event.is_terminal() {
            println!("{}", format_event(&event));
        } else {
            eprintln!("{}", format_event(&event));
        }
    }

    match run.await? {
        Ok(answer) => {
            if !json {
                println!("\n{}", format_answer(&answer));
            }
            Ok(0)
        }
        Err(e) => {
            if !json {
                eprintln!("Research failed: {e}");
            }
            Ok(1)
        }
    }
}

async fn handle_serve(host: Option<String>, port: Option<u16>, workspace: &Path) -> anyhow::Result<()> {
    let mut config = load_workspace_config(workspace)?;
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }
    let researcher = build_researcher(&config)?;
    let server = GatewayServer::new(config.gateway.clone(), researcher);
    if server.auth().is_open_mode() {
        warn!("No gateway auth tokens configured, accepting all requests");
    }
    run_gateway(shared_gateway(server)).await?;
    Ok(())
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".deepresearch");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&ResearchConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
