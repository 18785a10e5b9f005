//! `gemcode chat`: Interactive or single-message session.

use std::sync::Arc;
use std::time::Duration;
use gemcode_agent::{prompts, AgentLoop, AgentSettings, ContextCache, ConversationStore, TurnOutcome};
use gemcode_config::AppConfig;
use gemcode_core::console::Console;
use gemcode_core::provider::ModelClient;
use gemcode_core::work_tree::WorkTree;
use gemcode_mcp::McpToolSet;
use gemcode_providers::GeminiClient;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::console::TerminalConsole;

/// How long an interrupted session may spend releasing the cache and remote servers.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub async fn run(config: AppConfig, message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(api_key) = config.api_key.clone().filter(|k| !k.is_empty()) else {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export GEMINI_API_KEY=...");
        eprintln!("    export GEMCODE_API_KEY=...");
        eprintln!();
        eprintln!("  Or add api_key to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    };

    let console = Arc::new(TerminalConsole::new(&config.model));
    let mut agent = build_agent(&config, &api_key, console.clone()).await?;

    match message {
        Some(msg) => {
            let outcome = agent.handle_user_turn(&msg).await;
            let saved = agent.finish_turn().await;
            agent.shutdown().await;
            saved?;
            if outcome != TurnOutcome::Completed {
                return Err(format!("Turn ended without an answer ({outcome:?})").into());
            }
        }
        None => interactive(&mut agent, console.as_ref()).await?,
    }

    Ok(())
}

/// Wire the work tree, tools, remote servers, model client and cache together.
async fn build_agent(
    config: &AppConfig,
    api_key: &str,
    console: Arc<dyn Console>,
) -> Result<AgentLoop, Box<dyn std::error::Error>> {
    let cwd = std::env::current_dir()?;
    let tree = WorkTree::new(&cwd).with_ignored(config.tools.ignored.clone());
    let index = tree.index_summary(config.tools.max_index_files);

    let tools = Arc::new(gemcode_tools::default_registry(Duration::from_secs(
        config.tools.shell_timeout_secs,
    )));
    let client: Arc<dyn ModelClient> =
        Arc::new(GeminiClient::new(api_key).with_base_url(&config.api_url));

    let project_id = ConversationStore::project_id_for(&cwd);
    let store = ConversationStore::open(&config.history_dir(), &project_id)?;
    info!(project = %project_id, turns = store.len(), "Conversation restored");

    let mut agent = AgentLoop::new(
        client.clone(),
        tools,
        tree,
        store,
        console,
        AgentSettings::from_config(config),
    )
    .with_system_prompt(prompts::system_prompt(&index));

    let remote = McpToolSet::connect(&config.mcp_servers).await;
    if !remote.is_empty() {
        info!(tools = remote.len(), "Remote tools available");
        agent = agent.with_remote(Arc::new(remote));
    }

    if config.cache.enabled {
        let ttl = Duration::from_secs(config.cache.ttl_secs);
        match ContextCache::acquire(client, &agent.cache_spec(), ttl).await {
            Ok(cache) => agent = agent.with_cache(cache),
            Err(e) => {
                agent.shutdown().await;
                return Err(format!("Failed to create context cache: {e}").into());
            }
        }
    }

    Ok(agent)
}

/// Read lines until `exit`, `quit`, EOF or Ctrl+C, then release everything.
async fn interactive(agent: &mut AgentLoop, console: &dyn Console) -> Result<(), Box<dyn std::error::Error>> {
    console.welcome();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        console.user_prompt();
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                None
            }
        };

        let Some(line) = line else { break };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }

        let outcome = tokio::select! {
            outcome = agent.handle_user_turn(input) => Some(outcome),
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(outcome) = outcome else {
            eprintln!("\n  Interrupted.");
            shutdown_within(agent, SHUTDOWN_GRACE).await;
            std::process::exit(130);
        };
        debug!(?outcome, "User turn finished");

        if let Err(e) = agent.finish_turn().await {
            console.error("Could not save the conversation", Some(&e.to_string()));
        }
    }

    agent.shutdown().await;
    console.exit();
    Ok(())
}

/// Release the agent, giving up after `grace`. Returns whether it finished.
async fn shutdown_within(agent: &mut AgentLoop, grace: Duration) -> bool {
    match tokio::time::timeout(grace, agent.shutdown()).await {
        Ok(()) => true,
        Err(_) => {
            warn!(grace_secs = grace.as_secs(), "Shutdown timed out, exiting anyway");
            false
        }
    }
}
