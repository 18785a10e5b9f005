//! `gemcode history`: Manage the conversation recorded for a directory.

use gemcode_agent::ConversationStore;
use gemcode_config::AppConfig;

pub async fn clear(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let cwd = std::env::current_dir()?;
    let project_id = ConversationStore::project_id_for(&cwd);
    let mut store = ConversationStore::open(&config.history_dir(), &project_id)?;

    let turns = store.len();
    store.clear()?;
    tracing::info!(project = %project_id, turns, "Conversation history cleared");
    println!("Cleared {turns} turns of history for {}", cwd.display());
    Ok(())
}
