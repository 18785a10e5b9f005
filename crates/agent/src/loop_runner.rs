//! The agent loop implementation.

use std::sync::Arc;
use gemcode_config::AppConfig;
use gemcode_core::console::Console;
use gemcode_core::error::{HistoryError, ToolError};
use gemcode_core::provider::{
    GenerateConfig, GenerateRequest, ModelClient, ModelResponse, Part, ThinkingConfig, ToolMode,
};
use gemcode_core::remote::RemoteToolSession;
use gemcode_core::tool::{ToolDeclaration, ToolRegistry};
use gemcode_core::turn::{Role, ToolInvocation, Turn};
use gemcode_core::work_tree::WorkTree;
use tracing::{debug, info, warn};

use crate::cache::{CacheSpec, ContextCache};
use crate::history::ConversationStore;
use crate::judge::ContinuationJudge;
use crate::prompts::{self, CONTINUE_PROMPT, SUMMARIZE_PROMPT};

/// Settings the loop reads on every call.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub temperature: f32,
    /// Model calls allowed per user turn; the last one is forced to answer in text
    pub max_iterations: u32,
    /// History length above which the conversation is summarized
    pub max_turns_in_context: usize,
    pub thinking: Option<ThinkingConfig>,
}

impl AgentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let thinking = (config.thinking_budget > 0).then_some(ThinkingConfig {
            budget: config.thinking_budget,
            include_thoughts: config.include_thoughts,
        });
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_iterations: config.max_iterations,
            max_turns_in_context: config.max_turns_in_context,
            thinking,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// How a user turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model answered and nothing asked to keep going
    Completed,
    /// The model kept returning empty responses; handed back to the user
    Escalated,
    /// The model call failed; the history is unchanged past the user turn
    Failed,
}

/// Per-turn bookkeeping, rebuilt for every user turn.
#[derive(Debug)]
struct RunState {
    remaining_iterations: u32,
    last_issue: Option<String>,
}

impl RunState {
    fn new(max_iterations: u32) -> Self {
        Self {
            remaining_iterations: max_iterations,
            last_issue: None,
        }
    }
}

/// The orchestrator: sends the history to the model, dispatches the tool
/// calls it asks for, and decides when to hand control back to the user.
pub struct AgentLoop {
    client: Arc<dyn ModelClient>,
    tools: Arc<ToolRegistry>,
    tree: WorkTree,
    remote: Option<Arc<dyn RemoteToolSession>>,
    cache: ContextCache,
    judge: ContinuationJudge,
    store: ConversationStore,
    console: Arc<dyn Console>,
    settings: AgentSettings,
    system_prompt: String,
}

impl AgentLoop {
    pub fn new(
        client: Arc<dyn ModelClient>,
        tools: Arc<ToolRegistry>,
        tree: WorkTree,
        store: ConversationStore,
        console: Arc<dyn Console>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            cache: ContextCache::disabled(client.clone()),
            judge: ContinuationJudge::new(client.clone(), settings.model.clone()),
            client,
            tools,
            tree,
            remote: None,
            store,
            console,
            settings,
            system_prompt: prompts::BASE_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Serve names the local registry does not know from `remote`.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteToolSession>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_cache(mut self, cache: ContextCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConversationStore {
        &mut self.store
    }

    /// Local declarations in registration order, then remote ones whose
    /// names are not already taken.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        let mut declarations = self.tools.declarations();
        if let Some(remote) = &self.remote {
            for decl in remote.tool_declarations() {
                if !self.tools.contains(&decl.name) {
                    declarations.push(decl);
                }
            }
        }
        declarations
    }

    /// What the context cache should hold right now.
    pub fn cache_spec(&self) -> CacheSpec {
        CacheSpec {
            model: self.settings.model.clone(),
            system_instruction: self.system_prompt.clone(),
            tools: self.declarations(),
        }
    }

    /// Process one line of user input until the model hands control back.
    pub async fn handle_user_turn(&mut self, text: &str) -> TurnOutcome {
        self.store.append_text(Role::User, text);
        let mut state = RunState::new(self.settings.max_iterations);

        info!(
            project = %self.store.project_id(),
            turns = self.store.len(),
            "Processing user turn"
        );

        loop {
            state.remaining_iterations = state.remaining_iterations.saturating_sub(1);
            let mode = if state.remaining_iterations == 0 {
                warn!("Iteration limit reached, forcing a text answer");
                ToolMode::None
            } else {
                ToolMode::Auto
            };

            debug!(remaining = state.remaining_iterations, ?mode, "Agent loop iteration");

            let response = match self.call_model(self.store.turns().to_vec(), mode).await {
                Ok(response) => response,
                Err(detail) => {
                    self.console.error("Model request failed", Some(&detail));
                    return TurnOutcome::Failed;
                }
            };

            if let Some(usage) = &response.usage {
                self.store.add_tokens(u64::from(usage.total_tokens));
            }

            if !has_usable_content(&response) {
                self.show_thoughts(&response);
                let reason = response.finish_reason().to_string();
                let repeated = state.last_issue.as_deref() == Some(reason.as_str());
                if repeated || state.remaining_iterations == 0 {
                    warn!(finish_reason = %reason, "Empty model response, escalating to the user");
                    self.console.error(
                        "The model returned no content. Please rephrase or try again.",
                        Some(&reason),
                    );
                    return TurnOutcome::Escalated;
                }
                warn!(finish_reason = %reason, "Empty model response, reporting back to the model");
                self.store.append_text(Role::User, prompts::issue_prompt(&reason));
                state.last_issue = Some(reason);
                continue;
            }

            state.last_issue = None;
            let keep_going = self.handle_parts(&response, &mut state).await;
            if !keep_going {
                debug!("Turn completed");
                return TurnOutcome::Completed;
            }
        }
    }

    /// Walk the candidate's parts in order. Returns whether to call the
    /// model again.
    async fn handle_parts(&mut self, response: &ModelResponse, state: &mut RunState) -> bool {
        let mut keep_going = false;

        for part in response.parts() {
            match part {
                Part::Text { text, thought: true } => self.console.thought(text),
                Part::Text { text, thought: false } => {
                    if text.trim().is_empty() {
                        continue;
                    }
                    self.store.append_text(Role::Model, text.clone());
                    self.console.model_text(text);

                    if state.remaining_iterations > 0 && self.judge.should_continue(text).await {
                        debug!("Continuing without user input");
                        self.store.append_text(Role::User, CONTINUE_PROMPT);
                        return true;
                    }
                }
                Part::ToolCall(call) => {
                    if state.remaining_iterations == 0 {
                        warn!(tool = %call.name, "Refusing tool call after the iteration limit");
                        continue;
                    }
                    self.dispatch(call.clone()).await;
                    keep_going = true;
                }
            }
        }

        keep_going
    }

    fn show_thoughts(&self, response: &ModelResponse) {
        for part in response.parts() {
            if let Part::Text { text, thought: true } = part {
                self.console.thought(text);
            }
        }
    }

    /// Run one tool call and record the exchange.
    async fn dispatch(&mut self, call: ToolInvocation) {
        self.console
            .tool_call(&call.name, &serde_json::Value::Object(call.args.clone()));

        let result = if self.tools.contains(&call.name) {
            self.tools.dispatch(&self.tree, &call.name, &call.args).await
        } else {
            match &self.remote {
                Some(remote) if remote.has_tool(&call.name) => remote.call(&call.name, &call.args).await,
                _ => Err(ToolError::Unknown(call.name.clone())),
            }
        };

        let text = match result {
            Ok(output) => {
                self.console.tool_result(&output);
                output
            }
            Err(ToolError::Unknown(name)) => {
                warn!(tool = %name, "Model called an unknown tool");
                self.console.unknown_tool(&name);
                format!("Unknown function call: {name}")
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool call failed");
                self.console.tool_error(&e.to_string());
                format!("Error: {e}")
            }
        };

        self.store.append_tool_exchange(call, text);
    }

    /// Compact if the history is too long, persist it, and report tokens.
    pub async fn finish_turn(&mut self) -> Result<(), HistoryError> {
        if self.store.len() > self.settings.max_turns_in_context {
            self.compact().await;
        }
        self.store.save()?;
        self.console.token_count(self.store.accumulated_token_count());
        Ok(())
    }

    async fn compact(&mut self) {
        info!(turns = self.store.len(), "Summarizing conversation");

        let mut contents = self.store.turns().to_vec();
        contents.push(Turn::user(SUMMARIZE_PROMPT));

        match self.call_model(contents, ToolMode::None).await {
            Ok(response) => {
                if let Some(usage) = &response.usage {
                    self.store.add_tokens(u64::from(usage.total_tokens));
                }
                let summary = response.text();
                if summary.trim().is_empty() {
                    warn!(
                        finish_reason = %response.finish_reason(),
                        "Empty summary, keeping the full history"
                    );
                } else {
                    self.store.summarize_and_compact(summary);
                }
            }
            Err(e) => warn!(error = %e, "Summarization failed, keeping the full history"),
        }
    }

    /// Release the context cache and the remote session. Never fails.
    pub async fn shutdown(&mut self) {
        self.cache.release().await;
        if let Some(remote) = &self.remote {
            remote.cleanup().await;
        }
        info!("Agent shut down");
    }

    async fn call_model(&mut self, contents: Vec<Turn>, mode: ToolMode) -> Result<ModelResponse, String> {
        let spec = self.cache_spec();
        // The cached context pins tool calling to AUTO, so tool-less calls go inline.
        let cached = match mode {
            ToolMode::Auto => self.cache.ensure_current(&spec).await,
            ToolMode::None => None,
        };

        let config = match cached {
            Some(name) => GenerateConfig {
                tool_mode: mode,
                cached_content: Some(name),
                thinking: self.settings.thinking,
                ..GenerateConfig::plain(self.settings.temperature)
            },
            None => GenerateConfig {
                tool_mode: mode,
                tools: spec.tools,
                system_instruction: Some(spec.system_instruction),
                thinking: self.settings.thinking,
                ..GenerateConfig::plain(self.settings.temperature)
            },
        };

        let request = GenerateRequest {
            model: self.settings.model.clone(),
            contents,
            config,
        };

        self.client.generate(request).await.map_err(|e| {
            warn!(error = %e, "Model request failed");
            e.to_string()
        })
    }
}

/// Whether the response carries visible text or a tool call. Thought-only
/// and blank-text responses count as empty.
fn has_usable_content(response: &ModelResponse) -> bool {
    response.parts().iter().any(|part| match part {
        Part::Text { text, thought: false } => !text.trim().is_empty(),
        Part::Text { thought: true, .. } => false,
        Part::ToolCall(_) => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::pairs_are_intact;
    use crate::test_helpers::*;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use gemcode_core::error::ProviderError;
    use gemcode_core::tool::{ParamKind, ParameterSpec, Tool};
    use gemcode_core::turn::ToolArgs;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    struct ListTool;

    #[async_trait]
    impl Tool for ListTool {
        fn name(&self) -> &str { "list_files" }
        fn description(&self) -> &str { "List project files" }
        fn parameters(&self) -> Vec<ParameterSpec> { vec![] }
        async fn execute(&self, _tree: &WorkTree, _args: &ToolArgs) -> Result<String, ToolError> {
            Ok("src/main.rs\nCargo.toml".into())
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echo the text" }
        fn parameters(&self) -> Vec<ParameterSpec> {
            vec![ParameterSpec::required("text", ParamKind::String, "Text")]
        }
        async fn execute(&self, _tree: &WorkTree, args: &ToolArgs) -> Result<String, ToolError> {
            Ok(args["text"].as_str().unwrap_or_default().to_string())
        }
    }

    #[derive(Default)]
    struct FakeRemote {
        cleaned_up: Mutex<bool>,
    }

    #[async_trait]
    impl RemoteToolSession for FakeRemote {
        fn tool_declarations(&self) -> Vec<ToolDeclaration> {
            vec![
                ToolDeclaration {
                    name: "lookup_issue".into(),
                    description: "Look up an issue".into(),
                    parameters: vec![],
                },
                ToolDeclaration {
                    name: "echo".into(),
                    description: "Shadowed by the local tool".into(),
                    parameters: vec![],
                },
            ]
        }
        fn has_tool(&self, name: &str) -> bool {
            name == "lookup_issue" || name == "echo"
        }
        async fn call(&self, name: &str, _args: &ToolArgs) -> Result<String, ToolError> {
            Ok(format!("remote {name} ok"))
        }
        async fn cleanup(&self) {
            *self.cleaned_up.lock().unwrap() = true;
        }
    }

    struct Harness {
        model: Arc<ScriptedModel>,
        console: Arc<RecordingConsole>,
        agent: AgentLoop,
        _dir: tempfile::TempDir,
    }

    fn harness(model: ScriptedModel, settings: AgentSettings) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(model);
        let console = Arc::new(RecordingConsole::default());

        let mut registry = ToolRegistry::new();
        registry.register(Box::new(ListTool));
        registry.register(Box::new(EchoTool));

        let store = ConversationStore::new("test-project", dir.path().join("test-project.jsonl"));
        let agent = AgentLoop::new(
            model.clone(),
            Arc::new(registry),
            WorkTree::new(dir.path()),
            store,
            console.clone(),
            settings,
        )
        .with_system_prompt("You are a test agent.");

        Harness { model, console, agent, _dir: dir }
    }

    fn settings() -> AgentSettings {
        AgentSettings {
            model: "gemini-test".into(),
            temperature: 0.2,
            max_iterations: 30,
            max_turns_in_context: 10,
            thinking: None,
        }
    }

    #[tokio::test]
    async fn tool_call_then_answer() {
        let model = ScriptedModel::new(vec![
            tool_call_response("list_files", json!({})),
            text_response("The project has two files."),
        ]);
        let mut h = harness(model, settings());

        let outcome = h.agent.handle_user_turn("list files").await;
        assert_eq!(outcome, TurnOutcome::Completed);

        let turns = h.agent.store().turns();
        assert_eq!(turns.len(), 4);
        assert!(matches!(&turns[1], Turn::ToolCall { call } if call.name == "list_files"));
        assert!(matches!(&turns[2], Turn::ToolResult { result, .. } if result.contains("Cargo.toml")));
        assert_eq!(turns[3].text(), Some("The project has two files."));
        assert!(pairs_are_intact(turns));
        assert_eq!(h.agent.store().accumulated_token_count(), 30);

        // Two agent calls plus one judge call on the final text
        assert_eq!(h.model.agent_requests().len(), 2);
        assert_eq!(h.model.call_count(), 3);

        let events = h.console.events();
        assert!(events.contains(&ConsoleEvent::ToolCall("list_files".into())));
        assert!(events.contains(&ConsoleEvent::ModelText("The project has two files.".into())));
    }

    #[tokio::test]
    async fn inline_context_without_cache() {
        let model = ScriptedModel::new(vec![text_response("Hi?")]);
        let mut h = harness(model, settings());
        h.agent = h.agent.with_remote(Arc::new(FakeRemote::default()));

        h.agent.handle_user_turn("hello").await;

        let request = &h.model.agent_requests()[0];
        assert_eq!(request.config.system_instruction.as_deref(), Some("You are a test agent."));
        assert!(request.config.cached_content.is_none());
        assert_eq!(request.config.tool_mode, ToolMode::Auto);
        let names: Vec<&str> = request.config.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["list_files", "echo", "lookup_issue"]);
    }

    #[tokio::test]
    async fn iteration_limit_forces_text() {
        let model = ScriptedModel::new(vec![])
            .repeating(tool_call_response("echo", json!({"text": "again"})));
        let mut h = harness(model, AgentSettings { max_iterations: 3, ..settings() });

        let outcome = h.agent.handle_user_turn("loop forever").await;
        assert_eq!(outcome, TurnOutcome::Completed);

        let requests = h.model.agent_requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].config.tool_mode, ToolMode::Auto);
        assert_eq!(requests[2].config.tool_mode, ToolMode::None);

        // The call returned on the final iteration is refused
        assert_eq!(h.agent.store().len(), 5);
        assert!(pairs_are_intact(h.agent.store().turns()));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_to_the_model() {
        let model = ScriptedModel::new(vec![
            tool_call_response("deploy_prod", json!({})),
            text_response("That tool does not exist. What should I do instead?"),
        ]);
        let mut h = harness(model, settings());

        h.agent.handle_user_turn("deploy").await;

        let turns = h.agent.store().turns();
        assert_eq!(turns.len(), 4);
        assert!(matches!(
            &turns[2],
            Turn::ToolResult { result, .. } if result == "Unknown function call: deploy_prod"
        ));
        assert!(h.console.events().contains(&ConsoleEvent::UnknownTool("deploy_prod".into())));
        // Text ending in a question never reaches the judge
        assert_eq!(h.model.call_count(), 2);
    }

    #[tokio::test]
    async fn bad_arguments_become_error_results() {
        let model = ScriptedModel::new(vec![
            tool_call_response("echo", json!({})),
            text_response("Retrying later?"),
        ]);
        let mut h = harness(model, settings());

        h.agent.handle_user_turn("echo").await;

        match &h.agent.store().turns()[2] {
            Turn::ToolResult { result, .. } => {
                assert!(result.starts_with("Error: Invalid arguments for echo"), "{result}")
            }
            other => panic!("expected a tool result, got {other:?}"),
        }
        assert!(h.console.events().iter().any(|e| matches!(e, ConsoleEvent::ToolError(_))));
    }

    #[tokio::test]
    async fn remote_tools_serve_unknown_local_names() {
        let model = ScriptedModel::new(vec![
            tool_call_response("lookup_issue", json!({"id": 7})),
            tool_call_response("echo", json!({"text": "local"})),
            text_response("Both done?"),
        ]);
        let mut h = harness(model, settings());
        h.agent = h.agent.with_remote(Arc::new(FakeRemote::default()));

        h.agent.handle_user_turn("check").await;

        let results: Vec<&str> = h
            .agent
            .store()
            .turns()
            .iter()
            .filter_map(|t| match t {
                Turn::ToolResult { result, .. } => Some(result.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(results, vec!["remote lookup_issue ok", "local"]);
    }

    #[tokio::test]
    async fn several_calls_in_one_response_are_all_dispatched() {
        let model = ScriptedModel::new(vec![
            parts_response(vec![
                Part::ToolCall(make_tool_call("echo", json!({"text": "a"}))),
                Part::ToolCall(make_tool_call("echo", json!({"text": "b"}))),
            ]),
            text_response("Echoed both?"),
        ]);
        let mut h = harness(model, settings());

        h.agent.handle_user_turn("echo twice").await;

        assert_eq!(h.agent.store().len(), 6);
        assert!(pairs_are_intact(h.agent.store().turns()));
        assert_eq!(h.model.agent_requests().len(), 2);
    }

    #[tokio::test]
    async fn judge_continues_with_synthetic_turn() {
        let model = ScriptedModel::new(vec![
            text_response("Next I will read the config file."),
            text_response("All done."),
        ])
        .with_verdicts(vec![true, false]);
        let mut h = harness(model, settings());

        let outcome = h.agent.handle_user_turn("fix the config").await;
        assert_eq!(outcome, TurnOutcome::Completed);

        let texts: Vec<&str> = h.agent.store().turns().iter().filter_map(|t| t.text()).collect();
        assert_eq!(
            texts,
            vec!["fix the config", "Next I will read the config file.", CONTINUE_PROMPT, "All done."]
        );
        assert_eq!(h.model.agent_requests().len(), 2);
    }

    #[tokio::test]
    async fn judge_is_skipped_on_the_last_iteration() {
        let model = ScriptedModel::new(vec![text_response("Next I will keep going.")])
            .with_verdicts(vec![true]);
        let mut h = harness(model, AgentSettings { max_iterations: 1, ..settings() });

        let outcome = h.agent.handle_user_turn("go").await;
        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(h.model.call_count(), 1);
        assert_eq!(h.agent.store().len(), 2);
    }

    #[tokio::test]
    async fn repeated_empty_response_escalates() {
        let model = ScriptedModel::new(vec![empty_response("SAFETY"), empty_response("SAFETY")]);
        let mut h = harness(model, settings());

        let outcome = h.agent.handle_user_turn("do something").await;
        assert_eq!(outcome, TurnOutcome::Escalated);

        let turns = h.agent.store().turns();
        assert_eq!(turns.len(), 2);
        assert!(turns[1].text().unwrap().contains("SAFETY"));
        assert!(h.console.events().iter().any(|e| matches!(e, ConsoleEvent::Error(_))));
    }

    #[tokio::test]
    async fn empty_response_is_retried_once() {
        let model = ScriptedModel::new(vec![
            empty_response("MAX_TOKENS"),
            text_response("Recovered?"),
        ]);
        let mut h = harness(model, settings());

        let outcome = h.agent.handle_user_turn("try").await;
        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(h.agent.store().len(), 3);
        assert_eq!(h.agent.store().last_model_text(), Some("Recovered?"));
    }

    #[tokio::test]
    async fn thought_only_response_is_reported_back() {
        let mut thinking = parts_response(vec![Part::thought("Planning the answer")]);
        thinking.candidates[0].finish_reason = Some("MAX_TOKENS".into());
        let model = ScriptedModel::new(vec![thinking, text_response("Real answer?")]);
        let mut h = harness(model, settings());

        let outcome = h.agent.handle_user_turn("explain").await;
        assert_eq!(outcome, TurnOutcome::Completed);

        let turns = h.agent.store().turns();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1].text(), Some(prompts::issue_prompt("MAX_TOKENS").as_str()));
        assert_eq!(h.agent.store().last_model_text(), Some("Real answer?"));
        assert_eq!(h.model.agent_requests().len(), 2);
        assert!(h.console.events().contains(&ConsoleEvent::Thought("Planning the answer".into())));
    }

    #[tokio::test]
    async fn blank_text_response_is_reported_back() {
        let model = ScriptedModel::new(vec![text_response(""), text_response("Real answer?")]);
        let mut h = harness(model, settings());

        let outcome = h.agent.handle_user_turn("explain").await;
        assert_eq!(outcome, TurnOutcome::Completed);

        let turns = h.agent.store().turns();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1].text(), Some(prompts::issue_prompt("STOP").as_str()));
        assert_eq!(h.agent.store().last_model_text(), Some("Real answer?"));
        assert_eq!(h.model.agent_requests().len(), 2);
    }

    #[tokio::test]
    async fn usable_response_clears_the_previous_issue() {
        let model = ScriptedModel::new(vec![
            empty_response("SAFETY"),
            tool_call_response("echo", json!({"text": "hi"})),
            empty_response("SAFETY"),
            text_response("Done?"),
        ]);
        let mut h = harness(model, settings());

        let outcome = h.agent.handle_user_turn("go").await;
        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(h.model.agent_requests().len(), 4);
        assert_eq!(h.agent.store().last_model_text(), Some("Done?"));
        assert!(pairs_are_intact(h.agent.store().turns()));
    }

    #[tokio::test]
    async fn model_error_fails_the_turn() {
        let model = ScriptedModel::with_results(vec![Err(ProviderError::Network("connection reset".into()))]);
        let mut h = harness(model, settings());

        let outcome = h.agent.handle_user_turn("hello").await;
        assert_eq!(outcome, TurnOutcome::Failed);
        assert_eq!(h.agent.store().len(), 1);
        assert_eq!(
            h.console.events(),
            vec![ConsoleEvent::Error("Model request failed".into())]
        );
    }

    #[tokio::test]
    async fn thoughts_are_shown_but_not_stored() {
        let model = ScriptedModel::new(vec![parts_response(vec![
            Part::thought("The user wants a greeting."),
            Part::text("Hello! What are we working on?"),
        ])]);
        let mut h = harness(model, settings());

        h.agent.handle_user_turn("hi").await;

        assert_eq!(h.agent.store().len(), 2);
        assert!(h.console.events().contains(&ConsoleEvent::Thought("The user wants a greeting.".into())));
    }

    #[tokio::test]
    async fn finish_turn_compacts_and_saves() {
        let model = ScriptedModel::new(vec![
            tool_call_response("list_files", json!({})),
            text_response("Two files?"),
            text_response("User asked for the file list; it has two files."),
        ]);
        let mut h = harness(model, AgentSettings { max_turns_in_context: 2, ..settings() });

        h.agent.handle_user_turn("list files").await;
        h.agent.finish_turn().await.unwrap();

        let store = h.agent.store();
        assert_eq!(store.len(), 1);
        assert_eq!(store.last_model_text(), Some("User asked for the file list; it has two files."));
        assert!(store.path().exists());

        let summary_request = h.model.agent_requests().pop().unwrap();
        assert_eq!(summary_request.config.tool_mode, ToolMode::None);
        assert_eq!(summary_request.contents.last().and_then(|t| t.text()), Some(SUMMARIZE_PROMPT));

        assert!(matches!(h.console.events().last(), Some(ConsoleEvent::TokenCount(45))));
    }

    #[tokio::test]
    async fn finish_turn_keeps_history_when_summary_fails() {
        let model = ScriptedModel::with_results(vec![
            Ok(text_response("Short answer?")),
            Err(ProviderError::Network("down".into())),
        ]);
        let mut h = harness(model, AgentSettings { max_turns_in_context: 1, ..settings() });

        h.agent.handle_user_turn("question").await;
        h.agent.finish_turn().await.unwrap();

        assert_eq!(h.agent.store().len(), 2);
        assert!(h.agent.store().path().exists());
    }

    #[tokio::test]
    async fn cached_context_replaces_inline_context() {
        let model = ScriptedModel::new(vec![text_response("Hi?")]);
        let mut h = harness(model, settings());
        let cache = ContextCache::acquire(h.model.clone(), &h.agent.cache_spec(), Duration::from_secs(3600))
            .await
            .unwrap();
        h.agent = h.agent.with_cache(cache);

        h.agent.handle_user_turn("hello").await;

        let request = &h.model.agent_requests()[0];
        assert_eq!(request.config.cached_content.as_deref(), Some("cachedContents/test-1"));
        assert!(request.config.system_instruction.is_none());
        assert!(request.config.tools.is_empty());
        assert_eq!(h.model.caches_created().len(), 1);
    }

    #[tokio::test]
    async fn failed_cache_refresh_falls_back_to_inline() {
        let model = ScriptedModel::new(vec![text_response("Hi?")])
            .cache_lifetime(chrono::Duration::seconds(10));
        let mut h = harness(model, settings());
        let cache = ContextCache::acquire(h.model.clone(), &h.agent.cache_spec(), Duration::from_secs(10))
            .await
            .unwrap();
        h.agent = h.agent.with_cache(cache);
        h.model.refuse_caches();

        let outcome = h.agent.handle_user_turn("hello").await;
        assert_eq!(outcome, TurnOutcome::Completed);

        let request = &h.model.agent_requests()[0];
        assert!(request.config.cached_content.is_none());
        assert_eq!(request.config.system_instruction.as_deref(), Some("You are a test agent."));
        assert_eq!(request.config.tools.len(), 2);
    }

    #[tokio::test]
    async fn tool_less_calls_bypass_the_cache() {
        let model = ScriptedModel::new(vec![
            tool_call_response("echo", json!({"text": "one"})),
            text_response("Forced answer."),
            text_response("Summary of the session."),
        ]);
        let mut h = harness(model, AgentSettings { max_iterations: 2, max_turns_in_context: 2, ..settings() });
        let cache = ContextCache::acquire(h.model.clone(), &h.agent.cache_spec(), Duration::from_secs(3600))
            .await
            .unwrap();
        h.agent = h.agent.with_cache(cache);

        let outcome = h.agent.handle_user_turn("go").await;
        assert_eq!(outcome, TurnOutcome::Completed);
        h.agent.finish_turn().await.unwrap();

        let requests = h.model.agent_requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].config.tool_mode, ToolMode::Auto);
        assert_eq!(requests[0].config.cached_content.as_deref(), Some("cachedContents/test-1"));

        // Forced final answer, then the summary
        for request in &requests[1..] {
            assert_eq!(request.config.tool_mode, ToolMode::None);
            assert!(request.config.cached_content.is_none());
            assert_eq!(request.config.system_instruction.as_deref(), Some("You are a test agent."));
            assert_eq!(request.config.tools.len(), 2);
        }
        assert_eq!(h.model.caches_created().len(), 1);
    }

    #[tokio::test]
    async fn shutdown_releases_cache_and_remote() {
        let model = ScriptedModel::new(vec![]);
        let mut h = harness(model, settings());
        let remote = Arc::new(FakeRemote::default());
        let cache = ContextCache::acquire(h.model.clone(), &h.agent.cache_spec(), Duration::from_secs(3600))
            .await
            .unwrap();
        h.agent = h.agent.with_cache(cache).with_remote(remote.clone());

        h.agent.shutdown().await;

        assert_eq!(h.model.caches_deleted(), vec!["cachedContents/test-1"]);
        assert!(*remote.cleaned_up.lock().unwrap());
    }

    #[test]
    fn settings_from_config() {
        let mut config = AppConfig::default();
        config.thinking_budget = 0;
        assert!(AgentSettings::from_config(&config).thinking.is_none());

        config.thinking_budget = 2048;
        let settings = AgentSettings::from_config(&config);
        assert_eq!(settings.thinking.map(|t| t.budget), Some(2048));
        assert_eq!(settings.max_iterations, config.max_iterations);
    }

    #[derive(Debug, Clone)]
    enum Reply {
        Text,
        Call,
        MultiCall,
        UnknownTool,
        Empty,
    }

    fn scripted_response() -> impl Strategy<Value = Reply> {
        prop_oneof![
            Just(Reply::Text),
            Just(Reply::Call),
            Just(Reply::MultiCall),
            Just(Reply::UnknownTool),
            Just(Reply::Empty),
        ]
    }

    fn render(kind: &Reply) -> ModelResponse {
        match kind {
            Reply::Text => text_response("Done?"),
            Reply::Call => tool_call_response("echo", json!({"text": "x"})),
            Reply::MultiCall => parts_response(vec![
                Part::text("Checking both."),
                Part::ToolCall(make_tool_call("list_files", json!({}))),
                Part::ToolCall(make_tool_call("echo", json!({"text": "y"}))),
            ]),
            Reply::UnknownTool => tool_call_response("missing_tool", json!({})),
            Reply::Empty => empty_response("OTHER"),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn any_script_keeps_pairs_and_the_iteration_bound(
            script in prop::collection::vec(scripted_response(), 0..12),
            max_iterations in 1u32..8,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let model = ScriptedModel::new(script.iter().map(render).collect())
                .repeating(text_response("Done?"));
            let mut h = harness(model, AgentSettings { max_iterations, ..settings() });

            let outcome = runtime.block_on(h.agent.handle_user_turn("go"));

            prop_assert_ne!(outcome, TurnOutcome::Failed);
            prop_assert!(pairs_are_intact(h.agent.store().turns()));
            prop_assert!(h.model.agent_requests().len() <= max_iterations as usize);
        }
    }
}
