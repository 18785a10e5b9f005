//! Shared test doubles for the agent loop, judge and cache tests.

use async_trait::async_trait;
use chrono::Utc;
use gemcode_core::console::Console;
use gemcode_core::error::ProviderError;
use gemcode_core::provider::*;
use gemcode_core::turn::{ToolArgs, ToolInvocation};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

type Scripted = Result<ModelResponse, ProviderError>;

/// A model that replays scripted responses.
///
/// Requests carrying a response schema are judge calls and are answered
/// from a separate queue (an empty judge queue answers "stop"). Agent
/// calls pop the main queue, then fall back to `repeat` if set, and panic
/// when both are exhausted.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Scripted>>,
    judge: Mutex<VecDeque<Scripted>>,
    repeat: Option<ModelResponse>,
    requests: Mutex<Vec<GenerateRequest>>,
    fail_cache: AtomicBool,
    cache_lifetime: chrono::Duration,
    created: Mutex<Vec<CacheRequest>>,
    deleted: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(responses: Vec<Scripted>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            judge: Mutex::new(VecDeque::new()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
            fail_cache: AtomicBool::new(false),
            cache_lifetime: chrono::Duration::hours(1),
            created: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_verdicts(self, verdicts: Vec<bool>) -> Self {
        self.with_judge_responses(
            verdicts
                .into_iter()
                .map(|v| Ok(text_response(&format!(r#"{{"should_continue": {v}}}"#))))
                .collect(),
        )
    }

    pub fn with_judge_responses(self, responses: Vec<Scripted>) -> Self {
        *self.judge.lock().unwrap() = responses.into();
        self
    }

    /// Answer every agent call past the script with `response`.
    pub fn repeating(mut self, response: ModelResponse) -> Self {
        self.repeat = Some(response);
        self
    }

    pub fn failing_cache(self) -> Self {
        self.refuse_caches();
        self
    }

    /// Make every later cache creation fail.
    pub fn refuse_caches(&self) {
        self.fail_cache.store(true, Ordering::SeqCst);
    }

    pub fn cache_lifetime(mut self, lifetime: chrono::Duration) -> Self {
        self.cache_lifetime = lifetime;
        self
    }

    /// Every request seen, judge calls included.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests made by the agent loop (judge calls excluded).
    pub fn agent_requests(&self) -> Vec<GenerateRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.config.response_schema.is_none())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn caches_created(&self) -> Vec<CacheRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn caches_deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GenerateRequest) -> Result<ModelResponse, ProviderError> {
        let is_judge = request.config.response_schema.is_some();
        self.requests.lock().unwrap().push(request);

        if is_judge {
            return self
                .judge
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(text_response(r#"{"should_continue": false}"#)));
        }

        if let Some(next) = self.responses.lock().unwrap().pop_front() {
            return next;
        }
        match &self.repeat {
            Some(response) => Ok(response.clone()),
            None => panic!("ScriptedModel: no more responses (call #{})", self.call_count()),
        }
    }

    async fn create_cache(&self, request: CacheRequest) -> Result<CacheHandle, ProviderError> {
        if self.fail_cache.load(Ordering::SeqCst) {
            return Err(ProviderError::Cache("cache creation refused".into()));
        }
        let mut created = self.created.lock().unwrap();
        created.push(request);
        Ok(CacheHandle {
            name: format!("cachedContents/test-{}", created.len()),
            expires_at: Utc::now() + self.cache_lifetime,
        })
    }

    async fn delete_cache(&self, handle: &CacheHandle) -> Result<(), ProviderError> {
        self.deleted.lock().unwrap().push(handle.name.clone());
        Ok(())
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// A response made of the given parts.
pub fn parts_response(parts: Vec<Part>) -> ModelResponse {
    ModelResponse {
        candidates: vec![Candidate {
            parts,
            finish_reason: Some("STOP".into()),
        }],
        usage: usage(),
    }
}

/// A plain text response.
pub fn text_response(text: &str) -> ModelResponse {
    parts_response(vec![Part::text(text)])
}

/// A response calling one tool.
pub fn tool_call_response(name: &str, args: serde_json::Value) -> ModelResponse {
    parts_response(vec![Part::ToolCall(make_tool_call(name, args))])
}

/// A candidate with no parts.
pub fn empty_response(finish_reason: &str) -> ModelResponse {
    ModelResponse {
        candidates: vec![Candidate {
            parts: vec![],
            finish_reason: Some(finish_reason.into()),
        }],
        usage: usage(),
    }
}

pub fn make_tool_call(name: &str, args: serde_json::Value) -> ToolInvocation {
    let args: ToolArgs = args.as_object().cloned().unwrap_or_default();
    ToolInvocation::new(name, args)
}

/// Everything a console was asked to render.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleEvent {
    Welcome,
    UserPrompt,
    ModelText(String),
    Thought(String),
    ToolCall(String),
    ToolResult(String),
    ToolError(String),
    UnknownTool(String),
    TokenCount(u64),
    Error(String),
    Exit,
}

#[derive(Default)]
pub struct RecordingConsole {
    events: Mutex<Vec<ConsoleEvent>>,
}

impl RecordingConsole {
    pub fn events(&self) -> Vec<ConsoleEvent> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: ConsoleEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl Console for RecordingConsole {
    fn welcome(&self) {
        self.push(ConsoleEvent::Welcome);
    }
    fn user_prompt(&self) {
        self.push(ConsoleEvent::UserPrompt);
    }
    fn model_text(&self, text: &str) {
        self.push(ConsoleEvent::ModelText(text.into()));
    }
    fn thought(&self, text: &str) {
        self.push(ConsoleEvent::Thought(text.into()));
    }
    fn tool_call(&self, name: &str, _args: &serde_json::Value) {
        self.push(ConsoleEvent::ToolCall(name.into()));
    }
    fn tool_result(&self, result: &str) {
        self.push(ConsoleEvent::ToolResult(result.into()));
    }
    fn tool_error(&self, error: &str) {
        self.push(ConsoleEvent::ToolError(error.into()));
    }
    fn unknown_tool(&self, name: &str) {
        self.push(ConsoleEvent::UnknownTool(name.into()));
    }
    fn token_count(&self, count: u64) {
        self.push(ConsoleEvent::TokenCount(count));
    }
    fn error(&self, message: &str, _detail: Option<&str>) {
        self.push(ConsoleEvent::Error(message.into()));
    }
    fn exit(&self) {
        self.push(ConsoleEvent::Exit);
    }
}
