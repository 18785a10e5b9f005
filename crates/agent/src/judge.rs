//! Continuation judge: decides whether the agent keeps going on its own.
//!
//! The judge asks the model a yes/no question through structured output.
//! Anything that goes wrong counts as "no": stopping to wait for the user is
//! always safe, running on is not.

use gemcode_core::provider::{GenerateConfig, GenerateRequest, ModelClient, ModelResponse, ToolMode};
use gemcode_core::turn::Turn;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::prompts::JUDGE_PROMPT;

#[derive(Debug, Deserialize)]
struct Verdict {
    should_continue: bool,
}

pub struct ContinuationJudge {
    client: Arc<dyn ModelClient>,
    model: String,
}

impl ContinuationJudge {
    pub fn new(client: Arc<dyn ModelClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Whether the agent should proceed after saying `last_model_text`.
    pub async fn should_continue(&self, last_model_text: &str) -> bool {
        let text = last_model_text.trim();
        if text.is_empty() || text.ends_with('?') {
            return false;
        }

        match self.client.generate(self.request(text)).await {
            Ok(response) => {
                let verdict = parse_verdict(&response);
                debug!(?verdict, "Continuation verdict");
                verdict.unwrap_or(false)
            }
            Err(e) => {
                warn!(error = %e, "Continuation judge call failed");
                false
            }
        }
    }

    /// The judge request: one user turn, no tools, no cache, no thinking.
    fn request(&self, text: &str) -> GenerateRequest {
        GenerateRequest {
            model: self.model.clone(),
            contents: vec![Turn::user(format!("{JUDGE_PROMPT}\n\n{text}"))],
            config: GenerateConfig {
                tool_mode: ToolMode::None,
                response_mime_type: Some("application/json".into()),
                response_schema: Some(verdict_schema()),
                ..GenerateConfig::plain(0.0)
            },
        }
    }
}

/// Structured-output schema for the verdict.
pub fn verdict_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "should_continue": {
                "type": "BOOLEAN",
                "description": "Whether the agent should continue without user input"
            }
        },
        "required": ["should_continue"]
    })
}

fn parse_verdict(response: &ModelResponse) -> Option<bool> {
    let text = response.text();
    if text.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<Verdict>(text.trim()) {
        Ok(v) => Some(v.should_continue),
        Err(e) => {
            warn!(error = %e, "Unparsable continuation verdict");
            None
        }
    }
}
