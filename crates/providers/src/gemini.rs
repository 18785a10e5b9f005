//! Gemini native client implementation.
//!
//! Talks to the Generative Language REST API directly.
//!
//! Features:
//! - `x-goog-api-key` header authentication
//! - System instruction and tools inline or through a cached context
//! - Native function calling with `functionCall` / `functionResponse` parts
//! - Thought summaries returned as parts flagged `thought: true`
//! - Structured JSON output via `responseSchema`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gemcode_core::error::ProviderError;
use gemcode_core::provider::*;
use gemcode_core::tool::ToolDeclaration;
use gemcode_core::turn::{ToolArgs, ToolInvocation, Turn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const API_VERSION: &str = "v1beta";

/// Gemini REST client.
pub struct GeminiClient {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a new Gemini client.
    pub fn new(api_key: impl Into<String>) -> Self {
        // Thinking responses on large contexts can take minutes.
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            name: "gemini".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Convert turns to Gemini `contents`, one content per turn.
    fn to_api_contents(turns: &[Turn]) -> Vec<Value> {
        turns
            .iter()
            .map(|turn| {
                let part = match turn {
                    Turn::Text { text, .. } => json!({ "text": text }),
                    Turn::ToolCall { call } => json!({
                        "functionCall": {
                            "id": call.id,
                            "name": call.name,
                            "args": call.args,
                        }
                    }),
                    Turn::ToolResult { id, name, result } => json!({
                        "functionResponse": {
                            "id": id,
                            "name": name,
                            "response": { "result": result },
                        }
                    }),
                };
                json!({ "role": turn.role().to_string(), "parts": [part] })
            })
            .collect()
    }

    /// Convert tool declarations to a Gemini `tools` array.
    fn to_api_tools(declarations: &[ToolDeclaration]) -> Value {
        let functions: Vec<Value> = declarations
            .iter()
            .map(|d| {
                json!({
                    "name": d.name,
                    "description": d.description,
                    "parameters": upper_case_types(d.json_schema()),
                })
            })
            .collect();
        json!([{ "functionDeclarations": functions }])
    }

    fn tool_config(mode: ToolMode) -> Value {
        json!({ "functionCallingConfig": { "mode": mode } })
    }

    fn system_content(text: &str) -> Value {
        json!({ "parts": [{ "text": text }] })
    }

    /// Build the `generateContent` request body.
    fn build_body(request: &GenerateRequest) -> Value {
        let config = &request.config;
        let mut body = json!({
            "contents": Self::to_api_contents(&request.contents),
        });

        // A cached context already fixes instruction, tools and tool config;
        // the endpoint rejects any of them next to `cachedContent`.
        if let Some(ref cached) = config.cached_content {
            body["cachedContent"] = json!(cached);
        } else {
            if let Some(ref system) = config.system_instruction {
                body["systemInstruction"] = Self::system_content(system);
            }
            if !config.tools.is_empty() {
                body["tools"] = Self::to_api_tools(&config.tools);
            }
            if !config.tools.is_empty() || config.tool_mode == ToolMode::None {
                body["toolConfig"] = Self::tool_config(config.tool_mode);
            }
        }

        let mut generation = json!({ "temperature": config.temperature });
        if let Some(ref mime) = config.response_mime_type {
            generation["responseMimeType"] = json!(mime);
        }
        if let Some(ref schema) = config.response_schema {
            generation["responseSchema"] = schema.clone();
        }
        if let Some(thinking) = config.thinking {
            generation["thinkingConfig"] = json!({
                "thinkingBudget": thinking.budget,
                "includeThoughts": thinking.include_thoughts,
            });
        }
        body["generationConfig"] = generation;

        body
    }

    /// Map non-success statuses to provider errors.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid Gemini API key".into(),
            ));
        }
        if !(200..300).contains(&status) {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Gemini API error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }
        Ok(response)
    }

    /// Convert a Gemini API response into a ModelResponse.
    fn response_to_model_response(resp: GeminiResponse) -> ModelResponse {
        let candidates = resp
            .candidates
            .into_iter()
            .map(|c| {
                let parts = c
                    .content
                    .map(|content| content.parts)
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|p| {
                        if let Some(call) = p.function_call {
                            let args = match call.args {
                                Value::Object(map) => map,
                                _ => ToolArgs::new(),
                            };
                            let invocation = match call.id {
                                Some(id) if !id.is_empty() => {
                                    ToolInvocation::with_id(id, call.name, args)
                                }
                                _ => ToolInvocation::new(call.name, args),
                            };
                            return Some(Part::ToolCall(invocation));
                        }
                        p.text.map(|text| Part::Text {
                            text,
                            thought: p.thought,
                        })
                    })
                    .collect();
                Candidate {
                    parts,
                    finish_reason: c.finish_reason,
                }
            })
            .collect();

        let usage = resp.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        ModelResponse { candidates, usage }
    }
}

/// Gemini schemas spell types in upper case ("STRING", "OBJECT").
fn upper_case_types(mut schema: Value) -> Value {
    match &mut schema {
        Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                if key == "type" {
                    if let Value::String(s) = value {
                        *s = s.to_ascii_uppercase();
                    }
                } else {
                    *value = upper_case_types(value.take());
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                *item = upper_case_types(item.take());
            }
        }
        _ => {}
    }
    schema
}

#[async_trait]
impl ModelClient for GeminiClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: GenerateRequest) -> Result<ModelResponse, ProviderError> {
        let url = format!(
            "{}/{API_VERSION}/models/{}:generateContent",
            self.base_url, request.model
        );
        let body = Self::build_body(&request);

        debug!(
            provider = "gemini",
            model = %request.model,
            turns = request.contents.len(),
            cached = request.config.cached_content.is_some(),
            "Sending generateContent request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let response = Self::check_status(response).await?;

        let api_resp: GeminiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("Failed to parse Gemini response: {e}")))?;

        Ok(Self::response_to_model_response(api_resp))
    }

    async fn create_cache(&self, request: CacheRequest) -> Result<CacheHandle, ProviderError> {
        let url = format!("{}/{API_VERSION}/cachedContents", self.base_url);
        let ttl_secs = request.ttl.as_secs();
        let mut body = json!({
            "model": format!("models/{}", request.model),
            "systemInstruction": Self::system_content(&request.system_instruction),
            "ttl": format!("{ttl_secs}s"),
        });
        if !request.tools.is_empty() {
            body["tools"] = Self::to_api_tools(&request.tools);
            body["toolConfig"] = Self::tool_config(ToolMode::Auto);
        }

        debug!(provider = "gemini", model = %request.model, ttl_secs, "Creating cached context");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let response = Self::check_status(response).await?;

        let created: CachedContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Cache(format!("Failed to parse cachedContents response: {e}")))?;

        let expires_at = created
            .expire_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| {
                Utc::now() + chrono::Duration::seconds(ttl_secs as i64)
            });

        Ok(CacheHandle {
            name: created.name,
            expires_at,
        })
    }

    async fn delete_cache(&self, handle: &CacheHandle) -> Result<(), ProviderError> {
        let url = format!("{}/{API_VERSION}/{}", self.base_url, handle.name);

        debug!(provider = "gemini", cache = %handle.name, "Deleting cached context");

        let response = self
            .client
            .delete(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Self::check_status(response).await?;
        Ok(())
    }
}

// --- Gemini API types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
    #[serde(default)]
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedContentResponse {
    name: String,
    #[serde(default)]
    expire_time: Option<String>,
}
