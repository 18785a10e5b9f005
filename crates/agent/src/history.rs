//! Conversation store: the ordered turn history and its JSONL record.
//!
//! Each line of `<history_dir>/<project_id>.jsonl` is one JSON-encoded
//! [`Turn`]. The file is rewritten whole on every save (temp file + rename),
//! so a crash mid-write leaves the previous record intact.
//!
//! Every tool call is immediately followed by its result. The store only
//! accepts calls and results together, and repairs the sequence on load.

use gemcode_core::error::HistoryError;
use gemcode_core::turn::{Role, ToolInvocation, Turn};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct ConversationStore {
    turns: Vec<Turn>,
    accumulated_token_count: u64,
    project_id: String,
    path: PathBuf,
}

impl ConversationStore {
    /// An empty store that will persist to `path`.
    pub fn new(project_id: impl Into<String>, path: PathBuf) -> Self {
        Self {
            turns: Vec::new(),
            accumulated_token_count: 0,
            project_id: project_id.into(),
            path,
        }
    }

    /// Open the record for `project_id` under `history_dir`, starting empty
    /// when none exists yet.
    pub fn open(history_dir: &Path, project_id: &str) -> Result<Self, HistoryError> {
        let path = history_dir.join(format!("{project_id}.jsonl"));
        let mut store = Self::load(&path)?;
        store.project_id = project_id.to_string();
        Ok(store)
    }

    /// Restore a store from a JSONL file. A missing file yields an empty
    /// store; unrecognised lines and unpaired tool turns are skipped.
    pub fn load(path: &Path) -> Result<Self, HistoryError> {
        let project_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No conversation record yet");
                return Ok(Self::new(project_id, path.to_path_buf()));
            }
            Err(e) => {
                return Err(HistoryError::Read {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let parsed: Vec<Turn> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(n, line)| match serde_json::from_str::<Turn>(line) {
                Ok(turn) => Some(turn),
                Err(e) => {
                    warn!(line = n + 1, error = %e, "Skipping unrecognised history line");
                    None
                }
            })
            .collect();

        let turns = repair_pairs(parsed);
        info!(path = %path.display(), turns = turns.len(), "Conversation restored");

        Ok(Self {
            turns,
            accumulated_token_count: 0,
            project_id,
            path: path.to_path_buf(),
        })
    }

    /// A stable identifier for the project rooted at `dir`: the directory
    /// name restricted to `[A-Za-z0-9_-]`, plus a short hash of the full path
    /// so equally named projects do not share a record.
    pub fn project_id_for(dir: &Path) -> String {
        let name: String = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        let name = if name.is_empty() { "root".to_string() } else { name };

        let digest = Sha256::digest(dir.to_string_lossy().as_bytes());
        let short: String = format!("{digest:x}").chars().take(8).collect();
        format!("{name}-{short}")
    }

    pub fn append_text(&mut self, role: Role, text: impl Into<String>) {
        self.turns.push(Turn::Text {
            role,
            text: text.into(),
        });
    }

    /// Append a tool call and its result as one unit.
    pub fn append_tool_exchange(&mut self, call: ToolInvocation, result: impl Into<String>) {
        let answer = Turn::result_for(&call, result);
        self.turns.push(Turn::ToolCall { call });
        self.turns.push(answer);
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Text of the most recent model text turn.
    pub fn last_model_text(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|t| match t {
            Turn::Text {
                role: Role::Model,
                text,
            } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn add_tokens(&mut self, n: u64) {
        self.accumulated_token_count = self.accumulated_token_count.saturating_add(n);
    }

    /// Tokens reported by the model this session.
    pub fn accumulated_token_count(&self) -> u64 {
        self.accumulated_token_count
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the whole history with a single model turn holding `summary`.
    pub fn summarize_and_compact(&mut self, summary: impl Into<String>) {
        let before = self.turns.len();
        self.turns.clear();
        self.append_text(Role::Model, summary);
        info!(before, "Conversation compacted");
    }

    /// Write the history as JSON Lines.
    pub fn save(&self) -> Result<(), HistoryError> {
        let write_err = |reason: String| HistoryError::Write {
            path: self.path.display().to_string(),
            reason,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }

        let mut content = String::new();
        for turn in &self.turns {
            let line = serde_json::to_string(turn).map_err(|e| write_err(e.to_string()))?;
            content.push_str(&line);
            content.push('\n');
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        std::fs::write(&tmp, &content).map_err(|e| write_err(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| write_err(e.to_string()))?;

        debug!(path = %self.path.display(), turns = self.turns.len(), "Conversation saved");
        Ok(())
    }

    /// Forget every turn and delete the persisted record.
    pub fn clear(&mut self) -> Result<(), HistoryError> {
        self.turns.clear();
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Conversation record deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HistoryError::Write {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Drop tool calls not immediately answered and results with no call.
fn repair_pairs(turns: Vec<Turn>) -> Vec<Turn> {
    let mut repaired = Vec::with_capacity(turns.len());
    let mut iter = turns.into_iter().peekable();

    while let Some(turn) = iter.next() {
        match turn {
            Turn::ToolCall { .. } => {
                if iter.peek().is_some_and(|next| turn.is_answered_by(next)) {
                    repaired.push(turn);
                    if let Some(result) = iter.next() {
                        repaired.push(result);
                    }
                } else {
                    warn!("Dropping tool call without a matching result");
                }
            }
            Turn::ToolResult { ref id, .. } => {
                warn!(id = %id, "Dropping tool result without a preceding call");
            }
            text => repaired.push(text),
        }
    }

    repaired
}

/// Whether every tool call is immediately followed by its result and no
/// result stands alone.
pub fn pairs_are_intact(turns: &[Turn]) -> bool {
    let mut i = 0;
    while i < turns.len() {
        match &turns[i] {
            Turn::ToolCall { .. } => {
                if !turns.get(i + 1).is_some_and(|next| turns[i].is_answered_by(next)) {
                    return false;
                }
                i += 2;
            }
            Turn::ToolResult { .. } => return false,
            Turn::Text { .. } => i += 1,
        }
    }
    true
}
