//! The agent loop: the part of gemcode that talks to the model.
//!
//! A user turn runs like this:
//!
//! 1. **Append** the user's line to the conversation
//! 2. **Call** the model with the full history, cached or inline context
//! 3. **If tool calls**: dispatch them, append each call/result pair, go to 2
//! 4. **If text**: show it, then ask the continuation judge whether the
//!    agent should carry on without the user
//!
//! The loop stops when the judge says stop, the model returns nothing
//! twice for the same reason, or the iteration limit is hit.

pub mod cache;
pub mod history;
pub mod judge;
pub mod loop_runner;
pub mod prompts;

#[cfg(test)]
mod test_helpers;

pub use cache::{CacheSpec, ContextCache};
pub use history::ConversationStore;
pub use judge::ContinuationJudge;
pub use loop_runner::{AgentLoop, AgentSettings, TurnOutcome};
