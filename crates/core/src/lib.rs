//! # gemcode Core
//!
//! Domain types, traits, and error definitions for the gemcode coding
//! assistant. Every collaborator the agent loop talks to is defined as a
//! trait here; implementations live in their respective crates.
//!
//! ## Design Philosophy
//!
//! - The model, the console and remote tool sessions are traits, so the agent
//!   loop can be driven by scripted fakes in tests
//! - Tools share one uniform `(work tree, args) -> Result<String, ToolError>` shape
//! - All crates depend inward on core

pub mod console;
pub mod error;
pub mod provider;
pub mod remote;
pub mod tool;
pub mod turn;
pub mod work_tree;

// Re-export key types at crate root for ergonomics
pub use console::{Console, NullConsole};
pub use error::{HistoryError, ProviderError, ToolError};
pub use provider::{
    CacheHandle, CacheRequest, Candidate, GenerateConfig, GenerateRequest, ModelClient,
    ModelResponse, Part, ThinkingConfig, ToolMode, Usage,
};
pub use remote::RemoteToolSession;
pub use tool::{ParamKind, ParameterSpec, Tool, ToolDeclaration, ToolRegistry};
pub use turn::{Role, ToolArgs, ToolInvocation, Turn};
pub use work_tree::WorkTree;
