//! Model client implementations for gemcode.
//!
//! All clients implement the `gemcode_core::ModelClient` trait.

pub mod gemini;

pub use gemini::GeminiClient;
