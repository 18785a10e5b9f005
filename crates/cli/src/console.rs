//! Plain-text terminal rendering of the agent's activity.

use gemcode_core::console::Console;
use serde_json::Value;
use std::io::Write;

/// Longest tool result echoed to the terminal; the model still sees all of it.
const MAX_RESULT_CHARS: usize = 2000;

pub struct TerminalConsole {
    model: String,
}

impl TerminalConsole {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into() }
    }
}

impl Console for TerminalConsole {
    fn welcome(&self) {
        println!();
        println!("  ╔══════════════════════════════════════════════╗");
        println!("  ║          GemCode — Interactive Mode          ║");
        println!("  ╚══════════════════════════════════════════════╝");
        println!();
        println!("  Model:     {}", self.model);
        println!();
        println!("  Type your request and press Enter.");
        println!("  Type 'exit', 'quit' or Ctrl+C to leave.");
        println!();
    }

    fn user_prompt(&self) {
        print!("  You > ");
        let _ = std::io::stdout().flush();
    }

    fn model_text(&self, text: &str) {
        println!();
        for line in text.lines() {
            println!("  GemCode > {line}");
        }
        println!();
    }

    fn thought(&self, text: &str) {
        for line in text.lines() {
            println!("  (thinking) {line}");
        }
    }

    fn tool_call(&self, name: &str, args: &Value) {
        println!("  ⚙ {name} {args}");
    }

    fn tool_result(&self, result: &str) {
        let shown = truncate(result, MAX_RESULT_CHARS);
        for line in shown.lines() {
            println!("    │ {line}");
        }
        if shown.len() < result.len() {
            println!("    │ ... ({} more bytes)", result.len() - shown.len());
        }
    }

    fn tool_error(&self, error: &str) {
        println!("    ✗ {error}");
    }

    fn unknown_tool(&self, name: &str) {
        println!("    ✗ Unknown function call: {name}");
    }

    fn token_count(&self, count: u64) {
        println!("  [tokens used: {count}]");
    }

    fn error(&self, message: &str, detail: Option<&str>) {
        match detail {
            Some(detail) => eprintln!("  [Error] {message}: {detail}"),
            None => eprintln!("  [Error] {message}"),
        }
    }

    fn exit(&self) {
        println!();
        println!("  Goodbye!");
        println!();
    }
}

/// Cut `text` to at most `max` bytes on a char boundary.
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
