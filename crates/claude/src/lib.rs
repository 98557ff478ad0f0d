//! Claude integration: the decision oracle for the agent loop.

pub mod client;
pub mod output;
pub mod prompts;

pub use client::{ClaudeClient, ClaudeConfig, DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
pub use output::{ContentBlock, MessagesRequest, MessagesResponse, Usage};
pub use prompts::{build_user_prompt, SYSTEM_PROMPT};
