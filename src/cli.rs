use clap::{Parser, Subcommand};

/// Streaming chat for OpenAI-compatible APIs
#[derive(Debug, Parser)]
#[command(name = "chatbot")]
#[command(version)]
#[command(about = "Streaming chat for OpenAI-compatible APIs", long_about = None)]
pub struct Args {
    /// Model name
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Provider (default: config/provider or "openai")
    #[arg(long = "provider")]
    pub provider: Option<String>,

    /// API key (takes precedence over OPENAI_API_KEY and config.toml)
    #[arg(long = "api-key", value_name = "KEY")]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Prompt text (positional) (used when no subcommand is given)
    #[arg(value_name = "PROMPT")]
    pub prompt: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run an interactive terminal chat with in-memory history
    Chat,
}
