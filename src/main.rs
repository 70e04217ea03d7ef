mod app;
mod chat;
mod cli;
mod config;
mod credential;
mod paths;
mod provider;
mod session;

#[cfg(feature = "tui")]
mod tui;

use anyhow::Context;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = cli::Args::parse();

    let config_dir = paths::config_dir()?;
    let cfg = config::Config::load_optional(config_dir.join("config.toml"))?;
    tracing::debug!(?config_dir, ?cfg, "resolved config");

    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    if let Some(cli::Command::Chat) = &args.cmd {
        #[cfg(feature = "tui")]
        return tui::run_tui(&http, cfg.as_ref(), &args).await;

        #[cfg(not(feature = "tui"))]
        anyhow::bail!("this build was compiled without the `tui` feature");
    }

    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!("No prompt provided. Try: chatbot \"Hello\" or `chatbot chat`");
    }

    let provider_name = args
        .provider
        .clone()
        .or_else(|| cfg.as_ref().and_then(|c| c.provider.clone()))
        .unwrap_or_else(|| "openai".to_string());
    let provider = app::build_provider(&http, cfg.as_ref(), &provider_name)?;

    let opts = app::turn_options(args.model.clone(), cfg.as_ref());

    let raw_key = app::resolve_api_key(args.api_key.as_deref(), cfg.as_ref()).context(
        "no API key found (pass --api-key, set OPENAI_API_KEY, or add api_key to config.toml)",
    )?;

    // One-shot turn against an empty conversation. The sink publishes the
    // whole accumulated text; print only what is new and flush per fragment.
    use std::io::Write;
    let mut printed = 0usize;
    let mut sink = session::StreamSink::new(String::new(), move |full: &str| {
        print!("{}", &full[printed..]);
        printed = full.len();
        std::io::stdout().flush().ok();
    });

    let mut conversation = session::Conversation::new();
    chat::submit(
        provider.as_ref(),
        &raw_key,
        &opts,
        &mut conversation,
        &prompt,
        &mut sink,
    )
    .await?;
    println!();

    Ok(())
}
