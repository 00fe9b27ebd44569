pub mod config;
pub mod conversation;
pub mod logging;
pub mod messages;
pub mod model;
pub mod model_gateway;
pub mod providers;
pub mod repl;
pub mod structured;
pub mod tools;
pub mod usage;
pub mod walkthroughs;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result, bail};
use reqwest::Client;
use std::env;
use std::io::{self, Write};
use std::time::Duration;
use tracing::info;

use config::Config;
use conversation::Conversation;
use model::ChatModel;
use repl::run_repl;

pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let cfg = Config::from_env();
    info!(
        provider = %cfg.model_provider,
        model = %cfg.model,
        base_url = %cfg.model_base_url,
        timeout_secs = cfg.model_timeout_secs,
        api_key_present = cfg.api_key.is_some(),
        "loaded runtime configuration"
    );

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        return walkthroughs::print_catalogue(&mut io::stdout().lock());
    };
    if matches!(command, "list" | "help" | "--help" | "-h") {
        return walkthroughs::print_catalogue(&mut io::stdout().lock());
    }

    if !matches!(command, "chat" | "ask") {
        walkthroughs::find(command)?;
    }

    let client = Client::builder()
        .timeout(Duration::from_secs(cfg.model_timeout_secs))
        .build()
        .context("Failed to initialize HTTP client")?;
    let model = ChatModel::from_config(client, &cfg)?;

    match command {
        "chat" => run_repl(&model, &cfg.system_prompt).await,
        "ask" => {
            let prompt = args[1..].join(" ");
            if prompt.trim().is_empty() {
                bail!("Usage: chatwalk ask <prompt>");
            }
            let mut conversation = Conversation::new(model, &cfg.system_prompt);
            let answer = conversation.run_turn(&prompt).await?;
            println!("{}", answer.text().trim());
            Ok(())
        }
        name => {
            let mut stdout = io::stdout().lock();
            walkthroughs::run(name, &model, &mut stdout).await?;
            stdout.flush().context("Failed to flush stdout")
        }
    }
}
