use anyhow::Result;
use std::io::Write;
use std::sync::Arc;

use super::preview;
use crate::messages::{AiMessage, Message};
use crate::model::ChatModel;
use crate::usage::UsageTracker;

const LONG_PROMPT: &str = "Explain in detail what machine learning is, including its definition, main application areas and common algorithms.";

fn print_usage(out: &mut impl Write, reply: &AiMessage, input_label: &str) -> Result<()> {
    match &reply.usage {
        Some(usage) => {
            writeln!(out, "   {input_label}: {}", usage.input_tokens)?;
            writeln!(out, "   output tokens: {}", usage.output_tokens)?;
            writeln!(out, "   total tokens: {}", usage.total_tokens)?;
        }
        None => writeln!(out, "   (no usage reported)")?,
    }
    Ok(())
}

pub(super) async fn run(model: &ChatModel, out: &mut impl Write) -> Result<()> {
    writeln!(out, "Token usage")?;
    writeln!(out)?;

    writeln!(out, "1. Short message")?;
    let reply = model.invoke("Hello!").await?;
    writeln!(out, "   input: Hello!")?;
    print_usage(out, &reply, "input tokens")?;
    writeln!(out)?;

    writeln!(out, "2. Longer message")?;
    let reply = model.invoke(LONG_PROMPT).await?;
    writeln!(out, "   input: {LONG_PROMPT}")?;
    print_usage(out, &reply, "input tokens")?;
    writeln!(out)?;

    writeln!(out, "3. Multi-turn conversation")?;
    let reply = model
        .invoke(vec![
            Message::system("You are a programming assistant."),
            Message::user("What is Rust?"),
            Message::assistant("Rust is a systems programming language."),
            Message::user("What are its main features?"),
        ])
        .await?;
    print_usage(out, &reply, "input tokens (including history)")?;
    writeln!(out)?;

    writeln!(out, "4. Full usage metadata")?;
    let reply = model.invoke("Explain quantum computing.").await?;
    match &reply.usage {
        Some(usage) => writeln!(out, "   {usage}")?,
        None => writeln!(out, "   (no usage reported)")?,
    }
    writeln!(out)?;

    writeln!(out, "5. Tracking usage across calls")?;
    let tracker = Arc::new(UsageTracker::new());
    let tracked = model.clone().with_usage_tracker(Arc::clone(&tracker));
    let reply = tracked
        .invoke("Hello, please introduce quantum computing.")
        .await?;
    writeln!(out, "   response: {}", preview(reply.text(), 50))?;
    writeln!(out, "   usage so far: {}", tracker.total())?;

    tracker.reset();
    tracked.invoke("Hello").await?;
    tracked.invoke("Goodbye").await?;
    for (model_name, usage) in tracker.snapshot() {
        writeln!(out, "   total for {model_name}: {usage}")?;
    }
    Ok(())
}
