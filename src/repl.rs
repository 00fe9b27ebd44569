use anyhow::{Context, Result};
use std::io::{self, Write};
use std::sync::Arc;

use crate::conversation::Conversation;
use crate::messages::Message;
use crate::model::ChatModel;
use crate::tools::{BuiltinRunner, builtin_specs};
use crate::usage::UsageTracker;

pub async fn run_repl(model: &ChatModel, system_prompt: &str) -> Result<()> {
    let tracker = Arc::new(UsageTracker::new());
    let model = model
        .bind_tools(builtin_specs())?
        .with_usage_tracker(Arc::clone(&tracker));
    let mut conversation = Conversation::new(model.clone(), system_prompt).with_tools(BuiltinRunner);

    println!("chatwalk chat");
    println!("model: {}", model.model_name());
    println!(
        "type a prompt, '/history' to inspect memory, '/reset' to clear memory, '/usage' for token totals, or 'exit' to quit"
    );

    loop {
        print!("> ");
        io::stdout().flush().context("Failed to flush stdout")?;

        let mut input = String::new();
        let read = io::stdin()
            .read_line(&mut input)
            .context("Failed to read stdin")?;
        if read == 0 {
            break;
        }

        let prompt = input.trim();
        if prompt.is_empty() {
            continue;
        }
        if prompt.eq_ignore_ascii_case("exit") || prompt.eq_ignore_ascii_case("quit") {
            break;
        }
        if prompt.eq_ignore_ascii_case("/reset") {
            conversation.reset();
            println!("conversation reset\n");
            continue;
        }
        if prompt.eq_ignore_ascii_case("/history") {
            print_history(conversation.history());
            continue;
        }
        if prompt.eq_ignore_ascii_case("/usage") {
            print_usage(&tracker);
            continue;
        }

        print!("AI: ");
        io::stdout().flush().context("Failed to flush stdout")?;
        let reply = conversation
            .stream_turn(prompt, |delta| {
                print!("{delta}");
                let _ = io::stdout().flush();
            })
            .await?;
        if reply.content.is_empty() {
            print!("(no text reply)");
        }
        println!("\n");
    }

    Ok(())
}

fn print_history(history: &[Message]) {
    if history.is_empty() {
        println!("(history is empty)\n");
        return;
    }

    for (idx, msg) in history.iter().enumerate() {
        let mut line = format!("[{}] {}: {}", idx, msg.role.as_str(), msg.text());
        for call in &msg.tool_calls {
            line.push_str(&format!(" -> {}({})", call.name, call.args_json()));
        }
        println!("{line}");
    }
    println!();
}

fn print_usage(tracker: &UsageTracker) {
    let snapshot = tracker.snapshot();
    if snapshot.is_empty() {
        println!("(no usage recorded yet)\n");
        return;
    }

    for (model, usage) in &snapshot {
        println!("{model}: {usage}");
    }
    println!();
}
