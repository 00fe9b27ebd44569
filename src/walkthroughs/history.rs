use anyhow::Result;
use std::io::Write;

use super::preview;
use crate::conversation::Conversation;
use crate::model::ChatModel;

const QUESTIONS: [&str; 3] = [
    "What is Rust?",
    "What are its main features?",
    "Give me a simple code example.",
];

pub(super) async fn run(model: &ChatModel, out: &mut impl Write) -> Result<()> {
    let mut conversation = Conversation::new(model.clone(), "You are a helpful programming assistant.");

    writeln!(out, "Starting the conversation...")?;
    writeln!(out)?;
    for question in QUESTIONS {
        writeln!(out, "user: {question}")?;
        let reply = conversation.run_turn(question).await?;
        writeln!(out, "AI: {}", reply.text())?;
        writeln!(out)?;
    }

    writeln!(out)?;
    writeln!(out, "Full conversation history:")?;
    let history = conversation.history();
    for (i, message) in history.iter().enumerate() {
        writeln!(
            out,
            "{}. {}: {}",
            i + 1,
            message.role.label(),
            preview(&message.text(), 50)
        )?;
    }
    writeln!(out)?;
    writeln!(out, "{} messages in the history", history.len())?;
    Ok(())
}
