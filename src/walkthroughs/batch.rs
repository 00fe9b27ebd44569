use anyhow::Result;
use std::io::Write;

use crate::model::ChatModel;

const QUESTIONS: [&str; 3] = [
    "Why do parrots have colorful feathers?",
    "How do airplanes fly?",
    "What is quantum computing?",
];

pub(super) async fn run(model: &ChatModel, out: &mut impl Write) -> Result<()> {
    let replies = model.batch(QUESTIONS).await?;

    for (i, reply) in replies.iter().enumerate() {
        writeln!(out)?;
        writeln!(out, "Answer to question {}:", i + 1)?;
        writeln!(out, "{}", reply.text())?;
    }
    Ok(())
}
