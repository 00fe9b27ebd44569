use anyhow::Result;
use futures::TryStreamExt;
use std::io::Write;
use tracing::debug;

use crate::messages::Message;
use crate::model::ChatModel;

pub(super) async fn run(model: &ChatModel, out: &mut impl Write) -> Result<()> {
    let model = model.clone().with_include_usage(true);
    let messages = vec![
        Message::system("You are a helpful assistant."),
        Message::user("Please introduce yourself."),
    ];

    let mut chunks = model.stream(messages).await?;
    let mut received = 0usize;
    write!(out, "AI: ")?;
    out.flush()?;
    while let Some(chunk) = chunks.try_next().await? {
        received += 1;
        if !chunk.content.is_empty() {
            write!(out, "{}", chunk.content)?;
            out.flush()?;
        }
        if let Some(usage) = chunk.usage {
            writeln!(out)?;
            writeln!(out, "--- Request usage ---")?;
            writeln!(out, "Input tokens: {}", usage.input_tokens)?;
            writeln!(out, "Output tokens: {}", usage.output_tokens)?;
            writeln!(out, "Total tokens: {}", usage.total_tokens)?;
        }
    }
    writeln!(out)?;

    debug!(chunks = received, "raw stream finished");
    Ok(())
}
