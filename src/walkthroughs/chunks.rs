use anyhow::Result;
use futures::TryStreamExt;
use std::io::Write;

use super::print_stream;
use crate::messages::AiMessageChunk;
use crate::model::ChatModel;

pub(super) async fn run(model: &ChatModel, out: &mut impl Write) -> Result<()> {
    writeln!(out, "1. Basic streaming")?;
    write!(out, "AI: ")?;
    print_stream(model, "Introduce machine learning in one sentence.", out).await?;
    writeln!(out)?;
    writeln!(out)?;

    writeln!(out, "2. Collecting every chunk")?;
    let chunks: Vec<AiMessageChunk> = model.stream("What is deep learning?").await?.try_collect().await?;
    writeln!(out, "   received {} chunks", chunks.len())?;
    let first = chunks.first().map(|chunk| chunk.content.as_str()).unwrap_or("N/A");
    writeln!(out, "   first chunk: {first}")?;
    writeln!(out)?;

    writeln!(out, "3. Merging into a full message")?;
    let (full, _) = print_stream(model, "Explain neural networks.", &mut std::io::sink()).await?;
    let message = full.into_message()?;
    writeln!(out, "   merged content: {}", message.text())?;
    if let Some(usage) = &message.usage {
        writeln!(out, "   merged usage: {usage}")?;
    }
    writeln!(out)?;

    writeln!(out, "4. Progress while streaming")?;
    write!(out, "AI: ")?;
    let (_, count) = print_stream(model, "Write a short poem about spring.", out).await?;
    writeln!(out)?;
    writeln!(out, "   ({count} chunks in total)")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::model::ChatModel;
    use crate::testing::{ScriptedGateway, text_reply};
    use crate::walkthroughs::output_of;

    #[tokio::test]
    async fn reports_counts_first_chunk_and_merged_message() {
        let gateway = ScriptedGateway::new([
            text_reply("Machine learning learns from data."),
            text_reply("Deep learning stacks layers."),
            text_reply("Neural networks are layered functions."),
            text_reply("Blossoms wake"),
        ]);
        let model = ChatModel::with_gateway(gateway, "qwen-plus");
        let mut buf = Vec::new();
        super::run(&model, &mut buf).await.expect("walkthrough should run");

        let text = output_of(buf);
        assert!(text.contains("AI: Machine learning learns from data."));
        // four words, a finish chunk and a usage chunk
        assert!(text.contains("received 6 chunks"), "{text}");
        assert!(text.contains("first chunk: Deep "));
        assert!(text.contains("merged content: Neural networks are layered functions."));
        assert!(text.contains("merged usage: {input_tokens: 10, output_tokens: 5, total_tokens: 15}"));
        assert!(text.contains("AI: Blossoms wake"));
        assert!(text.contains("(4 chunks in total)"));
    }
}
