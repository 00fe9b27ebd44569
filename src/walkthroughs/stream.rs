use anyhow::Result;
use futures::TryStreamExt;
use std::io::Write;

use super::print_stream;
use crate::messages::AiMessageChunk;
use crate::model::ChatModel;

pub(super) async fn run(model: &ChatModel, out: &mut impl Write) -> Result<()> {
    writeln!(out, "1. Streamed reply")?;
    print_stream(model, "Why do parrots have colorful feathers?", out).await?;
    writeln!(out)?;
    writeln!(out)?;

    writeln!(out, "2. Accumulated chunks")?;
    let full = model
        .stream("What color is the sky?")
        .await?
        .try_fold(AiMessageChunk::default(), |full, chunk| async move {
            Ok(full + chunk)
        })
        .await?;
    let message = full.into_message()?;
    writeln!(out, "full content: {}", message.text())?;
    if let Some(reason) = &message.finish_reason {
        writeln!(out, "finish reason: {reason}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::model::ChatModel;
    use crate::testing::{ScriptedGateway, text_reply};
    use crate::walkthroughs::output_of;

    #[tokio::test]
    async fn streams_then_prints_accumulated_message() {
        let gateway = ScriptedGateway::new([
            text_reply("Pigments and structural color."),
            text_reply("The sky is blue."),
        ]);
        let model = ChatModel::with_gateway(gateway, "qwen-plus");
        let mut buf = Vec::new();
        super::run(&model, &mut buf).await.expect("walkthrough should run");

        let text = output_of(buf);
        assert!(text.contains("Pigments and structural color."));
        assert!(text.contains("full content: The sky is blue."));
        assert!(text.contains("finish reason: stop"));
    }
}
