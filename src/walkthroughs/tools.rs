use anyhow::Result;
use serde_json::json;
use std::io::Write;

use crate::messages::Message;
use crate::model::ChatModel;
use crate::tools::{BuiltinRunner, ToolRunner, get_weather_spec, tool_result_message};

pub(super) async fn run(model: &ChatModel, out: &mut impl Write) -> Result<()> {
    writeln!(out, "Full tool-calling round trip")?;
    writeln!(out)?;

    let question = "What's the weather like in Beijing?";
    writeln!(out, "user: {question}")?;
    writeln!(out)?;

    let model_with_tools = model.bind_tools([get_weather_spec()])?;
    let reply = model_with_tools.invoke(question).await?;
    writeln!(out, "model content: {}", reply.text())?;

    if !reply.has_tool_calls() {
        writeln!(out, "no tool calls; direct answer: {}", reply.text())?;
    } else {
        let mut messages = vec![Message::user(question), Message::from(reply.clone())];
        for call in &reply.tool_calls {
            writeln!(out, "  tool: {}", call.name)?;
            writeln!(out, "  args: {}", call.args_json())?;
            writeln!(out, "  id: {}", call.id)?;

            let result = BuiltinRunner.execute(call).await;
            let tool_message = tool_result_message(call, result);
            writeln!(out, "  result: {}", tool_message.text())?;
            writeln!(out)?;
            messages.push(tool_message);
        }

        let final_reply = model_with_tools.invoke(messages).await?;
        writeln!(out, "final answer: {}", final_reply.text())?;
    }

    writeln!(out)?;
    writeln!(out, "{}", "=".repeat(50))?;
    writeln!(out)?;
    writeln!(out, "Tool message artifacts")?;
    let tool_message = Message::tool("It was the best of times, it was the worst of times.", "call_456")
        .with_name("search_books")
        .with_artifact(json!({
            "document_id": "doc_123",
            "page": 0,
            "source": "A Tale of Two Cities"
        }));
    writeln!(out, "content (sent to the model): {}", tool_message.text())?;
    if let Some(artifact) = &tool_message.artifact {
        writeln!(out, "artifact (kept locally): {artifact}")?;
        writeln!(out, "  - document id: {}", artifact["document_id"])?;
        writeln!(out, "  - page: {}", artifact["page"])?;
        writeln!(out, "  - source: {}", artifact["source"])?;
    }
    Ok(())
}
