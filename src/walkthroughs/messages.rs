use anyhow::{Context, Result};
use serde_json::json;
use std::io::Write;

use crate::messages::{Message, Role};
use crate::model::ChatModel;

const DETAILED_SYSTEM_PROMPT: &str = "\
You are a senior Rust developer who knows web frameworks well.
Always provide code examples and explain your reasoning.
Be concise but thorough in your explanations.";

pub(super) async fn run(model: &ChatModel, out: &mut impl Write) -> Result<()> {
    writeln!(out, "1. Message objects")?;
    let reply = model
        .invoke(vec![
            Message::system("You are a helpful assistant."),
            Message::user("Hello, how are you?"),
        ])
        .await?;
    writeln!(out, "response type: {}", Role::Assistant.label())?;
    writeln!(out, "response content: {}", reply.text())?;
    writeln!(out)?;

    writeln!(out, "2. String shortcut for a single human message")?;
    let reply = model.invoke("Write a poem about spring.").await?;
    writeln!(out, "{}", reply.text())?;
    writeln!(out)?;

    writeln!(out, "3. Message list with a prior AI turn")?;
    let history = vec![
        Message::system("You are a poetry expert."),
        Message::user("Write a poem about spring."),
        Message::assistant("Spring breeze brushes the blossoms..."),
    ];
    let reply = model.invoke(history.as_slice()).await?;
    writeln!(out, "{}", reply.text())?;
    writeln!(out)?;

    writeln!(out, "4. The same list as role dictionaries")?;
    let from_dicts: Vec<Message> = serde_json::from_value(json!([
        {"role": "system", "content": "You are a poetry expert."},
        {"role": "user", "content": "Write a poem about spring."},
        {"role": "assistant", "content": "Spring breeze brushes the blossoms..."}
    ]))
    .context("Failed to decode role dictionaries")?;
    writeln!(out, "matches message objects: {}", from_dicts == history)?;
    let reply = model.invoke(from_dicts).await?;
    writeln!(out, "{}", reply.text())?;
    writeln!(out)?;

    writeln!(out, "5. System prompts")?;
    let reply = model
        .invoke(vec![
            Message::system("You are a helpful programming assistant."),
            Message::user("How do I create a REST API?"),
        ])
        .await?;
    writeln!(out, "{}", reply.text())?;
    writeln!(out)?;
    writeln!(out, "{}", "=".repeat(50))?;
    writeln!(out)?;
    let reply = model
        .invoke(vec![
            Message::system(DETAILED_SYSTEM_PROMPT),
            Message::user("How do I build a simple REST API with axum?"),
        ])
        .await?;
    writeln!(out, "{}", reply.text())?;
    writeln!(out)?;

    writeln!(out, "6. Human message metadata")?;
    let human = Message::user("Hi! I want to learn about deep learning.")
        .with_name("alice")
        .with_id("msg_123");
    writeln!(out, "content: {}", human.text())?;
    writeln!(out, "name: {}", human.name.as_deref().unwrap_or("-"))?;
    writeln!(out, "id: {}", human.id.as_deref().unwrap_or("-"))?;
    let reply = model.invoke(human).await?;
    writeln!(out, "model response: {}", reply.text())?;
    writeln!(out)?;

    writeln!(out, "7. Manual AI message in the history")?;
    let reply = model
        .invoke(vec![
            Message::system("You are a helpful assistant."),
            Message::user("Can you help me?"),
            Message::assistant("I'd be happy to help you with that!"),
            Message::user("Great! What is 2+2?"),
        ])
        .await?;
    writeln!(out, "{}", reply.text())?;
    writeln!(out)?;

    writeln!(out, "8. AI message attributes")?;
    let reply = model.invoke("Hello").await?;
    writeln!(out, "text: {}", reply.text())?;
    writeln!(out, "id: {}", reply.id.as_deref().unwrap_or("-"))?;
    match &reply.usage {
        Some(usage) => writeln!(out, "usage_metadata: {usage}")?,
        None => writeln!(out, "usage_metadata: (not reported)")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::model::ChatModel;
    use crate::testing::EchoGateway;
    use crate::walkthroughs::output_of;

    #[tokio::test]
    async fn covers_every_message_kind() {
        let model = ChatModel::with_gateway(Arc::new(EchoGateway), "qwen-plus");
        let mut buf = Vec::new();
        super::run(&model, &mut buf).await.expect("walkthrough should run");

        let text = output_of(buf);
        assert!(text.contains("response type: AIMessage"));
        assert!(text.contains("response content: echo: Hello, how are you?"));
        assert!(text.contains("matches message objects: true"));
        assert!(text.contains("echo: How do I build a simple REST API with axum?"));
        assert!(text.contains("name: alice"));
        assert!(text.contains("id: msg_123"));
        assert!(text.contains("echo: Great! What is 2+2?"));
        assert!(text.contains("id: chatcmpl-test"));
        assert!(text.contains("usage_metadata: {input_tokens: 10, output_tokens: 5, total_tokens: 15}"));
    }
}
