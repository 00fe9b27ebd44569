use anyhow::Result;
use std::io::Write;

use crate::messages::Message;
use crate::model::ChatModel;

pub(super) async fn run(model: &ChatModel, out: &mut impl Write) -> Result<()> {
    writeln!(out, "model: {}", model.model_name())?;
    let reply = model.invoke("Hello").await?;
    writeln!(out, "{}", reply.text())?;
    writeln!(out)?;

    writeln!(out, "1. Single prompt")?;
    let reply = model.invoke("Why do parrots have colorful feathers?").await?;
    writeln!(out, "{}", reply.text())?;
    writeln!(out)?;

    writeln!(out, "2. Conversation history")?;
    let conversation = vec![
        Message::system("You are a helpful assistant that translates English into French."),
        Message::user("Translate: I love programming."),
        Message::assistant("J'adore la programmation."),
        Message::user("Translate: I love building applications."),
    ];
    let reply = model.invoke(conversation).await?;
    writeln!(out, "{}", reply.text())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::messages::Role;
    use crate::model::ChatModel;
    use crate::testing::{EchoGateway, ScriptedGateway, text_reply};
    use crate::walkthroughs::output_of;

    #[tokio::test]
    async fn prints_each_reply() {
        let model = ChatModel::with_gateway(Arc::new(EchoGateway), "qwen-plus");
        let mut buf = Vec::new();
        super::run(&model, &mut buf).await.expect("walkthrough should run");

        let text = output_of(buf);
        assert!(text.contains("model: qwen-plus"));
        assert!(text.contains("echo: Hello"));
        assert!(text.contains("echo: Why do parrots have colorful feathers?"));
        assert!(text.contains("echo: Translate: I love building applications."));
    }

    #[tokio::test]
    async fn translation_turn_sends_full_history() {
        let gateway = ScriptedGateway::new([
            text_reply("Hi"),
            text_reply("Pigments"),
            text_reply("J'adore créer des applications."),
        ]);
        let model = ChatModel::with_gateway(gateway.clone(), "qwen-plus");
        super::run(&model, &mut Vec::new())
            .await
            .expect("walkthrough should run");

        let requests = gateway.requests();
        let roles: Vec<Role> = requests[2].messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
    }
}
