use anyhow::Result;
use futures::TryStreamExt;
use tracing::{debug, warn};

use crate::messages::{AiMessage, AiMessageChunk, Message, Role};
use crate::model::ChatModel;
use crate::tools::{ToolRunner, tool_result_message};

pub const MAX_HISTORY_MESSAGES: usize = 40;
pub const MAX_TOOL_ROUNDS: usize = 4;

/// A chat session that carries its history between turns.
pub struct Conversation {
    model: ChatModel,
    runner: Option<Box<dyn ToolRunner>>,
    history: Vec<Message>,
    system_messages: Vec<Message>,
}

impl Conversation {
    pub fn new(model: ChatModel, system_prompt: &str) -> Self {
        let system_messages = build_system_messages(system_prompt);
        let history = system_messages.clone();
        Self {
            model,
            runner: None,
            history,
            system_messages,
        }
    }

    /// Executes tool calls requested by the model with `runner`.
    pub fn with_tools(mut self, runner: impl ToolRunner + 'static) -> Self {
        self.runner = Some(Box::new(runner));
        self
    }

    pub fn reset(&mut self) {
        self.history = self.system_messages.clone();
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub async fn run_turn(&mut self, user_input: &str) -> Result<AiMessage> {
        self.drive(user_input, None::<fn(&str)>).await
    }

    /// Like [`Conversation::run_turn`], passing each text fragment to
    /// `on_delta` as it arrives.
    pub async fn stream_turn<F>(&mut self, user_input: &str, on_delta: F) -> Result<AiMessage>
    where
        F: FnMut(&str),
    {
        self.drive(user_input, Some(on_delta)).await
    }

    async fn drive<F>(&mut self, user_input: &str, mut on_delta: Option<F>) -> Result<AiMessage>
    where
        F: FnMut(&str),
    {
        self.push(Message::user(user_input));

        let mut rounds = 0;
        loop {
            let reply = self.next_reply(on_delta.as_mut()).await?;

            let Some(runner) = self.runner.as_deref() else {
                if reply.has_tool_calls() {
                    warn!(
                        tool_calls = reply.tool_calls.len(),
                        "model requested tools but no runner is attached; ending turn"
                    );
                }
                self.record_final(&reply);
                return Ok(reply);
            };
            if !reply.has_tool_calls() {
                self.push(reply.clone().into());
                return Ok(reply);
            }
            if rounds == MAX_TOOL_ROUNDS {
                warn!(
                    max_rounds = MAX_TOOL_ROUNDS,
                    "model kept requesting tools; ending turn"
                );
                self.record_final(&reply);
                return Ok(reply);
            }
            rounds += 1;

            let mut results = Vec::with_capacity(reply.tool_calls.len());
            for call in &reply.tool_calls {
                debug!(tool_name = %call.name, tool_call_id = %call.id, round = rounds, "executing tool call");
                results.push(tool_result_message(call, runner.execute(call).await));
            }

            self.push(reply.into());
            for result in results {
                self.push(result);
            }
        }
    }

    async fn next_reply<F>(&self, on_delta: Option<&mut F>) -> Result<AiMessage>
    where
        F: FnMut(&str),
    {
        let Some(on_delta) = on_delta else {
            return self.model.invoke(self.history.as_slice()).await;
        };

        let mut chunks = self.model.stream(self.history.as_slice()).await?;
        let mut full = AiMessageChunk::default();
        while let Some(chunk) = chunks.try_next().await? {
            if !chunk.content.is_empty() {
                on_delta(&chunk.content);
            }
            full += chunk;
        }
        full.into_message()
    }

    /// Records the reply that ends a turn. Tool calls nobody answered are
    /// dropped so the next request has no dangling call ids.
    fn record_final(&mut self, reply: &AiMessage) {
        if reply.has_tool_calls() {
            self.push(Message::assistant(reply.content.clone()));
        } else {
            self.push(reply.clone().into());
        }
    }

    fn push(&mut self, message: Message) {
        self.history.push(message);
        self.trim_history();
    }

    fn trim_history(&mut self) {
        if self.history.len() <= MAX_HISTORY_MESSAGES {
            return;
        }

        let keep_tail = MAX_HISTORY_MESSAGES.saturating_sub(self.system_messages.len());
        let mut tail_start = self.history.len().saturating_sub(keep_tail);
        // A tool result must follow the assistant message that requested it.
        while tail_start < self.history.len() && self.history[tail_start].role == Role::Tool {
            tail_start += 1;
        }

        let mut trimmed = self.system_messages.clone();
        trimmed.extend_from_slice(&self.history[tail_start..]);
        self.history = trimmed;
    }
}

fn build_system_messages(system_prompt: &str) -> Vec<Message> {
    if system_prompt.trim().is_empty() {
        Vec::new()
    } else {
        vec![Message::system(system_prompt)]
    }
}
