use anyhow::{Result, bail};
use futures::{StreamExt, TryStreamExt, stream};
use reqwest::Client;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::messages::{AiMessage, ModelInput};
use crate::model_gateway::{
    ChatRequest, ChunkStream, HttpGateway, ModelGateway, ResponseFormat, ToolChoice,
};
use crate::structured::{OutputSchema, StructuredMethod, StructuredModel};
use crate::tools::ToolSpec;
use crate::usage::UsageTracker;

const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Chat-model client bound to one model name.
///
/// Builder methods return a new value, so one base model can be specialised
/// (tools, structured output, usage tracking) without affecting other users.
#[derive(Clone)]
pub struct ChatModel {
    gateway: Arc<dyn ModelGateway>,
    model: String,
    tools: Vec<ToolSpec>,
    tool_choice: Option<ToolChoice>,
    response_format: Option<ResponseFormat>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    include_usage: bool,
    max_concurrency: usize,
    usage_tracker: Option<Arc<UsageTracker>>,
}

impl ChatModel {
    pub fn from_config(client: Client, cfg: &Config) -> Result<Self> {
        let gateway = HttpGateway::new(client, cfg)?;
        Ok(Self {
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            include_usage: cfg.stream_include_usage,
            max_concurrency: cfg.batch_max_concurrency,
            ..Self::with_gateway(Arc::new(gateway), cfg.model.clone())
        })
    }

    pub fn with_gateway(gateway: Arc<dyn ModelGateway>, model: impl Into<String>) -> Self {
        Self {
            gateway,
            model: model.into(),
            tools: Vec::new(),
            tool_choice: None,
            response_format: None,
            temperature: None,
            max_tokens: None,
            include_usage: true,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            usage_tracker: None,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn bound_tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn bind_tools(&self, tools: impl IntoIterator<Item = ToolSpec>) -> Result<Self> {
        let tools: Vec<ToolSpec> = tools.into_iter().collect();
        let mut names = HashSet::new();
        for tool in &tools {
            if !names.insert(tool.name.as_str()) {
                bail!("Duplicate tool name: {}", tool.name);
            }
        }

        let mut bound = self.clone();
        bound.tools = tools;
        Ok(bound)
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_include_usage(mut self, include_usage: bool) -> Self {
        self.include_usage = include_usage;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_usage_tracker(mut self, tracker: Arc<UsageTracker>) -> Self {
        self.usage_tracker = Some(tracker);
        self
    }

    pub fn with_structured_output<T: OutputSchema>(&self) -> StructuredModel<T> {
        self.with_structured_output_method(StructuredMethod::default())
    }

    pub fn with_structured_output_method<T: OutputSchema>(
        &self,
        method: StructuredMethod,
    ) -> StructuredModel<T> {
        StructuredModel::new(self, method)
    }

    pub(crate) fn with_output_constraint(
        &self,
        tools: Vec<ToolSpec>,
        tool_choice: Option<ToolChoice>,
        response_format: Option<ResponseFormat>,
    ) -> Self {
        let mut constrained = self.clone();
        constrained.tools = tools;
        constrained.tool_choice = tool_choice;
        constrained.response_format = response_format;
        constrained
    }

    fn request(&self, input: ModelInput) -> Result<ChatRequest> {
        if input.messages.is_empty() {
            bail!("Cannot call the model without any messages");
        }
        Ok(ChatRequest {
            model: self.model.clone(),
            messages: input.messages,
            tools: self.tools.clone(),
            tool_choice: self.tool_choice.clone(),
            response_format: self.response_format,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            include_usage: self.include_usage,
        })
    }

    pub async fn invoke(&self, input: impl Into<ModelInput>) -> Result<AiMessage> {
        let request = self.request(input.into())?;
        let message = self.gateway.complete(&request).await?;

        if let (Some(tracker), Some(usage)) = (&self.usage_tracker, &message.usage) {
            tracker.record(message.model.as_deref().unwrap_or(&self.model), usage);
        }
        Ok(message)
    }

    pub async fn stream(&self, input: impl Into<ModelInput>) -> Result<ChunkStream> {
        let request = self.request(input.into())?;
        let chunks = self.gateway.stream(&request).await?;

        let Some(tracker) = self.usage_tracker.clone() else {
            return Ok(chunks);
        };
        let model = self.model.clone();
        Ok(chunks
            .inspect_ok(move |chunk| {
                if let Some(usage) = &chunk.usage {
                    tracker.record(chunk.model.as_deref().unwrap_or(&model), usage);
                }
            })
            .boxed())
    }

    /// Invokes every input, at most `max_concurrency` at a time. Replies come
    /// back in input order; the first failure fails the whole batch.
    pub async fn batch<I>(&self, inputs: impl IntoIterator<Item = I>) -> Result<Vec<AiMessage>>
    where
        I: Into<ModelInput>,
    {
        let inputs: Vec<ModelInput> = inputs.into_iter().map(Into::into).collect();
        debug!(
            model = %self.model,
            batch_size = inputs.len(),
            max_concurrency = self.max_concurrency,
            "dispatching batch"
        );

        stream::iter(inputs)
            .map(|input| self.invoke(input))
            .buffered(self.max_concurrency)
            .try_collect()
            .await
    }

    /// Like [`ChatModel::batch`] but keeps every outcome.
    pub async fn batch_settled<I>(&self, inputs: impl IntoIterator<Item = I>) -> Vec<Result<AiMessage>>
    where
        I: Into<ModelInput>,
    {
        let inputs: Vec<ModelInput> = inputs.into_iter().map(Into::into).collect();
        stream::iter(inputs)
            .map(|input| self.invoke(input))
            .buffered(self.max_concurrency)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;
    use serde_json::json;
    use std::sync::Arc;

    use super::ChatModel;
    use crate::messages::{AiMessageChunk, Message, ModelInput, Role};
    use crate::model_gateway::ToolChoice;
    use crate::testing::{EchoGateway, ScriptedGateway, text_reply, tool_reply};
    use crate::tools::{builtin_specs, get_weather_spec};
    use crate::usage::{UsageMetadata, UsageTracker};

    #[tokio::test]
    async fn invoke_sends_messages_and_bound_settings() {
        let gateway = ScriptedGateway::new([text_reply("Parrots eat colorful food.")]);
        let model = ChatModel::with_gateway(gateway.clone(), "qwen-plus")
            .bind_tools([get_weather_spec()])
            .expect("tools should bind")
            .with_tool_choice(ToolChoice::Auto)
            .with_temperature(0.2);

        let reply = model
            .invoke(vec![Message::system("Be brief."), Message::user("Why?")])
            .await
            .expect("invoke should succeed");

        assert_eq!(reply.content, "Parrots eat colorful food.");
        let requests = gateway.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "qwen-plus");
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert_eq!(requests[0].tools[0].name, "get_weather");
        assert_eq!(requests[0].tool_choice, Some(ToolChoice::Auto));
        assert_eq!(requests[0].temperature, Some(0.2));
    }

    #[tokio::test]
    async fn invoke_rejects_empty_input() {
        let gateway = ScriptedGateway::new([]);
        let model = ChatModel::with_gateway(gateway.clone(), "qwen-plus");
        let err = model
            .invoke(ModelInput::from(Vec::<Message>::new()))
            .await
            .expect_err("empty input should fail");
        assert!(err.to_string().contains("without any messages"));
        assert!(gateway.requests().is_empty());
    }

    #[test]
    fn bind_tools_rejects_duplicate_names() {
        let model = ChatModel::with_gateway(ScriptedGateway::new([]), "qwen-plus");
        let err = model
            .bind_tools([get_weather_spec(), get_weather_spec()])
            .err()
            .expect("duplicate names should fail");
        assert_eq!(err.to_string(), "Duplicate tool name: get_weather");
        assert!(model.bound_tools().is_empty());

        let bound = model.bind_tools(builtin_specs()).expect("tools should bind");
        assert_eq!(bound.bound_tools().len(), 2);
    }

    #[tokio::test]
    async fn batch_preserves_input_order() {
        let model = ChatModel::with_gateway(Arc::new(EchoGateway), "qwen-plus").with_max_concurrency(2);
        let replies = model
            .batch([
                "Why do parrots have colorful feathers?",
                "How do airplanes fly?",
                "What is quantum computing?",
            ])
            .await
            .expect("batch should succeed");

        let contents: Vec<&str> = replies.iter().map(|reply| reply.text()).collect();
        assert_eq!(
            contents,
            vec![
                "echo: Why do parrots have colorful feathers?",
                "echo: How do airplanes fly?",
                "echo: What is quantum computing?",
            ]
        );
    }

    #[tokio::test]
    async fn batch_fails_when_any_call_fails_but_settled_keeps_outcomes() {
        let model = ChatModel::with_gateway(Arc::new(EchoGateway), "qwen-plus");
        let err = model
            .batch(["fine", "fail please"])
            .await
            .expect_err("a failing call should fail the batch");
        assert!(err.to_string().contains("echo gateway refused"));

        let settled = model.batch_settled(["fine", "fail please", "also fine"]).await;
        assert_eq!(settled.len(), 3);
        assert!(settled[0].is_ok());
        assert!(settled[1].is_err());
        assert_eq!(
            settled[2].as_ref().map(|reply| reply.text().to_string()).ok(),
            Some("echo: also fine".to_string())
        );
    }

    #[tokio::test]
    async fn stream_yields_chunks_that_merge_into_the_reply() {
        let gateway = ScriptedGateway::new([tool_reply(
            "call_1",
            "get_weather",
            json!({"location": "Paris"}),
        )]);
        let model = ChatModel::with_gateway(gateway.clone(), "qwen-plus");

        let chunks: Vec<AiMessageChunk> = model
            .stream("Weather in Paris?")
            .await
            .expect("stream should start")
            .try_collect()
            .await
            .expect("stream should finish");
        assert!(chunks.len() > 1);

        let merged = chunks
            .into_iter()
            .fold(AiMessageChunk::default(), |full, chunk| full + chunk)
            .into_message()
            .expect("chunks should merge");
        assert_eq!(merged.tool_calls[0].name, "get_weather");
        assert_eq!(merged.tool_calls[0].arg_str("location"), Some("Paris"));
        assert!(gateway.requests()[0].include_usage);
    }

    #[tokio::test]
    async fn usage_tracker_records_invoke_and_stream_usage() {
        let tracker = Arc::new(UsageTracker::new());
        let gateway = ScriptedGateway::new([text_reply("Hello"), text_reply("Goodbye")]);
        let model =
            ChatModel::with_gateway(gateway, "qwen-plus").with_usage_tracker(Arc::clone(&tracker));

        model.invoke("Hello").await.expect("invoke should succeed");
        let _: Vec<AiMessageChunk> = model
            .stream("Goodbye")
            .await
            .expect("stream should start")
            .try_collect()
            .await
            .expect("stream should finish");

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(
            snapshot["qwen-plus"],
            UsageMetadata::new(10, 5) + UsageMetadata::new(10, 5)
        );
    }
}
