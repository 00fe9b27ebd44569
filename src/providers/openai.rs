use anyhow::{Context, Result, anyhow, bail};
use futures::{StreamExt, future};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::Config;
use crate::messages::{
    AiMessage, AiMessageChunk, ContentBlock, MediaSource, Message, MessageContent, Role, ToolCall,
    ToolCallChunk, parse_tool_args,
};
use crate::model_gateway::{ChatRequest, ChunkStream, ResponseFormat, ToolChoice};
use crate::providers::http_errors::{
    ApiErrorBody, model_api_request_error, model_api_status_error, model_api_stream_error,
};
use crate::providers::sse;
use crate::usage::UsageMetadata;

const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    id: Option<String>,
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: String,
    function: ResponseFunctionCall,
}

#[derive(Debug, Deserialize)]
struct ResponseFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    total_tokens: Option<u64>,
    prompt_tokens_details: Option<PromptTokensDetails>,
    completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokensDetails {
    cached_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CompletionTokensDetails {
    reasoning_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    id: Option<String>,
    model: Option<String>,
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<WireUsage>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<DeltaToolCall>,
}

#[derive(Debug, Deserialize)]
struct DeltaToolCall {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<DeltaFunction>,
}

#[derive(Debug, Deserialize)]
struct DeltaFunction {
    name: Option<String>,
    arguments: Option<String>,
}

impl WireUsage {
    fn into_metadata(self) -> UsageMetadata {
        UsageMetadata {
            input_tokens: self.prompt_tokens,
            output_tokens: self.completion_tokens,
            total_tokens: self
                .total_tokens
                .unwrap_or(self.prompt_tokens + self.completion_tokens),
            cached_input_tokens: self.prompt_tokens_details.and_then(|d| d.cached_tokens),
            reasoning_tokens: self.completion_tokens_details.and_then(|d| d.reasoning_tokens),
        }
    }
}

impl CompletionResponse {
    fn into_message(self) -> Result<AiMessage> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Model response contained no choices"))?;
        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| {
                let args = parse_tool_args(&call.function.arguments).with_context(|| {
                    format!(
                        "Model returned malformed arguments for tool '{}'",
                        call.function.name
                    )
                })?;
                Ok(ToolCall {
                    id: call.id,
                    name: call.function.name,
                    args,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(AiMessage {
            id: self.id,
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage: self.usage.map(WireUsage::into_metadata),
            finish_reason: choice.finish_reason,
            model: self.model,
        })
    }
}

impl StreamChunk {
    fn into_chunk(self) -> AiMessageChunk {
        let mut chunk = AiMessageChunk {
            id: self.id,
            model: self.model,
            usage: self.usage.map(WireUsage::into_metadata),
            ..AiMessageChunk::default()
        };

        if let Some(choice) = self.choices.into_iter().next() {
            chunk.content = choice.delta.content.unwrap_or_default();
            chunk.finish_reason = choice.finish_reason;
            chunk.tool_call_chunks = choice
                .delta
                .tool_calls
                .into_iter()
                .map(|call| {
                    let (name, args) = match call.function {
                        Some(function) => (function.name, function.arguments.unwrap_or_default()),
                        None => (None, String::new()),
                    };
                    ToolCallChunk {
                        index: call.index,
                        id: call.id,
                        name,
                        args,
                    }
                })
                .collect();
        }

        chunk
    }
}

fn chat_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

fn audio_format(mime_type: &str) -> &str {
    match mime_type {
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/mpeg" | "audio/mp3" => "mp3",
        other => other.rsplit('/').next().unwrap_or(other),
    }
}

/// Encodes one content block as a chat-completion content part.
pub(crate) fn content_part(block: &ContentBlock) -> Result<Value> {
    match block {
        ContentBlock::Text { text } => Ok(json!({"type": "text", "text": text})),
        ContentBlock::Image(source) => Ok(json!({
            "type": "image_url",
            "image_url": {"url": source.to_uri()}
        })),
        ContentBlock::Video(MediaSource::Url { url }) => Ok(json!({
            "type": "video_url",
            "video_url": {"url": url}
        })),
        ContentBlock::Audio(MediaSource::Base64 { base64, mime_type }) => Ok(json!({
            "type": "input_audio",
            "input_audio": {"data": base64, "format": audio_format(mime_type)}
        })),
        ContentBlock::File(source @ MediaSource::Base64 { .. }) => Ok(json!({
            "type": "file",
            "file": {"file_data": source.to_uri()}
        })),
        ContentBlock::Audio(MediaSource::Url { .. }) | ContentBlock::File(MediaSource::Url { .. }) => {
            bail!(
                "{} blocks must carry inline base64 data for the openai provider",
                block.kind()
            )
        }
        ContentBlock::Video(MediaSource::Base64 { .. }) => {
            bail!("video blocks must be referenced by URL for the openai provider")
        }
    }
}

fn to_wire_message(message: &Message) -> Result<WireMessage> {
    let content = match &message.content {
        MessageContent::Text(text) if text.is_empty() && !message.tool_calls.is_empty() => None,
        MessageContent::Text(text) => Some(Value::String(text.clone())),
        MessageContent::Blocks(blocks) => Some(Value::Array(
            blocks.iter().map(content_part).collect::<Result<_>>()?,
        )),
    };
    let name = match message.role {
        Role::Tool => None,
        _ => message.name.clone(),
    };

    Ok(WireMessage {
        role: message.role.as_str(),
        content,
        name,
        tool_calls: message
            .tool_calls
            .iter()
            .map(|call| WireToolCall {
                id: call.id.clone(),
                kind: "function",
                function: WireFunctionCall {
                    name: call.name.clone(),
                    arguments: call.args_json(),
                },
            })
            .collect(),
        tool_call_id: message.tool_call_id.clone(),
    })
}

/// The chat-completion JSON a message is sent as.
pub(crate) fn wire_message_json(message: &Message) -> Result<Value> {
    serde_json::to_value(to_wire_message(message)?).context("Failed to encode message")
}

fn tool_choice_value(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::Required => json!("required"),
        ToolChoice::Function(name) => json!({"type": "function", "function": {"name": name}}),
    }
}

fn build_request(request: &ChatRequest, stream: bool) -> Result<CompletionRequest<'_>> {
    Ok(CompletionRequest {
        model: &request.model,
        messages: request
            .messages
            .iter()
            .map(to_wire_message)
            .collect::<Result<_>>()?,
        stream,
        stream_options: (stream && request.include_usage).then_some(StreamOptions {
            include_usage: true,
        }),
        tools: request
            .tools
            .iter()
            .map(|tool| WireTool {
                kind: "function",
                function: WireFunction {
                    name: &tool.name,
                    description: &tool.description,
                    parameters: &tool.parameters,
                },
            })
            .collect(),
        tool_choice: request.tool_choice.as_ref().map(tool_choice_value),
        response_format: request.response_format.map(|format| match format {
            ResponseFormat::JsonObject => json!({"type": "json_object"}),
        }),
        temperature: request.temperature,
        max_tokens: request.max_tokens,
    })
}

async fn send(
    client: &Client,
    cfg: &Config,
    api_url: &str,
    body: &CompletionRequest<'_>,
) -> Result<Response> {
    let api_key = cfg.require_api_key()?;
    debug!(
        api_url = %api_url,
        model = %body.model,
        message_count = body.messages.len(),
        stream = body.stream,
        "sending openai chat request"
    );

    let response = client
        .post(api_url)
        .bearer_auth(api_key)
        .json(body)
        .send()
        .await
        .map_err(|err| {
            warn!(
                api_url = %api_url,
                model = %body.model,
                error = %err,
                "openai request failed"
            );
            model_api_request_error(err, api_url, cfg.model_timeout_secs)
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let response_body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read response body>".to_string());
        warn!(
            api_url = %api_url,
            model = %body.model,
            status = %status,
            response_body_len = response_body.len(),
            "openai returned non-success status"
        );
        return Err(model_api_status_error(status, &response_body));
    }

    Ok(response)
}

pub async fn complete(client: &Client, cfg: &Config, request: &ChatRequest) -> Result<AiMessage> {
    let api_url = chat_url(&cfg.model_base_url);
    let body = build_request(request, false)?;
    let response = send(client, cfg, &api_url, &body).await?;

    let parsed: CompletionResponse = response
        .json()
        .await
        .context("Failed to parse model chat response")?;
    let message = parsed.into_message()?;
    debug!(
        model = %request.model,
        response_len = message.content.len(),
        tool_call_count = message.tool_calls.len(),
        "received openai chat response"
    );
    Ok(message)
}

fn parse_stream_chunk(data: &str) -> Result<AiMessageChunk> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .with_context(|| format!("Failed to parse streamed model chunk: {data}"))?;
    if let Some(error) = chunk.error {
        warn!(error = ?error, "model stream reported an error event");
        return Err(model_api_stream_error(error));
    }
    Ok(chunk.into_chunk())
}

fn is_done(event: &Result<String>) -> bool {
    matches!(event, Ok(data) if data.trim() == DONE_MARKER)
}

pub async fn stream(client: &Client, cfg: &Config, request: &ChatRequest) -> Result<ChunkStream> {
    let api_url = chat_url(&cfg.model_base_url);
    let body = build_request(request, true)?;
    let response = send(client, cfg, &api_url, &body).await?;

    Ok(sse::data_stream(response.bytes_stream())
        .take_while(|event| future::ready(!is_done(event)))
        .map(|event| event.and_then(|data| parse_stream_chunk(&data)))
        .boxed())
}
